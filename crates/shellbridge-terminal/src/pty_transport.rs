/// PTY-hosted shell transport
///
/// Spawns the shell client inside a PTY via portable-pty. In remote mode
/// the child is an ssh client pointed at the target; interactive prompts
/// (password entry, host-key confirmation) surface through the relayed
/// byte stream, where an attached human viewer can answer them. Local mode
/// spawns a plain shell and exists for development and smoke testing.
use anyhow::{Context, Result};
use async_trait::async_trait;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};

use super::transport::{Credentials, HostTarget, ShellChannel, ShellProcess, ShellTransport};
use super::{DEFAULT_TERMINAL_COLS, DEFAULT_TERMINAL_ROWS};

enum TransportKind {
    /// ssh client program, e.g. "ssh"
    Remote { ssh_program: String },
    /// local shell program, e.g. "/bin/bash"
    Local { shell: String },
}

pub struct PtyTransport {
    kind: TransportKind,
    rows: u16,
    cols: u16,
}

impl PtyTransport {
    /// Transport that reaches the target through an ssh client process.
    pub fn remote(ssh_program: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Remote {
                ssh_program: ssh_program.into(),
            },
            rows: DEFAULT_TERMINAL_ROWS,
            cols: DEFAULT_TERMINAL_COLS,
        }
    }

    /// Transport that spawns a local shell, ignoring the target host.
    pub fn local(shell: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Local {
                shell: shell.into(),
            },
            rows: DEFAULT_TERMINAL_ROWS,
            cols: DEFAULT_TERMINAL_COLS,
        }
    }

    pub fn with_size(mut self, rows: u16, cols: u16) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    fn build_command(&self, target: &HostTarget, credentials: &Credentials) -> CommandBuilder {
        match &self.kind {
            TransportKind::Remote { ssh_program } => {
                let mut cmd = CommandBuilder::new(ssh_program);
                // -tt forces a remote PTY even though stdin is already one
                cmd.arg("-tt");
                cmd.arg("-p");
                cmd.arg(target.port.to_string());
                if let Some(key_path) = &credentials.key_path {
                    cmd.arg("-i");
                    cmd.arg(key_path);
                }
                cmd.arg(target.to_string());
                cmd
            }
            TransportKind::Local { shell } => CommandBuilder::new(shell),
        }
    }
}

struct PtyProcess {
    child: Box<dyn portable_pty::Child + Send + Sync>,
    // Keeps the PTY master open for the lifetime of the connection
    _master: Box<dyn portable_pty::MasterPty + Send>,
}

impl ShellProcess for PtyProcess {
    fn kill(&mut self) -> Result<()> {
        self.child.kill().context("failed to kill shell process")
    }

    fn try_wait(&mut self) -> Option<i32> {
        self.child
            .try_wait()
            .ok()
            .flatten()
            .map(|status| status.exit_code() as i32)
    }
}

#[async_trait]
impl ShellTransport for PtyTransport {
    async fn open(&self, target: &HostTarget, credentials: &Credentials) -> Result<ShellChannel> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: self.rows,
                cols: self.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("failed to open PTY")?;

        let cmd = self.build_command(target, credentials);
        let child = pair
            .slave
            .spawn_command(cmd)
            .context("failed to spawn shell client in PTY")?;

        let mut master = pair.master;
        let reader = master
            .try_clone_reader()
            .context("failed to clone PTY reader")?;
        let writer = master.take_writer().context("failed to take PTY writer")?;

        tracing::info!(host = %target, transport = self.name(), "opened shell channel");

        Ok(ShellChannel {
            reader,
            writer,
            process: Box::new(PtyProcess {
                child,
                _master: master,
            }),
        })
    }

    fn name(&self) -> &str {
        match self.kind {
            TransportKind::Remote { .. } => "pty-ssh",
            TransportKind::Local { .. } => "pty-local",
        }
    }
}
