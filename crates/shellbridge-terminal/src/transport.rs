/// Shell transport abstraction
///
/// The bridge only needs a byte-stream pair and a kill handle; how the
/// remote shell is reached (ssh client in a PTY, local process, test
/// harness) is a transport concern. Credential validation is out of scope
/// here: credentials are passed through to the transport untouched.
use anyhow::Result;
use async_trait::async_trait;
use std::io::{Read, Write};

/// Where to open the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
}

impl HostTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl std::fmt::Display for HostTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.username {
            Some(user) => write!(f, "{}@{}", user, self.host),
            None => f.write_str(&self.host),
        }
    }
}

/// Opaque credential material forwarded to the transport.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub password: Option<String>,
    pub key_path: Option<String>,
}

/// Handle to the spawned shell process.
pub trait ShellProcess: Send {
    fn kill(&mut self) -> Result<()>;

    /// Non-blocking exit probe; `Some(code)` once the process has exited.
    fn try_wait(&mut self) -> Option<i32>;
}

/// An open shell: blocking input/output byte streams plus a process handle.
///
/// The reader is consumed by the connection's dedicated reader thread; the
/// writer is shared behind a lock for human keystrokes and agent commands.
pub struct ShellChannel {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub process: Box<dyn ShellProcess>,
}

/// Opens remote interactive shells.
#[async_trait]
pub trait ShellTransport: Send + Sync {
    async fn open(&self, target: &HostTarget, credentials: &Credentials) -> Result<ShellChannel>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_display_includes_username() {
        let target = HostTarget::new("db01.internal").with_username("ops");
        assert_eq!(target.to_string(), "ops@db01.internal");

        let bare = HostTarget::new("db01.internal");
        assert_eq!(bare.to_string(), "db01.internal");
    }

    #[test]
    fn target_defaults_to_ssh_port() {
        assert_eq!(HostTarget::new("h").port, 22);
        assert_eq!(HostTarget::new("h").with_port(2222).port, 2222);
    }
}
