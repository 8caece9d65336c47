use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use shellbridge_types::ConnectionId;

use super::transport::{HostTarget, ShellProcess};

/// A live remote-shell connection.
///
/// The write half of the shell is shared here; the read half is consumed by
/// the registry's reader thread at connect time and never comes back.
pub struct TerminalConnection {
    id: ConnectionId,
    target: HostTarget,
    created_at: DateTime<Utc>,
    writer: StdMutex<Box<dyn Write + Send>>,
    process: StdMutex<Box<dyn ShellProcess>>,
    viewers: RwLock<HashSet<String>>,
    alive: Arc<AtomicBool>,
    pump_task: StdMutex<Option<JoinHandle<()>>>,
}

impl TerminalConnection {
    pub(crate) fn new(
        id: ConnectionId,
        target: HostTarget,
        writer: Box<dyn Write + Send>,
        process: Box<dyn ShellProcess>,
    ) -> Self {
        Self {
            id,
            target,
            created_at: Utc::now(),
            writer: StdMutex::new(writer),
            process: StdMutex::new(process),
            viewers: RwLock::new(HashSet::new()),
            alive: Arc::new(AtomicBool::new(true)),
            pump_task: StdMutex::new(None),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn target(&self) -> &HostTarget {
        &self.target
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }

    pub(crate) fn set_pump_task(&self, task: JoinHandle<()>) {
        *self.pump_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    pub(crate) fn write_input(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_all(bytes)?;
        writer.flush()
    }

    pub(crate) async fn attach_viewer(&self, viewer_id: &str) {
        self.viewers.write().await.insert(viewer_id.to_string());
    }

    pub(crate) async fn detach_viewer(&self, viewer_id: &str) -> bool {
        self.viewers.write().await.remove(viewer_id)
    }

    pub(crate) async fn viewer_ids(&self) -> Vec<String> {
        self.viewers.read().await.iter().cloned().collect()
    }

    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }

    /// Kill the shell process and stop the output pump.
    ///
    /// The reader thread is not joined: it may be blocked in a read, and
    /// killing the process makes it exit on EOF by itself.
    pub(crate) fn shutdown(&self) {
        self.mark_dead();
        if let Err(e) = self
            .process
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .kill()
        {
            tracing::debug!(connection = %self.id, error = %e, "kill on shutdown failed");
        }
        if let Some(task) = self
            .pump_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }

    pub async fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            target: self.target.to_string(),
            created_at: self.created_at.to_rfc3339(),
            alive: self.is_alive(),
            viewer_count: self.viewer_count().await,
        }
    }
}

impl Drop for TerminalConnection {
    fn drop(&mut self) {
        let _ = self
            .process
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .kill();
    }
}

/// Snapshot of a connection for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub target: String,
    pub created_at: String,
    pub alive: bool,
    pub viewer_count: usize,
}
