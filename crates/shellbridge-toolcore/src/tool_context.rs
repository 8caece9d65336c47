use std::sync::Arc;
use std::time::Duration;

use shellbridge_terminal::ConnectionRegistry;
use shellbridge_tracker::CommandTracker;
use shellbridge_types::ConnectionId;

/// Tool execution context
///
/// Carries the per-invocation routing information a tool call needs: which
/// agent conversation issued it, which terminal connection it targets, and
/// handles to the bridge and tracker. The orchestrator builds a fresh
/// context before each model turn and drops it afterwards; nothing here is
/// thread-bound or global.
#[derive(Clone)]
pub struct ToolContext {
    pub agent_session_id: String,
    pub connection_id: Option<ConnectionId>,
    pub target_host: Option<String>,
    pub connections: Arc<ConnectionRegistry>,
    pub tracker: Arc<CommandTracker>,
    pub default_timeout: Duration,
}

impl ToolContext {
    pub fn new(
        agent_session_id: impl Into<String>,
        connections: Arc<ConnectionRegistry>,
        tracker: Arc<CommandTracker>,
    ) -> Self {
        Self {
            agent_session_id: agent_session_id.into(),
            connection_id: None,
            target_host: None,
            connections,
            tracker,
            default_timeout: shellbridge_tracker::DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_connection(
        mut self,
        connection_id: ConnectionId,
        target_host: impl Into<String>,
    ) -> Self {
        self.connection_id = Some(connection_id);
        self.target_host = Some(target_host.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Target identifier for acknowledgement text.
    pub fn target_label(&self) -> String {
        self.target_host
            .clone()
            .unwrap_or_else(|| "remote host".to_string())
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("agent_session_id", &self.agent_session_id)
            .field("connection_id", &self.connection_id)
            .field("target_host", &self.target_host)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
