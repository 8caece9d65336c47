use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use shellbridge_terminal::OutputSink;
use shellbridge_types::{
    AgentNotification, CommandId, CommandStatus, ConnectionId, ErrorCode,
};
use shellbridge_viewers::ViewerRegistry;

use super::analysis::{AnalysisJob, AnalysisPool};
use super::command::{CommandContext, CommandSnapshot};
use super::detector::CompletionDetector;
use super::DEFAULT_COMMAND_TIMEOUT;

/// Destination for messages that become part of a conversation's history.
///
/// The persistent store behind it is a collaborator; the tracker only needs
/// append.
#[async_trait]
pub trait ConversationSink: Send + Sync {
    async fn append(&self, session_id: &str, role: &str, content: &str);
}

/// Tracks agent-issued commands across all terminal connections.
///
/// Shared state is two maps: contexts by command id and the active-command
/// pointer by connection id. Contexts sit behind their own locks, so
/// concurrent registration, output appends and sweeps on different
/// connections do not contend with each other.
pub struct CommandTracker {
    commands: RwLock<HashMap<CommandId, Arc<Mutex<CommandContext>>>>,
    active: RwLock<HashMap<ConnectionId, CommandId>>,
    viewers: Arc<ViewerRegistry>,
    analysis: AnalysisPool,
    conversation: Arc<dyn ConversationSink>,
    detector: Option<Arc<dyn CompletionDetector>>,
    default_timeout: Duration,
}

impl CommandTracker {
    pub fn new(
        viewers: Arc<ViewerRegistry>,
        analysis: AnalysisPool,
        conversation: Arc<dyn ConversationSink>,
    ) -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            viewers,
            analysis,
            conversation,
            detector: None,
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn CompletionDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a new executing command and make it the connection's active
    /// command. A previous active command stays stored but stops receiving
    /// output and is no longer reachable through the active pointer.
    pub async fn register_command(
        &self,
        agent_session_id: &str,
        connection_id: ConnectionId,
        command_text: &str,
        timeout: Option<Duration>,
    ) -> CommandId {
        let ctx = CommandContext::new(
            agent_session_id,
            connection_id,
            command_text,
            timeout.unwrap_or(self.default_timeout),
        );
        let id = ctx.id;

        self.commands
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(ctx)));
        let previous = self.active.write().await.insert(connection_id, id);
        if let Some(previous) = previous {
            tracing::debug!(
                connection = %connection_id,
                orphaned = %previous,
                replacement = %id,
                "active command replaced"
            );
        }

        tracing::info!(command = %id, connection = %connection_id, session = %agent_session_id, "command registered");
        id
    }

    /// Accumulate a chunk of remote output on the connection's active
    /// command and stream it to the owning conversation. No-op when the
    /// connection has no active executing command.
    pub async fn append_output(&self, connection_id: ConnectionId, chunk: &str) {
        let Some(id) = self.active_command_id(connection_id).await else {
            return;
        };
        let Some(ctx_arc) = self.commands.read().await.get(&id).cloned() else {
            return;
        };

        let (session_id, detected_complete) = {
            let mut ctx = ctx_arc.lock().await;
            if ctx.status != CommandStatus::Executing {
                return;
            }
            ctx.append_output(chunk);
            let done = self
                .detector
                .as_ref()
                .map_or(false, |d| d.is_complete(chunk, &ctx.output));
            (ctx.agent_session_id.clone(), done)
        };

        self.viewers
            .send_to_session(
                &session_id,
                AgentNotification::command_output(id, chunk.to_string()),
            )
            .await;

        if detected_complete {
            self.complete_command(connection_id).await;
        }
    }

    /// Transition the connection's active command to completed, clear the
    /// pointer, notify the conversation and dispatch analysis of the full
    /// output. Returns the analysis task handle, or `None` when there was
    /// nothing executing to complete.
    pub async fn complete_command(&self, connection_id: ConnectionId) -> Option<JoinHandle<()>> {
        let id = self.active_command_id(connection_id).await?;
        let ctx_arc = self.commands.read().await.get(&id).cloned()?;

        let job = {
            let mut ctx = ctx_arc.lock().await;
            if !ctx.transition(CommandStatus::Completed) {
                return None;
            }
            self.job_from(&ctx)
        };
        self.clear_active(connection_id, id).await;

        self.notify_finished(&job).await;
        tracing::info!(command = %id, connection = %connection_id, "command completed");
        Some(self.dispatch_analysis(job))
    }

    /// Force a timeout transition on a command that is still executing.
    ///
    /// A timed-out command is analyzed from whatever partial output it
    /// accumulated. Idempotent: a second call finds a terminal status and
    /// does nothing.
    pub async fn handle_timeout(&self, command_id: CommandId) -> Option<JoinHandle<()>> {
        let ctx_arc = self.commands.read().await.get(&command_id).cloned()?;

        let job = {
            let mut ctx = ctx_arc.lock().await;
            if !ctx.transition(CommandStatus::TimedOut) {
                return None;
            }
            self.job_from(&ctx)
        };
        self.clear_active(job.connection_id, command_id).await;

        self.notify_finished(&job).await;
        tracing::warn!(command = %command_id, connection = %job.connection_id, "command timed out");
        Some(self.dispatch_analysis(job))
    }

    /// Fail the active command of a connection whose stream died.
    ///
    /// Stream loss is the one path that assigns the failed status; no
    /// analysis is dispatched, the conversation gets an error notice.
    pub async fn fail_active_command(&self, connection_id: ConnectionId) {
        let Some(id) = self.active_command_id(connection_id).await else {
            return;
        };
        let Some(ctx_arc) = self.commands.read().await.get(&id).cloned() else {
            return;
        };

        let (session_id, command_text) = {
            let mut ctx = ctx_arc.lock().await;
            if !ctx.transition(CommandStatus::Failed) {
                return;
            }
            (ctx.agent_session_id.clone(), ctx.command_text.clone())
        };
        self.clear_active(connection_id, id).await;

        self.viewers
            .send_to_session(
                &session_id,
                AgentNotification::error(
                    format!("terminal connection lost while `{command_text}` was running"),
                    ErrorCode::ConnectionUnavailable,
                ),
            )
            .await;
        tracing::warn!(command = %id, connection = %connection_id, "command failed: connection lost");
    }

    /// Sweep all executing commands and time out the overdue ones.
    ///
    /// Returns the analysis task handles spawned by this sweep.
    pub async fn sweep_timeouts_once(&self) -> Vec<JoinHandle<()>> {
        let snapshot: Vec<(CommandId, Arc<Mutex<CommandContext>>)> = self
            .commands
            .read()
            .await
            .iter()
            .map(|(id, ctx)| (*id, Arc::clone(ctx)))
            .collect();

        let mut handles = Vec::new();
        for (id, ctx_arc) in snapshot {
            let overdue = {
                let ctx = ctx_arc.lock().await;
                ctx.status == CommandStatus::Executing && ctx.is_timed_out()
            };
            if overdue {
                if let Some(handle) = self.handle_timeout(id).await {
                    handles.push(handle);
                }
            }
        }
        handles
    }

    /// Delete terminal-state contexts older than the retention window.
    pub async fn sweep_retention_once(&self, retention: Duration) -> usize {
        let snapshot: Vec<(CommandId, Arc<Mutex<CommandContext>>)> = self
            .commands
            .read()
            .await
            .iter()
            .map(|(id, ctx)| (*id, Arc::clone(ctx)))
            .collect();

        let mut expired = Vec::new();
        for (id, ctx_arc) in snapshot {
            let ctx = ctx_arc.lock().await;
            if ctx.status.is_terminal()
                && ctx.elapsed().num_milliseconds() > retention.as_millis() as i64
            {
                expired.push(id);
            }
        }

        if !expired.is_empty() {
            let mut commands = self.commands.write().await;
            for id in &expired {
                commands.remove(id);
            }
            tracing::debug!(count = expired.len(), "retention sweep removed contexts");
        }
        expired.len()
    }

    /// Remove one tracked context. Idempotent.
    pub async fn cleanup(&self, command_id: CommandId) {
        let removed = self.commands.write().await.remove(&command_id);
        if let Some(ctx_arc) = removed {
            let connection_id = ctx_arc.lock().await.connection_id;
            self.clear_active(connection_id, command_id).await;
        }
    }

    /// Remove every context belonging to a connection. Idempotent.
    pub async fn cleanup_by_connection(&self, connection_id: ConnectionId) {
        let mut doomed = Vec::new();
        {
            let commands = self.commands.read().await;
            for (id, ctx_arc) in commands.iter() {
                if ctx_arc.lock().await.connection_id == connection_id {
                    doomed.push(*id);
                }
            }
        }
        {
            let mut commands = self.commands.write().await;
            for id in &doomed {
                commands.remove(id);
            }
        }
        self.active.write().await.remove(&connection_id);
    }

    /// Remove every context belonging to an agent session. Idempotent.
    pub async fn cleanup_by_agent_session(&self, agent_session_id: &str) {
        let mut doomed = Vec::new();
        {
            let commands = self.commands.read().await;
            for (id, ctx_arc) in commands.iter() {
                let ctx = ctx_arc.lock().await;
                if ctx.agent_session_id == agent_session_id {
                    doomed.push((*id, ctx.connection_id));
                }
            }
        }
        {
            let mut commands = self.commands.write().await;
            for (id, _) in &doomed {
                commands.remove(id);
            }
        }
        let mut active = self.active.write().await;
        for (id, connection_id) in &doomed {
            if active.get(connection_id) == Some(id) {
                active.remove(connection_id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Read accessors: all return empty/None rather than erroring
    // ------------------------------------------------------------------

    pub async fn active_command_id(&self, connection_id: ConnectionId) -> Option<CommandId> {
        self.active.read().await.get(&connection_id).copied()
    }

    pub async fn command(&self, command_id: CommandId) -> Option<CommandSnapshot> {
        let ctx_arc = self.commands.read().await.get(&command_id).cloned()?;
        let ctx = ctx_arc.lock().await;
        Some(ctx.snapshot())
    }

    pub async fn all_commands(&self) -> Vec<CommandSnapshot> {
        let arcs: Vec<Arc<Mutex<CommandContext>>> =
            self.commands.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(arcs.len());
        for ctx_arc in arcs {
            snapshots.push(ctx_arc.lock().await.snapshot());
        }
        snapshots
    }

    pub async fn active_command_count(&self) -> usize {
        self.active.read().await.len()
    }

    pub async fn command_count(&self) -> usize {
        self.commands.read().await.len()
    }

    // ------------------------------------------------------------------

    fn job_from(&self, ctx: &CommandContext) -> AnalysisJob {
        AnalysisJob {
            command_id: ctx.id,
            agent_session_id: ctx.agent_session_id.clone(),
            connection_id: ctx.connection_id,
            command_text: ctx.command_text.clone(),
            output: ctx.output.clone(),
            status: ctx.status,
        }
    }

    /// Clear the active pointer only if it still refers to the given
    /// command; a replacement registered in the meantime stays active.
    async fn clear_active(&self, connection_id: ConnectionId, command_id: CommandId) {
        let mut active = self.active.write().await;
        if active.get(&connection_id) == Some(&command_id) {
            active.remove(&connection_id);
        }
    }

    async fn notify_finished(&self, job: &AnalysisJob) {
        let content = match job.status {
            CommandStatus::TimedOut => format!(
                "command `{}` timed out; analyzing partial output",
                job.command_text
            ),
            _ => format!("command `{}` finished", job.command_text),
        };
        self.viewers
            .send_to_session(
                &job.agent_session_id,
                AgentNotification::command_complete(job.command_id, job.status, content),
            )
            .await;
    }

    fn dispatch_analysis(&self, job: AnalysisJob) -> JoinHandle<()> {
        self.analysis.dispatch(
            job,
            Arc::clone(&self.viewers),
            Arc::clone(&self.conversation),
        )
    }
}

#[async_trait]
impl OutputSink for CommandTracker {
    async fn append_output(&self, connection_id: ConnectionId, chunk: &str) {
        CommandTracker::append_output(self, connection_id, chunk).await;
    }

    async fn connection_lost(&self, connection_id: ConnectionId) {
        self.fail_active_command(connection_id).await;
    }
}
