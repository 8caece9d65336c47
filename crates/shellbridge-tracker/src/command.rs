use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use shellbridge_types::{CommandId, CommandStatus, ConnectionId};

use super::MAX_OUTPUT_BUFFER_BYTES;

/// Tracked record of one agent-issued command's lifecycle.
///
/// Ids are minted once and never reused; the status leaves `Executing` at
/// most once and never changes again after that.
#[derive(Debug)]
pub struct CommandContext {
    pub id: CommandId,
    pub agent_session_id: String,
    pub connection_id: ConnectionId,
    pub command_text: String,
    pub output: String,
    pub status: CommandStatus,
    pub started_at: DateTime<Utc>,
    pub timeout: Duration,
}

impl CommandContext {
    pub fn new(
        agent_session_id: impl Into<String>,
        connection_id: ConnectionId,
        command_text: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_session_id: agent_session_id.into(),
            connection_id,
            command_text: command_text.into(),
            output: String::new(),
            status: CommandStatus::Executing,
            started_at: Utc::now(),
            timeout,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.started_at)
    }

    /// Strictly greater than the configured timeout; a command at exactly
    /// its deadline is not yet overdue.
    pub fn is_timed_out(&self) -> bool {
        self.elapsed().num_milliseconds() > self.timeout.as_millis() as i64
    }

    /// Append a chunk, keeping the buffer tail within the size cap.
    pub fn append_output(&mut self, chunk: &str) {
        self.output.push_str(chunk);
        if self.output.len() > MAX_OUTPUT_BUFFER_BYTES {
            let mut cut = self.output.len() - MAX_OUTPUT_BUFFER_BYTES;
            while !self.output.is_char_boundary(cut) {
                cut += 1;
            }
            self.output.drain(..cut);
        }
    }

    /// Attempt the single transition out of `Executing`.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn transition(&mut self, next: CommandStatus) -> bool {
        if self.status == CommandStatus::Executing && next.is_terminal() {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> CommandSnapshot {
        CommandSnapshot {
            id: self.id,
            agent_session_id: self.agent_session_id.clone(),
            connection_id: self.connection_id,
            command_text: self.command_text.clone(),
            output: self.output.clone(),
            status: self.status,
            started_at: self.started_at,
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

/// Cloned read-only view of a command context.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSnapshot {
    pub id: CommandId,
    pub agent_session_id: String,
    pub connection_id: ConnectionId,
    pub command_text: String,
    pub output: String,
    pub status: CommandStatus,
    pub started_at: DateTime<Utc>,
    pub timeout_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(timeout: Duration) -> CommandContext {
        CommandContext::new("ai1", Uuid::new_v4(), "ls", timeout)
    }

    #[test]
    fn output_accumulates_in_order() {
        let mut ctx = ctx(Duration::from_secs(5));
        ctx.append_output("a");
        ctx.append_output("b");
        assert_eq!(ctx.output, "ab");
    }

    #[test]
    fn timeout_boundary_is_strict() {
        let mut ctx = ctx(Duration::from_millis(5000));
        ctx.started_at = Utc::now() - chrono::Duration::milliseconds(4999);
        assert!(!ctx.is_timed_out());

        ctx.started_at = Utc::now() - chrono::Duration::milliseconds(5001);
        assert!(ctx.is_timed_out());
    }

    #[test]
    fn transition_happens_at_most_once() {
        let mut ctx = ctx(Duration::from_secs(5));
        assert!(ctx.transition(CommandStatus::Completed));
        assert_eq!(ctx.status, CommandStatus::Completed);

        // Terminal states are final
        assert!(!ctx.transition(CommandStatus::TimedOut));
        assert!(!ctx.transition(CommandStatus::Failed));
        assert_eq!(ctx.status, CommandStatus::Completed);
    }

    #[test]
    fn transition_to_executing_is_rejected() {
        let mut ctx = ctx(Duration::from_secs(5));
        assert!(!ctx.transition(CommandStatus::Executing));
        assert_eq!(ctx.status, CommandStatus::Executing);
    }

    #[test]
    fn output_buffer_keeps_tail_when_capped() {
        let mut ctx = ctx(Duration::from_secs(5));
        let filler = "x".repeat(MAX_OUTPUT_BUFFER_BYTES);
        ctx.append_output(&filler);
        ctx.append_output("tail-marker");
        assert_eq!(ctx.output.len(), MAX_OUTPUT_BUFFER_BYTES);
        assert!(ctx.output.ends_with("tail-marker"));
    }

    #[test]
    fn ids_are_unique() {
        let a = ctx(Duration::from_secs(1));
        let b = ctx(Duration::from_secs(1));
        assert_ne!(a.id, b.id);
    }
}
