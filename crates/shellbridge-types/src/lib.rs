//! Core types shared across the shellbridge crates
//!
//! Identifiers, the command status machine, the error taxonomy, and the
//! agent-conversation notification protocol live here so that every other
//! crate agrees on the wire and in-memory shapes.

mod error;
mod protocol;

pub use error::{BridgeError, ErrorCode};
pub use protocol::AgentNotification;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a live terminal connection
pub type ConnectionId = Uuid;

/// Identifier of a tracked agent-issued command
pub type CommandId = Uuid;

/// Lifecycle status of an agent-issued command.
///
/// `Executing` is the only non-terminal state. The transition out of it
/// happens at most once; `Completed` and `TimedOut` both trigger output
/// analysis, `Failed` is reserved for stream loss mid-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Executing,
    Completed,
    TimedOut,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Executing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Executing => "executing",
            CommandStatus::Completed => "completed",
            CommandStatus::TimedOut => "timed_out",
            CommandStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_terminality() {
        assert!(!CommandStatus::Executing.is_terminal());
        assert!(CommandStatus::Completed.is_terminal());
        assert!(CommandStatus::TimedOut.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&CommandStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
