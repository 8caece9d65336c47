use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CommandId, CommandStatus, ErrorCode};

/// Structured message pushed to an agent-conversation viewer.
///
/// Streamed model output arrives as `reply` fragments with
/// `is_complete = false`; the final message of a turn carries `true`.
/// Command output is streamed as `command_output` while the command is
/// executing, followed by exactly one `command_complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentNotification {
    Chat {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Reply {
        content: String,
        is_complete: bool,
        timestamp: DateTime<Utc>,
    },
    Error {
        content: String,
        code: ErrorCode,
        timestamp: DateTime<Utc>,
    },
    Ping {
        content: String,
        timestamp: DateTime<Utc>,
    },
    CommandOutput {
        command_id: CommandId,
        content: String,
        timestamp: DateTime<Utc>,
    },
    CommandComplete {
        command_id: CommandId,
        status: CommandStatus,
        content: String,
        timestamp: DateTime<Utc>,
    },
}

impl AgentNotification {
    pub fn chat(content: impl Into<String>) -> Self {
        AgentNotification::Chat {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn reply(content: impl Into<String>, is_complete: bool) -> Self {
        AgentNotification::Reply {
            content: content.into(),
            is_complete,
            timestamp: Utc::now(),
        }
    }

    pub fn error(content: impl Into<String>, code: ErrorCode) -> Self {
        AgentNotification::Error {
            content: content.into(),
            code,
            timestamp: Utc::now(),
        }
    }

    pub fn ping() -> Self {
        AgentNotification::Ping {
            content: "pong".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn command_output(command_id: CommandId, content: impl Into<String>) -> Self {
        AgentNotification::CommandOutput {
            command_id,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn command_complete(
        command_id: CommandId,
        status: CommandStatus,
        content: impl Into<String>,
    ) -> Self {
        AgentNotification::CommandComplete {
            command_id,
            status,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}
