use serde::{Deserialize, Serialize};

use shellbridge_types::ConnectionId;

/// Messages a conversation client sends over its WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A user chat turn; optionally binds the turn to a terminal
    /// connection so tool calls know where to run.
    Chat {
        content: String,
        #[serde(default)]
        connection_id: Option<ConnectionId>,
    },
    Ping,
}

/// Body of `POST /api/connections`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequest {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}
