use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ConnectionId;

/// Error taxonomy of the bridge layer.
///
/// All of these are returned to callers, never used to abort the process.
/// Timeout is deliberately absent: it is a tracked command status, not an
/// error.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(ConnectionId),

    #[error("delivery to viewer '{0}' failed")]
    DeliveryFailure(String),

    #[error("output analysis failed: {0}")]
    AnalysisFailure(String),

    #[error("shell transport error: {0}")]
    Transport(String),
}

impl BridgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::ConnectionNotFound(_) => ErrorCode::ConnectionNotFound,
            BridgeError::ConnectionUnavailable(_) => ErrorCode::ConnectionUnavailable,
            BridgeError::DeliveryFailure(_) => ErrorCode::DeliveryFailure,
            BridgeError::AnalysisFailure(_) => ErrorCode::AnalysisFailure,
            BridgeError::Transport(_) => ErrorCode::Internal,
        }
    }
}

/// Machine-readable code carried by `error` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ConnectionNotFound,
    ConnectionUnavailable,
    CommandTimeout,
    AnalysisFailure,
    DeliveryFailure,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn error_maps_to_code() {
        let id = Uuid::new_v4();
        assert_eq!(
            BridgeError::ConnectionNotFound(id).code(),
            ErrorCode::ConnectionNotFound
        );
        assert_eq!(
            BridgeError::Transport("boom".into()).code(),
            ErrorCode::Internal
        );
    }

    #[test]
    fn error_display_contains_id() {
        let id = Uuid::new_v4();
        let msg = BridgeError::ConnectionUnavailable(id).to_string();
        assert!(msg.contains(&id.to_string()));
    }
}
