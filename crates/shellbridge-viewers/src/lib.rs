//! Viewer session registry
//!
//! Maps a viewer/session id to its outbound notification channel. Terminal
//! viewers receive raw output frames; agent-conversation listeners receive
//! structured notifications. Delivery is best-effort: a failed send removes
//! the session instead of surfacing an error to the sender.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::RwLock;

use shellbridge_types::AgentNotification;

/// Message delivered through a viewer's outbound channel.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Raw terminal output, relayed verbatim
    Frame(String),
    /// Structured conversation notification
    Notice(AgentNotification),
}

/// A single attached viewer and its send handle
#[derive(Debug)]
pub struct ViewerConnection {
    pub id: String,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl ViewerConnection {
    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Registry of all attached viewers, keyed by session/viewer id
#[derive(Debug, Default)]
pub struct ViewerRegistry {
    sessions: RwLock<HashMap<String, ViewerConnection>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_session(
        &self,
        session_id: impl Into<String>,
        sender: mpsc::UnboundedSender<OutboundMessage>,
    ) {
        let id = session_id.into();
        let conn = ViewerConnection {
            id: id.clone(),
            connected_at: Utc::now(),
            sender,
        };
        if self.sessions.write().await.insert(id.clone(), conn).is_some() {
            tracing::debug!(session = %id, "replaced existing viewer session");
        }
    }

    pub async fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Send a structured notification to one session.
    ///
    /// Returns `false` and removes the session when the channel is closed.
    pub async fn send_to_session(&self, session_id: &str, notice: AgentNotification) -> bool {
        self.deliver(session_id, OutboundMessage::Notice(notice)).await
    }

    /// Send a raw terminal output frame to one viewer.
    pub async fn send_frame(&self, viewer_id: &str, chunk: String) -> bool {
        self.deliver(viewer_id, OutboundMessage::Frame(chunk)).await
    }

    async fn deliver(&self, session_id: &str, message: OutboundMessage) -> bool {
        let sender = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(conn) => conn.sender.clone(),
                None => return false,
            }
        };

        if sender.send(message).is_ok() {
            true
        } else {
            tracing::debug!(session = %session_id, "dropping viewer with closed channel");
            self.remove_session(session_id).await;
            false
        }
    }

    /// Fan a notification out to every registered session.
    ///
    /// Returns the number of successful deliveries; failed recipients are
    /// removed without aborting the broadcast.
    pub async fn broadcast(&self, notice: AgentNotification) -> usize {
        self.broadcast_filtered(notice, None).await
    }

    /// Like [`broadcast`](Self::broadcast), skipping one session id.
    pub async fn broadcast_exclude(&self, notice: AgentNotification, excluded_id: &str) -> usize {
        self.broadcast_filtered(notice, Some(excluded_id)).await
    }

    async fn broadcast_filtered(
        &self,
        notice: AgentNotification,
        excluded_id: Option<&str>,
    ) -> usize {
        let targets: Vec<(String, mpsc::UnboundedSender<OutboundMessage>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|conn| excluded_id != Some(conn.id.as_str()))
                .map(|conn| (conn.id.clone(), conn.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sender) in targets {
            if sender.send(OutboundMessage::Notice(notice.clone())).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in dead {
                sessions.remove(&id);
            }
        }

        delivered
    }

    /// Drop every session whose channel reports closed.
    pub async fn cleanup_closed_sessions(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, conn| !conn.is_closed());
        before - sessions.len()
    }
}
