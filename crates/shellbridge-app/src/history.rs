use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use shellbridge_api::ChatMessage;
use shellbridge_tracker::ConversationSink;

/// In-memory conversation history, keyed by agent session id.
///
/// Stands in for the persistent key-value collaborator: list-append and
/// range-read per session. The analysis pool appends through the
/// [`ConversationSink`] seam, the orchestrator reads full histories back
/// for each model turn.
#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append_message(&self, session_id: &str, message: ChatMessage) {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }

    pub async fn append_text(&self, session_id: &str, role: &str, content: &str) {
        let message = ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            ..Default::default()
        };
        self.append_message(session_id, message).await;
    }

    pub async fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Range-read: `count` messages starting at `start`.
    pub async fn range(&self, session_id: &str, start: usize, count: usize) -> Vec<ChatMessage> {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(messages) => messages.iter().skip(start).take(count).cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn message_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub async fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }
}

#[async_trait]
impl ConversationSink for ConversationStore {
    async fn append(&self, session_id: &str, role: &str, content: &str) {
        self.append_text(session_id, role, content).await;
    }
}
