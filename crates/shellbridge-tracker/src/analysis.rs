use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use shellbridge_types::{AgentNotification, CommandId, CommandStatus, ConnectionId};
use shellbridge_viewers::ViewerRegistry;

use super::tracker::ConversationSink;

/// Produces a human-readable analysis of a finished command's output.
///
/// Implementations typically call the language model; they are slow and are
/// therefore run on the bounded analysis pool, never inline.
#[async_trait]
pub trait OutputAnalyzer: Send + Sync {
    async fn analyze(&self, command: &str, output: &str) -> Result<String>;
}

/// Work item for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub command_id: CommandId,
    pub agent_session_id: String,
    pub connection_id: ConnectionId,
    pub command_text: String,
    pub output: String,
    pub status: CommandStatus,
}

/// Bounded dispatcher for analysis tasks.
///
/// Tasks are spawned immediately but gate on a semaphore, so at most
/// `max_concurrent` model calls run at once and overflow waits instead of
/// growing without bound. The returned handle lets callers (and tests)
/// await completion deterministically.
pub struct AnalysisPool {
    analyzer: Arc<dyn OutputAnalyzer>,
    permits: Arc<Semaphore>,
}

impl AnalysisPool {
    pub fn new(analyzer: Arc<dyn OutputAnalyzer>, max_concurrent: usize) -> Self {
        Self {
            analyzer,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run the job in the background and deliver the result (or a fallback
    /// message on failure) to the owning conversation.
    pub fn dispatch(
        &self,
        job: AnalysisJob,
        viewers: Arc<ViewerRegistry>,
        conversation: Arc<dyn ConversationSink>,
    ) -> JoinHandle<()> {
        let analyzer = Arc::clone(&self.analyzer);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let text = match analyzer.analyze(&job.command_text, &job.output).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        command = %job.command_id,
                        error = %e,
                        "output analysis failed, delivering fallback"
                    );
                    format!(
                        "Command `{}` finished ({}), but analysis failed: {}",
                        job.command_text, job.status, e
                    )
                }
            };

            conversation
                .append(&job.agent_session_id, "assistant", &text)
                .await;
            viewers
                .send_to_session(
                    &job.agent_session_id,
                    AgentNotification::reply(text, true),
                )
                .await;
        })
    }
}
