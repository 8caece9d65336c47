use std::sync::Arc;

use anyhow::Result;

use shellbridge_api::ChatClient;
use shellbridge_terminal::{ConnectionRegistry, OutputSink, ShellTransport};
use shellbridge_toolcore::{ToolContext, ToolRegistry};
use shellbridge_tracker::{
    AnalysisPool, CommandTracker, CompletionDetector, ConversationSink, PromptMarkerDetector,
    SweeperConfig, SweeperHandles,
};
use shellbridge_types::ConnectionId;
use shellbridge_viewers::ViewerRegistry;

use crate::analyzer::ChatOutputAnalyzer;
use crate::config::AppConfig;
use crate::history::ConversationStore;

/// Root service owning every registry.
///
/// Everything is constructed here and handed out as `Arc`s; there are no
/// process-wide singletons, so tests build isolated instances and shutdown
/// is a method call.
pub struct BridgeService {
    pub config: AppConfig,
    pub connections: Arc<ConnectionRegistry>,
    pub tracker: Arc<CommandTracker>,
    pub viewers: Arc<ViewerRegistry>,
    pub history: Arc<ConversationStore>,
    pub tools: ToolRegistry,
    pub chat_client: Arc<dyn ChatClient>,
    sweepers: SweeperHandles,
}

impl BridgeService {
    pub fn new(
        config: AppConfig,
        chat_client: Arc<dyn ChatClient>,
        transport: Arc<dyn ShellTransport>,
    ) -> Result<Arc<Self>> {
        let viewers = Arc::new(ViewerRegistry::new());
        let history = Arc::new(ConversationStore::new());

        let analyzer = Arc::new(ChatOutputAnalyzer::new(Arc::clone(&chat_client)));
        let analysis = AnalysisPool::new(analyzer, config.analysis_concurrency);

        let mut tracker = CommandTracker::new(
            Arc::clone(&viewers),
            analysis,
            Arc::clone(&history) as Arc<dyn ConversationSink>,
        )
        .with_default_timeout(config.default_command_timeout);
        if let Some(pattern) = &config.prompt_marker {
            let detector = PromptMarkerDetector::new(pattern)?;
            tracker = tracker.with_detector(Arc::new(detector) as Arc<dyn CompletionDetector>);
        }
        let tracker = Arc::new(tracker);

        let connections = Arc::new(
            ConnectionRegistry::new(
                transport,
                Arc::clone(&viewers),
                Arc::clone(&tracker) as Arc<dyn OutputSink>,
            )
            .with_max_connections(config.max_connections),
        );

        let mut tools = ToolRegistry::new();
        shellbridge_tools::register_shell_tools(&mut tools);

        let sweepers = SweeperHandles::spawn(
            Arc::clone(&tracker),
            SweeperConfig {
                timeout_interval: config.timeout_sweep_interval,
                retention_interval: config.retention_sweep_interval,
                retention_window: config.retention_window,
            },
        );

        Ok(Arc::new(Self {
            config,
            connections,
            tracker,
            viewers,
            history,
            tools,
            chat_client,
            sweepers,
        }))
    }

    /// Build the per-invocation tool context for one model turn.
    pub async fn tool_context(
        &self,
        agent_session_id: &str,
        connection_id: Option<ConnectionId>,
    ) -> ToolContext {
        let mut context = ToolContext::new(
            agent_session_id,
            Arc::clone(&self.connections),
            Arc::clone(&self.tracker),
        )
        .with_default_timeout(self.config.default_command_timeout);

        if let Some(id) = connection_id {
            if let Some(conn) = self.connections.get(id).await {
                context = context.with_connection(id, conn.target().to_string());
            }
        }
        context
    }

    pub fn shutdown(&self) {
        self.sweepers.abort();
    }
}
