// Command lifecycle tracking
//
// Tracks at most one in-flight agent-issued command per terminal
// connection: registration, output accumulation, the single transition out
// of the executing state, and dispatch of the asynchronous output-analysis
// task. Periodic sweepers enforce timeouts and bound memory growth.

mod analysis;
mod command;
mod detector;
mod sweeper;
mod tracker;

pub use analysis::{AnalysisJob, AnalysisPool, OutputAnalyzer};
pub use command::{CommandContext, CommandSnapshot};
pub use detector::{CompletionDetector, PromptMarkerDetector, DEFAULT_PROMPT_PATTERN};
pub use sweeper::{SweeperConfig, SweeperHandles};
pub use tracker::{CommandTracker, ConversationSink};

use std::time::Duration;

// Constants
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
pub const TIMEOUT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
pub const RETENTION_WINDOW: Duration = Duration::from_secs(3600);
pub const MAX_CONCURRENT_ANALYSES: usize = 4;
pub const MAX_OUTPUT_BUFFER_BYTES: usize = 1024 * 1024;
