use std::net::SocketAddr;
use std::time::Duration;

use shellbridge_tracker::{
    DEFAULT_COMMAND_TIMEOUT, MAX_CONCURRENT_ANALYSES, RETENTION_SWEEP_INTERVAL, RETENTION_WINDOW,
    TIMEOUT_SWEEP_INTERVAL,
};

/// Runtime configuration for the bridge service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub default_command_timeout: Duration,
    pub timeout_sweep_interval: Duration,
    pub retention_sweep_interval: Duration,
    pub retention_window: Duration,
    pub analysis_concurrency: usize,
    /// Regex matched against the tail of command output to detect the
    /// shell prompt; `None` disables automatic completion detection.
    pub prompt_marker: Option<String>,
    pub max_connections: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 8787).into(),
            default_command_timeout: DEFAULT_COMMAND_TIMEOUT,
            timeout_sweep_interval: TIMEOUT_SWEEP_INTERVAL,
            retention_sweep_interval: RETENTION_SWEEP_INTERVAL,
            retention_window: RETENTION_WINDOW,
            analysis_concurrency: MAX_CONCURRENT_ANALYSES,
            prompt_marker: Some(shellbridge_tracker::DEFAULT_PROMPT_PATTERN.to_string()),
            max_connections: shellbridge_terminal::MAX_CONCURRENT_CONNECTIONS,
        }
    }
}
