use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::config::AppConfig;

/// CLI arguments for shellbridge
#[derive(Parser, Debug)]
#[command(name = "shellbridge")]
#[command(about = "Agent-operated remote shell bridge with live human viewers")]
#[command(version)]
pub struct Cli {
    /// Address to serve the API and WebSocket endpoints on
    #[arg(long, default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    /// API key for the chat model backend
    #[arg(long, env = "SHELLBRIDGE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Chat completions endpoint (OpenAI-compatible)
    #[arg(
        long,
        env = "SHELLBRIDGE_API_URL",
        default_value = "https://api.groq.com/openai/v1/chat/completions"
    )]
    pub api_url: String,

    /// Model name sent to the chat backend
    #[arg(long, env = "SHELLBRIDGE_MODEL", default_value = "openai/gpt-oss-120b")]
    pub model: String,

    /// Default command timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub command_timeout: u64,

    /// How many output analyses may run concurrently
    #[arg(long, default_value_t = 4)]
    pub analysis_concurrency: usize,

    /// Regex that marks the shell prompt for completion detection;
    /// pass an empty string to disable automatic detection
    #[arg(long, value_name = "REGEX")]
    pub prompt_marker: Option<String>,

    /// ssh client program used to reach remote hosts
    #[arg(long, default_value = "ssh")]
    pub ssh_program: String,

    /// Spawn a local shell instead of ssh (development mode)
    #[arg(long)]
    pub local_shell: bool,

    /// Shell program for --local-shell
    #[arg(long, default_value = "/bin/bash")]
    pub shell: String,

    /// Age in seconds past which finished command records are dropped
    #[arg(long, value_name = "SECONDS", default_value_t = 3600)]
    pub retention_window: u64,
}

impl Cli {
    pub fn to_config(&self) -> AppConfig {
        let prompt_marker = match &self.prompt_marker {
            Some(pattern) if pattern.is_empty() => None,
            Some(pattern) => Some(pattern.clone()),
            None => AppConfig::default().prompt_marker,
        };

        AppConfig {
            bind_addr: self.bind,
            default_command_timeout: Duration::from_secs(self.command_timeout),
            analysis_concurrency: self.analysis_concurrency,
            prompt_marker,
            retention_window: Duration::from_secs(self.retention_window),
            ..AppConfig::default()
        }
    }
}
