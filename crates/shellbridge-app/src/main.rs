use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;

use shellbridge_api::{ChatClient, OpenAiChatClient};
use shellbridge_terminal::{PtyTransport, ShellTransport};

use shellbridge_app::cli::Cli;
use shellbridge_app::service::BridgeService;
use shellbridge_app::web::server::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.to_config();

    let api_key = cli.api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        eprintln!(
            "{}",
            "⚠️  No API key set (SHELLBRIDGE_API_KEY); output analysis will fail until one is provided"
                .yellow()
        );
    }

    let chat_client: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::new(
        api_key,
        cli.model.clone(),
        cli.api_url.clone(),
    ));

    let transport: Arc<dyn ShellTransport> = if cli.local_shell {
        Arc::new(PtyTransport::local(cli.shell.clone()))
    } else {
        Arc::new(PtyTransport::remote(cli.ssh_program.clone()))
    };

    println!("{}", "shellbridge".bold().green());
    println!("   model:     {}", cli.model);
    println!("   transport: {}", transport.name());

    let service = BridgeService::new(config, chat_client, transport)?;

    WebServer::new(service).start().await
}
