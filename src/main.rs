// coordinator-agent: main entry point

use anyhow::Context as _;
use clap::Parser;
use coordinator_agent::{serve, AppState, CoordinatorConfig, LmStudioClient};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "coordinator-agent", about = "LLM-driven service coordinator")]
struct Cli {
    /// Address the HTTP server binds to
    #[arg(long, env = "COORDINATOR_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = CoordinatorConfig::from_env().context("failed to load configuration")?;

    info!("Starting coordinator-agent");
    info!("Listen address: {}", cli.listen);
    info!("LLM backend: {}", config.lmstudio_url);
    info!("Vector store: {}", config.chroma_url);
    info!("Trace log: {}", config.trace_log_path.display());

    let llm = Arc::new(LmStudioClient::new(&config).context("failed to build LLM client")?);
    let state = Arc::new(AppState::new(config, llm).context("failed to assemble server state")?);

    match serve(state, &cli.listen).await {
        Ok(()) => {
            info!("Server stopped");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e.into())
        }
    }
}
