//! Switchboard server binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use switchboard::auth::{Authenticator, JwtAuthenticator, StaticAuthenticator};
use switchboard::config::SwitchboardConfig;
use switchboard::knowledge::KnowledgeBase;
use switchboard::runtime::HttpAgentRuntime;
use switchboard::server::{router, AppState};
use switchboard::session::MemorySessionStore;

#[derive(Parser)]
#[command(name = "switchboard", about = "Streaming orchestration gateway")]
struct Cli {
    /// Address to listen on (overrides config and environment).
    #[arg(long)]
    bind: Option<String>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory of markdown knowledge collections.
    #[arg(long)]
    knowledge_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = SwitchboardConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(root) = cli.knowledge_root {
        config.knowledge_root = Some(root);
    }

    let mut runtime = HttpAgentRuntime::new(config.upstream.base_url.clone());
    if let Some(api_key) = &config.upstream.api_key {
        runtime = runtime.with_api_key(api_key.clone());
    }
    if let Some(root) = &config.knowledge_root {
        let knowledge = KnowledgeBase::new(root.clone());
        let tools = knowledge.tool_definitions();
        tracing::info!(root = %root.display(), tools = tools.len(), "knowledge tools enabled");
        runtime = runtime.with_tools(tools);
    } else {
        tracing::info!("no knowledge root configured; agent runs without local tools");
    }

    let authenticator: Arc<dyn Authenticator> = if config.auth.disabled {
        tracing::warn!("authentication disabled; all requests use a fixed test user");
        Arc::new(StaticAuthenticator)
    } else {
        let mut jwt = JwtAuthenticator::new();
        if let Some(audience) = &config.auth.audience {
            jwt = jwt.with_audience(audience);
        }
        Arc::new(jwt)
    };

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        authenticator,
        sessions: Arc::new(MemorySessionStore::new()),
        runtime: Arc::new(runtime),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "switchboard listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
