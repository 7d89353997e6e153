use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use loess_config::Config;
use loess_graph::GraphClient;
use loess_llm::DeepSeekProvider;
use loess_store::{SqlitePool, SqliteStore};
use loess_web::AppState;

#[derive(Parser)]
#[command(name = "loess", version, about = "GraphRAG chat service over a narrative corpus")]
struct Cli {
    /// Path to loess.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Create the user if needed and mint an API key for it
    Keygen {
        /// User email the key belongs to
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let env_filter = format!(
        "loess_cli={level},loess_web={level},loess_pipeline={level},loess_graph={level},loess_store={level},loess_llm={level}"
    );
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Keygen { email } => keygen(&config, &email),
    }
}

/// Composition root: build the collaborators once, run the server, close
/// the graph client on the way out.
async fn serve(config: Config) -> Result<()> {
    let pool = SqlitePool::new(&config.storage)?;
    let store = Arc::new(SqliteStore::new(pool));
    let graph = GraphClient::connect(&config.graph).await?;
    let model = Arc::new(DeepSeekProvider::from_config(&config.llm)?);

    let state = AppState {
        store,
        graph: Arc::new(graph.clone()),
        model,
    };

    let result = tokio::select! {
        r = loess_web::serve(state, &config.server) => r.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    graph.close().await?;
    result
}

fn keygen(config: &Config, email: &str) -> Result<()> {
    let pool = SqlitePool::new(&config.storage)?;
    let store = SqliteStore::new(pool);
    let user = store.ensure_user(email)?;
    let key = store.issue_api_key(&user.id)?;
    println!("{key}");
    Ok(())
}
