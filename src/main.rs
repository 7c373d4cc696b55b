use clap::Parser;
use pollgate::config::PollSettings;
use pollgate::polls::{LoggingAdapter, MemoryPollStore, PollEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Poll engine gateway skeleton. Real deployments embed the library
/// behind a channel binding; this binary runs the engine with a
/// logging-only adapter.
#[derive(Debug, Parser)]
#[command(name = "pollgate", version)]
struct Cli {
    /// Path to a JSON5 settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    pollgate::logging::init(Some(&cli.log_level), cli.json_logs);

    let settings = match &cli.config {
        Some(path) => PollSettings::load(path)?,
        None => PollSettings::default(),
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("POLLGATE_GIT_HASH"),
        "pollgate starting"
    );

    let store = Arc::new(MemoryPollStore::new());
    let adapter = Arc::new(LoggingAdapter);
    let engine = PollEngine::new(store, adapter, settings);

    tokio::signal::ctrl_c().await?;
    info!(active = engine.stats().active_polls, "shutting down");
    engine.shutdown();

    Ok(())
}
