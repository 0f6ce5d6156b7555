use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use fetchq_core::config;
use fetchq_core::history::HistoryStore;
use fetchq_core::logging;
use fetchq_core::registry::JobRegistry;
use fetchq_core::storage::OutputLayout;

mod server;

/// Local web front-end for queued yt-dlp downloads.
#[derive(Debug, Parser)]
#[command(name = "fetchqd")]
#[command(about = "fetchq: local HTTP front-end for queued media downloads", long_about = None)]
struct Args {
    /// Address to listen on. Keep it loopback; there is no authentication.
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Override the configured download directory.
    #[arg(long, value_name = "DIR")]
    download_dir: Option<PathBuf>,

    /// Log to stderr instead of the state-dir log file.
    #[arg(long)]
    log_stderr: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging as early as possible.
    if args.log_stderr || logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = run(args).await {
        eprintln!("fetchqd error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut cfg = config::load_or_init()?;
    if let Some(dir) = args.download_dir {
        cfg.download_dir = dir;
    }

    let layout = OutputLayout::new(cfg.download_dir.clone());
    layout.ensure()?;
    tracing::info!("audio directory: {}", layout.dir_for(fetchq_core::job::DownloadMode::Mp3).display());
    tracing::info!("video directory: {}", layout.dir_for(fetchq_core::job::DownloadMode::Mp4).display());

    let history = HistoryStore::new(cfg.history_path(), cfg.max_history_entries);
    let registry = Arc::new(JobRegistry::new(cfg, layout, history));

    let app = server::app_router(server::AppState::new(registry));
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    tracing::info!("fetchqd listening on http://{}", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested");
}
