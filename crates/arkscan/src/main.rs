mod cli;
mod server;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use tokio::sync::mpsc;

use arkscan_core::feed::{self, FileFeed};
use arkscan_core::index::Index;
use arkscan_core::store::{JsonlStore, MemoryStore, Storage};
use arkscan_core::{Processor, QueryService, ReplayPolicy};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let storage: Arc<dyn Storage> = match &args.store {
        Some(path) => {
            let store = JsonlStore::open(path)
                .await
                .context("open storage log")?;
            tracing::info!(path = %path.display(), "using persistent storage log");
            Arc::new(store)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let policy = if args.strict_replay {
        ReplayPolicy::Reject
    } else {
        ReplayPolicy::Ignore
    };

    let index = Index::shared();
    let processor = Arc::new(
        Processor::recover(storage, index.clone(), policy)
            .await
            .context("rebuild index from storage")?,
    );

    // The feed reader and the processor run as separate tasks joined by a
    // bounded channel; a slow processor applies backpressure to the reader.
    if let Some(path) = &args.events {
        let (tx, rx) = mpsc::channel(args.feed_buffer.max(1));
        let follow = args
            .follow
            .then(|| Duration::from_millis(args.poll_interval_ms.max(1)));
        let feed = FileFeed::new(path);
        let feed_path = path.clone();

        tokio::spawn(async move {
            if let Err(err) = feed::pump_file_feed(feed, tx, follow).await {
                tracing::error!(path = %feed_path.display(), error = %err, "event feed stopped");
            }
        });
        let retry_backoff = Duration::from_millis(args.retry_backoff_ms.max(1));
        tokio::spawn(feed::drive(processor.clone(), rx, retry_backoff));
        tracing::info!(path = %path.display(), follow = args.follow, "ingesting event feed");
    } else {
        tracing::warn!("no --events feed configured; serving the stored index only");
    }

    let state = server::AppState {
        query: QueryService::new(index),
    };

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let origin = format!("http://{}:{}", args.bind, args.port);
    let router = server::build_router(state, &origin).context("build router")?;

    if args.bind == "0.0.0.0" {
        tracing::warn!("server is bound to 0.0.0.0; it is accessible from the network");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("bind TCP listener")?;

    tracing::info!("listening on {bind_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("run HTTP server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
