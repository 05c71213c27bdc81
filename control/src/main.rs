//! Migration control plane for the interactive table.
//!
//! Opens the source and destination SQLite stores and starts the repair
//! consumer. Serves the stage/validation endpoints under `--prefix`, and
//! `POST /interactive/read`, whose writes go through the dual-write pool.
//!
//! Usage:
//!   migrator-control --src legacy.db --dst new.db --http-port 8080

use anyhow::{Context, Result};
use clap::Parser;
use migrator_control::build_router;
use migrator_control::interactive::{self, Interactive, SCHEMA};
use migrator_db::{ConnPool, DualWritePool, SqlitePool};
use migrator_reconcile::{
    Consumer, ConsumerConfig, INCONSISTENT_EVENT_TOPIC, Scheduler, ValidatorConfig, cancel_pair,
    channel,
};
use migrator_types::PatternCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "migrator-control")]
#[command(about = "Dual-write migration control plane")]
struct Args {
    /// Source (currently authoritative) SQLite database
    #[arg(long)]
    src: PathBuf,

    /// Destination SQLite database
    #[arg(long)]
    dst: PathBuf,

    /// HTTP port for the control endpoints
    #[arg(long, default_value = "8080")]
    http_port: u16,

    /// Path the control endpoints are mounted under
    #[arg(long, default_value = "/migrator/interactive")]
    prefix: String,

    /// Target ids compared per page during validation
    #[arg(long, default_value = "100")]
    batch_size: usize,

    /// Inconsistency events buffered between validator and consumer
    #[arg(long, default_value = "1024")]
    bus_capacity: usize,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let src = open_store(&args.src)?;
    let dst = open_store(&args.dst)?;

    let pattern = PatternCell::default();
    let pool: Arc<dyn ConnPool> =
        Arc::new(DualWritePool::new(src.clone(), dst.clone(), pattern.clone()));

    let (producer, stream) = channel(INCONSISTENT_EVENT_TOPIC, args.bus_capacity);
    let consumer = Consumer::<Interactive>::new(
        src.clone(),
        dst.clone(),
        stream,
        ConsumerConfig::default(),
    )
    .context("failed to build inconsistency consumer")?;
    let (consumer_handle, consumer_token) = cancel_pair();
    let consuming = tokio::spawn(consumer.run(consumer_token));

    let scheduler = Arc::new(Scheduler::<Interactive>::new(
        src,
        dst,
        pattern,
        Arc::new(producer),
        ValidatorConfig::default().with_batch_size(args.batch_size),
    ));
    let app = build_router(Arc::clone(&scheduler), &args.prefix)
        .merge(interactive::build_router(pool));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.http_port))
        .await
        .with_context(|| format!("failed to bind HTTP port {}", args.http_port))?;
    info!(port = args.http_port, prefix = %args.prefix, pattern = %scheduler.pattern(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("shutting down");
    drop(scheduler);
    consumer_handle.cancel();
    consuming.await.context("consumer task failed")?;
    Ok(())
}

fn open_store(path: &Path) -> Result<Arc<SqlitePool>> {
    let pool = SqlitePool::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    pool.execute_batch(SCHEMA)
        .with_context(|| format!("failed to create schema in {}", path.display()))?;
    info!(path = %path.display(), "store opened");
    Ok(Arc::new(pool))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
