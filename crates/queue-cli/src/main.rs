//! Binary entry point: config loading, logger init, store-adapter wiring,
//! and the CLI surface. This is the one place in the workspace allowed to
//! unwrap a top-level `Result` — every library crate underneath
//! propagates errors instead.

mod cli;
mod config;
mod handlers;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use queue_core::{QueueEngine, RecoveryOps};
use queue_postgres::PgRecordStore;
use queue_redis::RedisListStore;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command};
use config::Config;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(
        cli.config.clone(),
        cli.app_prefix.clone(),
        cli.postgres_url.clone(),
        cli.redis_url.clone(),
        cli.log.clone(),
    )?;

    tracing_subscriber::fmt().with_env_filter(config.log.as_str()).compact().init();

    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .connect(&config.postgres_url)
        .await
        .with_context(|| format!("connecting to postgres at {}", config.postgres_url))?;
    queue_postgres::migrate(&pg_pool).await.context("running postgres migrations")?;

    let list_store = Arc::new(
        RedisListStore::connect(&config.redis_url)
            .await
            .with_context(|| format!("connecting to redis at {}", config.redis_url))?,
    );
    let record_store = Arc::new(PgRecordStore::new(pg_pool));

    let engine = Arc::new(QueueEngine::new(list_store, record_store, config.app_prefix.clone()));
    let recovery = Arc::new(RecoveryOps::new(engine.clone()));

    match cli.command {
        Command::Work { queue, worker } => work(engine, queue, worker).await,
        Command::Clear { queue, all } => clear(engine, recovery, queue, all).await,
        Command::Flush { queue, all } => flush(engine, recovery, queue, all).await,
        Command::Forget { id } => forget(recovery, id).await,
        Command::Retry { queue, id } => retry(engine, queue, id).await,
        Command::Restore { queue } => restore(recovery, queue).await,
        Command::ServeAdmin { port } => serve_admin(recovery, port).await,
    }
}

async fn work(engine: Arc<QueueEngine>, queue: String, worker: usize) -> anyhow::Result<()> {
    tracing::info!(queue = %queue, worker, "starting queue workers");
    let registry = Arc::new(handlers::default_registry());
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("received shutdown signal, cancelling worker loops");
        signal_cancel.cancel();
    });

    queue_core::run_workers(engine, registry, &queue, worker, cancel).await;
    Ok(())
}

async fn clear(engine: Arc<QueueEngine>, recovery: Arc<RecoveryOps>, queue: String, all: bool) -> anyhow::Result<()> {
    if all {
        let total = recovery.clear_all().await?;
        tracing::info!(total, "cleared all queues");
    } else {
        let total = engine.clear(&queue).await?;
        tracing::info!(queue = %queue, total, "cleared queue");
    }
    Ok(())
}

async fn flush(engine: Arc<QueueEngine>, recovery: Arc<RecoveryOps>, queue: String, all: bool) -> anyhow::Result<()> {
    if all {
        let total = recovery.flush_all_failed().await?;
        tracing::info!(total, "flushed failed jobs on all queues");
    } else {
        let total = engine.remove_all_failed(&queue).await?;
        tracing::info!(queue = %queue, total, "flushed failed jobs");
    }
    Ok(())
}

async fn forget(recovery: Arc<RecoveryOps>, id: uuid::Uuid) -> anyhow::Result<()> {
    let queue = recovery.remove_job_on_any_queue_by_id(id).await?;
    tracing::info!(job_id = %id, queue = %queue, "job forgotten");
    Ok(())
}

async fn retry(engine: Arc<QueueEngine>, queue: String, id: Option<uuid::Uuid>) -> anyhow::Result<()> {
    match id {
        Some(id) => {
            engine.retry_failed_by_job_id(&queue, id).await?;
            tracing::info!(job_id = %id, queue = %queue, "job retried");
        }
        None => {
            let total = engine.retry_all_failed(&queue).await?;
            tracing::info!(queue = %queue, total, "retried all failed jobs");
        }
    }
    Ok(())
}

async fn restore(recovery: Arc<RecoveryOps>, queue: String) -> anyhow::Result<()> {
    let restored = recovery.restore_unfinished(&queue).await?;
    tracing::info!(queue = %queue, restored, "restored unfinished jobs");
    Ok(())
}

async fn serve_admin(recovery: Arc<RecoveryOps>, port: u16) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    queue_http::serve(addr, queue_http::AppState { recovery }).await
}

/// Blocks until SIGINT or (on Unix) SIGTERM arrives; cooperative shutdown
/// trigger for the worker pool.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
