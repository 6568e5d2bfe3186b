// crates/server/src/main.rs
//! Focuslog server binary.
//!
//! `serve` (the default) starts the drain workers and the HTTP server. On
//! shutdown the server stops accepting requests first, then the workers are
//! stopped and whatever is still queued is flushed within a deadline.
//!
//! `register-device` provisions an API key and prints it once.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use focuslog_db::Database;
use focuslog_observability::init_tracing;
use focuslog_server::{
    create_app_with_state, init_metrics, AppState, Cli, Command, DrainStats, DrainWorker,
    ServerConfig, SyncQueue,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections...");
}

async fn open_database(config: &ServerConfig) -> Result<Database> {
    let db = match &config.db_path {
        Some(path) => Database::new(path).await,
        None => Database::open_default().await,
    }
    .context("opening database")?;
    info!(path = %db.db_path().display(), "Database ready");
    Ok(db)
}

async fn register_device(
    db: &Database,
    user_id: &str,
    device_id: &str,
    name: Option<&str>,
    api_key: Option<String>,
) -> Result<()> {
    let generated = api_key.is_none();
    let api_key = api_key.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    db.register_device(user_id, device_id, name, &api_key, Utc::now().timestamp())
        .await
        .context("registering device")?;
    info!(user_id, device_id, "Device registered");

    if generated {
        println!("{api_key}");
    }
    Ok(())
}

async fn serve(db: Database, config: &ServerConfig) -> Result<()> {
    init_metrics();

    let drain_config = config.drain_config();
    let queue = Arc::new(if config.queue_capacity == 0 {
        SyncQueue::unbounded()
    } else {
        SyncQueue::new(config.queue_capacity)
    });
    let stats = Arc::new(DrainStats::new());
    let state = AppState::with_queue(db.clone(), queue.clone(), stats.clone());

    let worker = Arc::new(DrainWorker::new(Arc::new(db), queue, stats, drain_config));
    let cancel = CancellationToken::new();
    let handles = worker.spawn(cancel.clone());
    info!(
        workers = handles.len(),
        chunk_size = worker.config().chunk_size,
        interval_ms = worker.config().interval.as_millis() as u64,
        "Drain workers started"
    );

    let app = create_app_with_state(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, stopping drain workers");
    let deadline = worker.config().shutdown_flush;
    let started = Instant::now();
    cancel.cancel();
    let joined = tokio::time::timeout(deadline, async {
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Drain worker ended abnormally");
            }
        }
    })
    .await;
    if joined.is_err() {
        tracing::warn!(
            deadline_ms = deadline.as_millis() as u64,
            "Drain workers did not stop before the shutdown deadline"
        );
    }

    let report = worker.flush(deadline.saturating_sub(started.elapsed())).await;
    info!(
        drained = report.drained_batches,
        abandoned = report.abandoned_batches,
        "Shutdown complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(&cli.server.log_config())?;

    let db = open_database(&cli.server).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db, &cli.server).await,
        Command::RegisterDevice {
            user_id,
            device_id,
            name,
            api_key,
        } => register_device(&db, &user_id, &device_id, name.as_deref(), api_key).await,
    }
}
