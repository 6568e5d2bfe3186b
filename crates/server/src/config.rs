// crates/server/src/config.rs
//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use focuslog_db::{MAX_SESSIONS_PER_STATEMENT, SESSION_COLUMNS, SQLITE_MAX_BIND_PARAMS};
use focuslog_observability::{LogConfig, DEFAULT_FILTER};

use crate::drain::DrainConfig;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47900;

#[derive(Debug, Parser)]
#[command(name = "focuslog-server", version, about = "Focus-session sync and daily analytics server")]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP server (the default).
    Serve,
    /// Provision an API key for a user's device and print it.
    RegisterDevice {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        device_id: String,
        /// Human-readable device name.
        #[arg(long)]
        name: Option<String>,
        /// Use this key instead of generating one.
        #[arg(long, env = "FOCUSLOG_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[arg(long, env = "FOCUSLOG_HOST", default_value = "127.0.0.1", global = true)]
    pub host: String,

    #[arg(long, env = "FOCUSLOG_PORT", default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,

    /// Database file. Defaults to the user cache directory.
    #[arg(long, env = "FOCUSLOG_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    #[arg(long, env = "FOCUSLOG_DRAIN_INTERVAL_MS", default_value_t = 2000, global = true)]
    pub drain_interval_ms: u64,

    #[arg(long, env = "FOCUSLOG_DRAIN_WORKERS", default_value_t = 1, global = true)]
    pub drain_workers: usize,

    /// Records per write transaction. Capped by the store's bind limit.
    #[arg(long, env = "FOCUSLOG_CHUNK_SIZE", global = true)]
    pub chunk_size: Option<usize>,

    #[arg(long, env = "FOCUSLOG_CHUNK_TIMEOUT_MS", default_value_t = 10_000, global = true)]
    pub chunk_timeout_ms: u64,

    #[arg(long, env = "FOCUSLOG_MAX_CHUNK_ATTEMPTS", default_value_t = 3, global = true)]
    pub max_chunk_attempts: u32,

    #[arg(long, env = "FOCUSLOG_MAX_BATCH_REQUEUES", default_value_t = 5, global = true)]
    pub max_batch_requeues: u32,

    /// How often batches parked after repeated failures are retried.
    #[arg(long, env = "FOCUSLOG_PARKED_RETRY_SECS", default_value_t = 60, global = true)]
    pub parked_retry_secs: u64,

    /// Maximum queued batches before sync requests get 503. 0 is unbounded.
    #[arg(long, env = "FOCUSLOG_QUEUE_CAPACITY", default_value_t = 0, global = true)]
    pub queue_capacity: usize,

    #[arg(long, env = "FOCUSLOG_SHUTDOWN_FLUSH_SECS", default_value_t = 10, global = true)]
    pub shutdown_flush_secs: u64,

    #[arg(long, env = "FOCUSLOG_LOG_JSON", global = true)]
    pub log_json: bool,

    /// Also write rotating log files here.
    #[arg(long, env = "FOCUSLOG_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            json: self.log_json,
            log_dir: self.log_dir.clone(),
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }

    /// Chunk size to use: the configured one, clamped so a single statement
    /// never binds more than the store allows.
    pub fn effective_chunk_size(&self) -> usize {
        match self.chunk_size {
            None => MAX_SESSIONS_PER_STATEMENT,
            Some(0) => {
                tracing::warn!("Chunk size 0 is invalid, using 1");
                1
            }
            Some(n) if n > MAX_SESSIONS_PER_STATEMENT => {
                tracing::warn!(
                    requested = n,
                    max = MAX_SESSIONS_PER_STATEMENT,
                    columns = SESSION_COLUMNS,
                    bind_limit = SQLITE_MAX_BIND_PARAMS,
                    "Chunk size exceeds the bind-parameter limit, clamping"
                );
                MAX_SESSIONS_PER_STATEMENT
            }
            Some(n) => n,
        }
    }

    pub fn drain_config(&self) -> DrainConfig {
        DrainConfig {
            interval: Duration::from_millis(self.drain_interval_ms.max(1)),
            workers: self.drain_workers,
            chunk_size: self.effective_chunk_size(),
            chunk_timeout: Duration::from_millis(self.chunk_timeout_ms),
            max_chunk_attempts: self.max_chunk_attempts,
            max_batch_requeues: self.max_batch_requeues,
            parked_retry_interval: Duration::from_secs(self.parked_retry_secs.max(1)),
            shutdown_flush: Duration::from_secs(self.shutdown_flush_secs),
        }
    }
}
