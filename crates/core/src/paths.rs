//! Centralized path functions for all app storage locations.

use std::path::PathBuf;

/// App cache root: `~/Library/Caches/focuslog/` (macOS) or `~/.cache/focuslog/` (Linux).
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("focuslog"))
}

/// SQLite database file: `<app_cache_dir>/focuslog.db`.
pub fn db_path() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("focuslog.db"))
}

/// Default directory for rolling log files: `<app_cache_dir>/logs/`.
pub fn log_dir() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("logs"))
}
