/// Inline SQL migrations for the focuslog database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained. One statement per entry.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: sessions table. Rows are insert-only, keyed by the
    // client-assigned id.
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    id             TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL,
    device_id      TEXT NOT NULL,
    app_name       TEXT NOT NULL,
    window_title   TEXT NOT NULL,
    url            TEXT,
    start_time     INTEGER NOT NULL,
    end_time       INTEGER NOT NULL,
    duration       INTEGER NOT NULL,
    bundle_id      TEXT,
    tab_title      TEXT,
    tab_count      INTEGER,
    document_path  TEXT,
    is_full_screen BOOLEAN NOT NULL DEFAULT 0,
    is_minimized   BOOLEAN NOT NULL DEFAULT 0,
    synced_at      INTEGER NOT NULL,
    CHECK (end_time > start_time),
    CHECK (duration >= 0)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_user_start ON sessions(user_id, start_time);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_user_device ON sessions(user_id, device_id);"#,
    // Migration 2: append-only sync audit log, one row per drained batch.
    r#"
CREATE TABLE IF NOT EXISTS sync_logs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    sync_id         TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    device_id       TEXT NOT NULL,
    session_count   INTEGER NOT NULL,
    inserted_count  INTEGER NOT NULL,
    duplicate_count INTEGER NOT NULL,
    min_start_time  INTEGER,
    max_start_time  INTEGER,
    synced_at       INTEGER NOT NULL
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sync_logs_user_device ON sync_logs(user_id, device_id, id);"#,
    // Migration 3: per-day summary cache. Stats are write-once; the
    // analysis columns may be overwritten.
    r#"
CREATE TABLE IF NOT EXISTS daily_summaries (
    user_id         TEXT NOT NULL,
    date            TEXT NOT NULL,
    stats_json      TEXT,
    ai_score        INTEGER,
    ai_result       TEXT,
    ai_model        TEXT,
    ai_generated_at INTEGER,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    PRIMARY KEY (user_id, date)
);
"#,
    // Migration 4: users and their devices. Only API key digests are stored.
    r#"
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY,
    timezone   TEXT NOT NULL DEFAULT 'UTC',
    created_at INTEGER NOT NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS devices (
    api_key_hash TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(id),
    device_id    TEXT NOT NULL,
    name         TEXT,
    created_at   INTEGER NOT NULL,
    UNIQUE (user_id, device_id)
);
"#,
    // Migration 5: the timezone cached stats were computed in. A row whose
    // timezone differs from the user's current one is a stats miss.
    r#"ALTER TABLE daily_summaries ADD COLUMN stats_timezone TEXT;"#,
];
