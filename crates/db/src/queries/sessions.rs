//! Insert-if-absent writes and day-window reads for focus sessions.

use crate::{Database, DbResult};
use focuslog_core::SessionRecord;
use sqlx::{QueryBuilder, Sqlite};

/// SQLite's default ceiling on bound parameters per statement.
pub const SQLITE_MAX_BIND_PARAMS: usize = 999;

/// Columns bound per session row.
pub const SESSION_COLUMNS: usize = 16;

/// Rows that fit in one statement without crossing the bind ceiling.
pub const MAX_SESSIONS_PER_STATEMENT: usize = SQLITE_MAX_BIND_PARAMS / SESSION_COLUMNS;

/// Result of an insert-if-absent write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub duplicates: u64,
}

impl InsertOutcome {
    pub fn total(&self) -> u64 {
        self.inserted + self.duplicates
    }
}

impl std::ops::AddAssign for InsertOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.duplicates += rhs.duplicates;
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    device_id: String,
    app_name: String,
    window_title: String,
    url: Option<String>,
    start_time: i64,
    end_time: i64,
    duration: i64,
    bundle_id: Option<String>,
    tab_title: Option<String>,
    tab_count: Option<i64>,
    document_path: Option<String>,
    is_full_screen: bool,
    is_minimized: bool,
    synced_at: i64,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            device_id: row.device_id,
            app_name: row.app_name,
            window_title: row.window_title,
            url: row.url,
            start_time: row.start_time,
            end_time: row.end_time,
            duration: row.duration,
            bundle_id: row.bundle_id,
            tab_title: row.tab_title,
            tab_count: row.tab_count,
            document_path: row.document_path,
            is_full_screen: row.is_full_screen,
            is_minimized: row.is_minimized,
            synced_at: row.synced_at,
        }
    }
}

const SELECT_COLUMNS: &str = "id, user_id, device_id, app_name, window_title, url, \
     start_time, end_time, duration, bundle_id, tab_title, tab_count, document_path, \
     is_full_screen, is_minimized, synced_at";

impl Database {
    /// Insert every record whose id is not already stored, in one transaction.
    ///
    /// Existing ids are left untouched and reported as duplicates. A repeated
    /// id inside `records` counts as a duplicate of its first occurrence.
    /// Statements are split so none exceeds the bind-parameter ceiling.
    pub async fn insert_sessions_if_absent(
        &self,
        records: &[SessionRecord],
    ) -> DbResult<InsertOutcome> {
        if records.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let mut tx = self.pool().begin().await?;
        let mut inserted: u64 = 0;

        for rows in records.chunks(MAX_SESSIONS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO sessions ({SELECT_COLUMNS}) "
            ));
            qb.push_values(rows, |mut b, r| {
                b.push_bind(&r.id)
                    .push_bind(&r.user_id)
                    .push_bind(&r.device_id)
                    .push_bind(&r.app_name)
                    .push_bind(&r.window_title)
                    .push_bind(&r.url)
                    .push_bind(r.start_time)
                    .push_bind(r.end_time)
                    .push_bind(r.duration)
                    .push_bind(&r.bundle_id)
                    .push_bind(&r.tab_title)
                    .push_bind(r.tab_count)
                    .push_bind(&r.document_path)
                    .push_bind(r.is_full_screen)
                    .push_bind(r.is_minimized)
                    .push_bind(r.synced_at);
            });
            qb.push(" ON CONFLICT(id) DO NOTHING");

            let result = qb.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        Ok(InsertOutcome {
            inserted,
            duplicates: records.len() as u64 - inserted,
        })
    }

    /// A user's sessions whose start falls in `[start, end)`, in start order.
    pub async fn get_sessions_in_range(
        &self,
        user_id: &str,
        start: i64,
        end: i64,
    ) -> DbResult<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM sessions \
             WHERE user_id = ?1 AND start_time >= ?2 AND start_time < ?3 \
             ORDER BY start_time, id"
        ))
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    /// Number of stored sessions for a user, optionally narrowed to a device.
    pub async fn count_sessions(&self, user_id: &str, device_id: Option<&str>) -> DbResult<i64> {
        let row: (i64,) = match device_id {
            Some(device) => {
                sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = ?1 AND device_id = ?2")
                    .bind(user_id)
                    .bind(device)
                    .fetch_one(self.pool())
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = ?1")
                    .bind(user_id)
                    .fetch_one(self.pool())
                    .await?
            }
        };
        Ok(row.0)
    }
}
