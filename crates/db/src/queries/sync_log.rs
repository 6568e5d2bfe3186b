//! Append-only sync audit log.

use crate::{Database, DbResult};
use serde::Serialize;

/// One drained batch, as recorded in `sync_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub sync_id: String,
    pub user_id: String,
    pub device_id: String,
    /// Records committed in this pass, duplicates included.
    pub session_count: i64,
    pub inserted_count: i64,
    pub duplicate_count: i64,
    pub min_start_time: Option<i64>,
    pub max_start_time: Option<i64>,
    pub synced_at: i64,
}

/// Latest sync for one device of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSyncStatus {
    pub device_id: String,
    pub last_sync_at: i64,
    /// Sessions covered by the latest sync.
    pub session_count: i64,
    /// All sessions stored for this device.
    pub total_sessions: i64,
}

impl Database {
    pub async fn append_sync_log(&self, entry: &SyncLogEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_logs (
                sync_id, user_id, device_id, session_count, inserted_count,
                duplicate_count, min_start_time, max_start_time, synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.sync_id)
        .bind(&entry.user_id)
        .bind(&entry.device_id)
        .bind(entry.session_count)
        .bind(entry.inserted_count)
        .bind(entry.duplicate_count)
        .bind(entry.min_start_time)
        .bind(entry.max_start_time)
        .bind(entry.synced_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Most recent sync-log row per device, ordered by device id.
    pub async fn latest_sync_per_device(&self, user_id: &str) -> DbResult<Vec<DeviceSyncStatus>> {
        let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT l.device_id, l.synced_at, l.session_count,
                   (SELECT COUNT(*) FROM sessions s
                     WHERE s.user_id = l.user_id AND s.device_id = l.device_id)
            FROM sync_logs l
            WHERE l.user_id = ?1
              AND l.id = (SELECT MAX(m.id) FROM sync_logs m
                           WHERE m.user_id = l.user_id AND m.device_id = l.device_id)
            ORDER BY l.device_id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(device_id, last_sync_at, session_count, total_sessions)| DeviceSyncStatus {
                    device_id,
                    last_sync_at,
                    session_count,
                    total_sessions,
                },
            )
            .collect())
    }

    /// Newest-first sync-log rows for a user.
    pub async fn recent_sync_logs(&self, user_id: &str, limit: i64) -> DbResult<Vec<SyncLogEntry>> {
        let rows: Vec<(String, String, String, i64, i64, i64, Option<i64>, Option<i64>, i64)> =
            sqlx::query_as(
                r#"
                SELECT sync_id, user_id, device_id, session_count, inserted_count,
                       duplicate_count, min_start_time, max_start_time, synced_at
                FROM sync_logs
                WHERE user_id = ?1
                ORDER BY id DESC
                LIMIT ?2
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| SyncLogEntry {
                sync_id: r.0,
                user_id: r.1,
                device_id: r.2,
                session_count: r.3,
                inserted_count: r.4,
                duplicate_count: r.5,
                min_start_time: r.6,
                max_start_time: r.7,
                synced_at: r.8,
            })
            .collect())
    }
}
