//! Users, their devices and API-key lookup.

use crate::{Database, DbResult};
use sha2::{Digest, Sha256};

/// The owner a valid API key resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub user_id: String,
    pub device_id: String,
}

/// Hex SHA-256 of an API key. Only this digest is ever stored.
pub fn hash_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

impl Database {
    /// Provision (or rotate) the API key for a user's device.
    ///
    /// Creates the user with the default timezone if needed. Registering an
    /// existing (user, device) pair replaces its key.
    pub async fn register_device(
        &self,
        user_id: &str,
        device_id: &str,
        name: Option<&str>,
        api_key: &str,
        now: i64,
    ) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("INSERT INTO users (id, created_at) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING")
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO devices (api_key_hash, user_id, device_id, name, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, device_id) DO UPDATE SET
                api_key_hash = excluded.api_key_hash,
                name = excluded.name
            "#,
        )
        .bind(hash_api_key(api_key))
        .bind(user_id)
        .bind(device_id)
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Resolve an API key to its device, or `None` if unknown.
    pub async fn authenticate_api_key(&self, api_key: &str) -> DbResult<Option<DeviceIdentity>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT user_id, device_id FROM devices WHERE api_key_hash = ?1")
                .bind(hash_api_key(api_key))
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|(user_id, device_id)| DeviceIdentity { user_id, device_id }))
    }

    /// The user's stored timezone string, `None` for unknown users.
    pub async fn get_user_timezone(&self, user_id: &str) -> DbResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT timezone FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn set_user_timezone(&self, user_id: &str, timezone: &str, now: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, timezone, created_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET timezone = excluded.timezone
            "#,
        )
        .bind(user_id)
        .bind(timezone)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
