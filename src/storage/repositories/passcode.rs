//! Expiring key-value store for one-time passcodes.
//!
//! Records expire on their own: a row past `expires_at` is invisible to
//! `get`, whether or not the purge task has removed it yet.

use crate::errors::{HackathonError, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::instrument;

#[async_trait]
pub trait PasscodeCache: Send + Sync {
    /// Store `value` under `key`, replacing any live value
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the live value for `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn del(&self, key: &str) -> Result<()>;

    /// Delete `key` only while it still holds the live `value`.
    ///
    /// Returns `false` when the value was replaced, expired or already taken,
    /// so at most one caller ever sees `true` for a given record.
    async fn take(&self, key: &str, value: &str) -> Result<bool>;

    /// Drop expired records, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct SqlxPasscodeCache {
    pool: DbPool,
}

impl SqlxPasscodeCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PasscodeCache for SqlxPasscodeCache {
    #[instrument(skip(self, value), name = "db_passcode_set")]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| HackathonError::internal(format!("Passcode TTL out of range: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO passcodes (email, code, expires_at) VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now() + ttl)
        .execute(&self.pool)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to store passcode"))?;

        Ok(())
    }

    #[instrument(skip(self), name = "db_passcode_get")]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT code FROM passcodes WHERE email = $1 AND expires_at > NOW()")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to read passcode"))
    }

    #[instrument(skip(self), name = "db_passcode_del")]
    async fn del(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM passcodes WHERE email = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to delete passcode"))?;

        Ok(())
    }

    #[instrument(skip(self, value), name = "db_passcode_take")]
    async fn take(&self, key: &str, value: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM passcodes WHERE email = $1 AND code = $2 AND expires_at > NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| HackathonError::database(e, "Failed to consume passcode"))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), name = "db_passcode_purge")]
    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM passcodes WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| HackathonError::database(e, "Failed to purge expired passcodes"))?;

        Ok(result.rows_affected())
    }
}
