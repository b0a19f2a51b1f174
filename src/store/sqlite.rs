//! Persistent key-value storage using SQLite.
//!
//! Credentials survive restarts; states are cleaned up by expiry.

use super::KeyValueStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite-backed key-value store.
///
/// # Schema
/// ```sql
/// CREATE TABLE kv (
///     key TEXT PRIMARY KEY,
///     value TEXT NOT NULL,
///     expires_at INTEGER          -- unix seconds, NULL = never
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - `take` is a single `DELETE ... RETURNING` statement, so two callers
///   racing on one key cannot both receive the value
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Creates or opens a store. `":memory:"` gives a private in-memory database.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            )
            "#,
            [],
        )
        .context("Failed to create kv table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_kv_expires_at ON kv(expires_at)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Expiry timestamp for a TTL starting at `now`, rounded up to whole seconds.
fn expires_at_for(ttl: Duration, now: i64) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    now.saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))
}

fn is_live(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.map_or(true, |at| at > now)
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| expires_at_for(ttl, now_secs()));

        self.conn()?
            .execute(
                r#"
                INSERT INTO kv (key, value, expires_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at
                "#,
                params![key, value, expires_at],
            )
            .context("Failed to store value")?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String, Option<i64>)> = self
            .conn()?
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read value")?;

        Ok(row
            .filter(|(_, expires_at)| is_live(*expires_at, now_secs()))
            .map(|(value, _)| value))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute(
                "DELETE FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_secs()],
            )
            .context("Failed to delete value")?;

        Ok(rows_affected > 0)
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String, Option<i64>)> = self
            .conn()?
            .query_row(
                "DELETE FROM kv WHERE key = ?1 RETURNING value, expires_at",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to take value")?;

        Ok(row
            .filter(|(_, expires_at)| is_live(*expires_at, now_secs()))
            .map(|(value, _)| value))
    }

    async fn purge_expired(&self) -> Result<usize> {
        let removed = self
            .conn()?
            .execute(
                "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now_secs()],
            )
            .context("Failed to purge expired keys")?;

        Ok(removed)
    }
}
