//! Key-value storage with per-key expiry.
//!
//! Holds two kinds of records:
//!
//! ```text
//! {provider}_state:{state_token}             -> {"user_id", "org_id", ...}   TTL 600s
//! {provider}_credentials:{org_id}:{user_id}  -> credential JSON               no TTL
//! ```
//!
//! Backends must make single-key `put`/`get`/`delete` atomic, and `take` must
//! hand a value to at most one caller. The callback path relies on `take` so a
//! state token can be exchanged only once even under concurrent callbacks.

use crate::config::{StoreBackend, StoreConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Insert or replace `key`. `ttl = None` means the key never expires.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Current value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key`. Returns true if a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically read and remove `key`.
    async fn take(&self, key: &str) -> Result<Option<String>>;

    /// Drop every expired key, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

/// Open the backend selected by `config`.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(
            SqliteStore::new(&config.sqlite_path)
                .with_context(|| format!("Failed to open store at {}", config.sqlite_path))?,
        ),
    };
    Ok(store)
}

/// Key under which an authorization state is parked.
pub fn state_key(provider: &str, state: &str) -> String {
    format!("{}_state:{}", provider, state)
}

/// Key under which a (provider, org, user) credential lives.
pub fn credentials_key(provider: &str, org_id: &str, user_id: &str) -> String {
    format!("{}_credentials:{}:{}", provider, org_id, user_id)
}

/// Background task to periodically purge expired keys
pub async fn run_expiry_sweep(store: Arc<dyn KeyValueStore>, interval_seconds: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));

    loop {
        interval.tick().await;
        match store.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Expired keys purged"),
            Err(e) => tracing::warn!(error = %e, "Expiry sweep failed"),
        }
    }
}
