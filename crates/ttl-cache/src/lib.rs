//! TTL Ingestion Cache
//!
//! Every ingestion call (fires, assets, weather) consults a time-to-live
//! key/value store before going upstream. Staleness is computed from a write
//! timestamp stored with each entry; entries older than the caller's
//! `max_age` are treated as absent. Keys must deterministically encode the
//! provider, source, and geographic/day parameters so distinct queries never
//! collide.
//!
//! Two implementations: [`DiskCache`] writes one JSON file per key
//! (`{"timestamp": ..., "data": ...}`), [`MemoryCache`] is an in-memory fake
//! for tests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod disk;
mod memory;

pub use disk::DiskCache;
pub use memory::MemoryCache;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Read-through cache contract shared by all ingestion collaborators.
///
/// Entries are immutable value snapshots: a concurrent duplicate fetch that
/// double-writes the same key is wasteful but never unsafe, and readers must
/// never observe a torn entry.
#[async_trait]
pub trait IngestionCache: Send + Sync {
    /// Fetch a value if present and younger than `max_age`.
    async fn get(&self, key: &str, max_age: Duration) -> CacheResult<Option<Value>>;

    /// Store a value under `key`, stamping it with the current time.
    async fn put(&self, key: &str, value: &Value) -> CacheResult<()>;
}

/// Typed read helper over the raw [`Value`] contract.
pub async fn get_json<T: DeserializeOwned>(
    cache: &Arc<dyn IngestionCache>,
    key: &str,
    max_age: Duration,
) -> CacheResult<Option<T>> {
    match cache.get(key, max_age).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Typed write helper over the raw [`Value`] contract.
pub async fn put_json<T: Serialize>(
    cache: &Arc<dyn IngestionCache>,
    key: &str,
    value: &T,
) -> CacheResult<()> {
    cache.put(key, &serde_json::to_value(value)?).await
}
