//! In-memory cache used in tests and single-process deployments.

use crate::{CacheResult, IngestionCache};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

struct Entry {
    written_at: DateTime<Utc>,
    data: Value,
}

/// `RwLock<HashMap>`-backed cache. Entries are whole-value snapshots, so
/// readers never see a partial write.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, regardless of age.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Backdate an entry's write time (test hook for expiry paths).
    pub async fn age_entry(&self, key: &str, age: Duration) {
        if let Some(entry) = self.entries.write().await.get_mut(key) {
            entry.written_at = Utc::now()
                - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
        }
    }
}

#[async_trait]
impl IngestionCache for MemoryCache {
    async fn get(&self, key: &str, max_age: Duration) -> CacheResult<Option<Value>> {
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };

        let age = Utc::now().signed_duration_since(entry.written_at);
        if age.num_seconds() > max_age.as_secs() as i64 {
            return Ok(None);
        }
        Ok(Some(entry.data.clone()))
    }

    async fn put(&self, key: &str, value: &Value) -> CacheResult<()> {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                written_at: Utc::now(),
                data: value.clone(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = MemoryCache::new();
        assert!(cache
            .get("k", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());

        cache.put("k", &Value::from(42)).await.unwrap();
        let hit = cache.get("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(hit, Some(Value::from(42)));
    }

    #[tokio::test]
    async fn test_stale_entry_treated_as_absent() {
        let cache = MemoryCache::new();
        cache.put("k", &Value::from("v")).await.unwrap();
        cache.age_entry("k", Duration::from_secs(3600)).await;

        assert!(cache
            .get("k", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());
        // Entry is still present for a caller accepting an older write.
        assert!(cache
            .get("k", Duration::from_secs(7200))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_value() {
        let cache = MemoryCache::new();
        cache.put("k", &Value::from(1)).await.unwrap();
        cache.put("k", &Value::from(2)).await.unwrap();

        let hit = cache.get("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(hit, Some(Value::from(2)));
        assert_eq!(cache.len().await, 1);
    }
}
