//! JSON-file-backed cache.
//!
//! One file per key under the cache directory, payload
//! `{"timestamp": <unix seconds>, "data": <value>}`. Keys are sanitized to
//! filesystem-safe names before use.

use crate::{CacheResult, IngestionCache};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct Payload {
    timestamp: i64,
    data: Value,
}

/// On-disk TTL cache rooted at a configurable directory.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Open a cache rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl IngestionCache for DiskCache {
    async fn get(&self, key: &str, max_age: Duration) -> CacheResult<Option<Value>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let payload: Payload = serde_json::from_slice(&raw)?;
        let age = Utc::now().timestamp() - payload.timestamp;
        if age > max_age.as_secs() as i64 {
            debug!(key, age, "cache entry expired");
            return Ok(None);
        }
        Ok(Some(payload.data))
    }

    async fn put(&self, key: &str, value: &Value) -> CacheResult<()> {
        let payload = Payload {
            timestamp: Utc::now().timestamp(),
            data: value.clone(),
        };
        let path = self.path_for(key);
        tokio::fs::write(&path, serde_json::to_vec(&payload)?).await?;
        debug!(key, path = %path.display(), "cache entry written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();

        cache
            .put("firms_VIIRS_1_-121.8_39.6", &Value::from(vec![1, 2, 3]))
            .await
            .unwrap();
        let hit = cache
            .get("firms_VIIRS_1_-121.8_39.6", Duration::from_secs(900))
            .await
            .unwrap();
        assert_eq!(hit, Some(Value::from(vec![1, 2, 3])));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();

        let miss = cache.get("nope", Duration::from_secs(60)).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_stale_payload_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();

        // Write a payload stamped an hour in the past.
        let stale = serde_json::json!({
            "timestamp": Utc::now().timestamp() - 3600,
            "data": {"count": 5},
        });
        std::fs::write(
            cache.path_for("old_key"),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        assert!(cache
            .get("old_key", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());
        assert!(cache
            .get("old_key", Duration::from_secs(7200))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_keys_sanitized_to_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();

        cache
            .put("osm_-121.8,39.6,-121.4,39.9", &Value::from("assets"))
            .await
            .unwrap();
        let hit = cache
            .get("osm_-121.8,39.6,-121.4,39.9", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(hit, Some(Value::from("assets")));

        // The comma-bearing key must not have produced a comma-bearing file.
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(!name.to_string_lossy().contains(','));
        }
    }
}
