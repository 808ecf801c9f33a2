//! Version & Cache (4.J) — on-disk result cache.
//!
//! Completed task outputs are persisted keyed by [`CacheKey`], so a
//! process task whose action's content hash hasn't changed since the last
//! run can be skipped entirely. Publication follows the same
//! write-tmp-then-rename idiom as [`crate::plugin::ToolCache`] so a reader
//! never observes a partially written entry.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::GardenError;
use crate::types::CacheKey;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub outputs: serde_json::Value,
    pub completed_at_unix: u64,
}

/// Per-user result cache. Entries expire lazily: a stale entry is only
/// ever evicted the next time something looks it up, not on a background
/// timer.
pub struct ResultCache {
    root: PathBuf,
    ttl: Duration,
    locks: DashMap<String, std::sync::Arc<Mutex<()>>>,
}

impl ResultCache {
    pub fn new(root: PathBuf, ttl: Duration) -> Self {
        ResultCache { root, ttl, locks: DashMap::new() }
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.kind.to_string()).join(key.name.as_str()).join(format!("{}-{}.json", key.version.as_str(), key.mode))
    }

    fn lock_for(&self, key: &CacheKey) -> std::sync::Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_insert_with(|| std::sync::Arc::new(Mutex::new(()))).clone()
    }

    /// Returns the cached entry, or `None` on a miss or an expired entry
    /// (which is deleted as a side effect).
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, GardenError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path)?;
        let entry: CacheEntry = serde_json::from_slice(&raw).unwrap_or(CacheEntry { outputs: serde_json::Value::Null, completed_at_unix: 0 });
        if self.is_expired(&entry) {
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    pub async fn put(&self, key: &CacheKey, outputs: serde_json::Value) -> Result<(), GardenError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entry = CacheEntry { outputs, completed_at_unix: now_unix() };
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&entry).unwrap_or_default())?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), GardenError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        now_unix().saturating_sub(entry.completed_at_unix) > self.ttl.as_secs()
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
