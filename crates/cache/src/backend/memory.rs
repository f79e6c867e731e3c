//! In-memory cache backend.

use super::CacheBackend;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory cache backend.
///
/// Entries live in a `HashMap` behind a [`RwLock`], so all trait methods
/// operate on `&self` without external synchronisation. This is both the
/// single-process production backend and the test double — the semantics
/// (volatile, per-key atomicity, nothing more) are the same either way.
///
/// # Examples
///
/// ```
/// use vellum_cache::{CacheBackend, MemoryCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = MemoryCache::with_entries([("manual.txt", b"head".to_vec())]);
/// assert!(cache.get("manual.txt").await?.is_some());
/// cache.delete_many(&["manual.txt".to_string()]).await?;
/// assert!(cache.get("manual.txt").await?.is_none());
/// # Ok(())
/// # }
/// ```
pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    /// Create a cache pre-populated with entries (handy in tests).
    pub fn with_entries(entries: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let map = entries.into_iter().map(|(key, value)| (key.into(), value.into())).collect();
        Self { name: "memory".to_string(), entries: RwLock::new(map) }
    }

    /// Change the name of the cache backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every key currently present, unordered. Test-inspection helper, not
    /// part of [`CacheBackend`] — real cache services can't enumerate keys.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        let entries: [(&str, Vec<u8>); 0] = [];
        Self::with_entries(entries)
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        let mut guard = self.entries.write().await;
        for key in keys {
            // Absent keys are fine; delete is best-effort by contract.
            guard.remove(key);
        }
        Ok(())
    }
}
