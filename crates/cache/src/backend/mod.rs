//! Cache backend trait and implementations.
//!
//! This module defines the `CacheBackend` trait, a unified interface over
//! whatever volatile key-value service sits in front of the durable store.

mod memory;

pub use self::memory::MemoryCache;
use crate::error::Result;
use async_trait::async_trait;

/// Unified interface for volatile cache backends.
///
/// The contract is deliberately weak, matching what cheap cache services
/// actually guarantee:
/// - single-key writes are atomic; nothing else is,
/// - a delete may be skipped under load (entries expire on their own),
/// - a miss is `Ok(None)`, never an error.
///
/// Anything stronger — like readers never seeing a head that points at
/// missing parts — has to come from the *order* callers write keys in, not
/// from this trait.
///
/// # Examples
///
/// ```
/// use vellum_cache::{CacheBackend, MemoryCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = MemoryCache::default();
/// cache.set("manual.txt:0:1", b"part one").await?;
/// assert_eq!(cache.get("manual.txt:0:1").await?.as_deref(), Some(&b"part one"[..]));
/// assert!(cache.get("manual.txt:0:2").await?.is_none());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Look up a single key. A miss is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a single key. This is the only atomic operation the cache
    /// guarantees.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Write several keys.
    ///
    /// No atomicity across keys: a reader may observe any subset while this
    /// is in flight, and an error may leave some keys written. The default
    /// implementation is a plain loop over [`set`](Self::set).
    async fn set_many(&self, entries: &[(String, Vec<u8>)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Best-effort delete. Keys that don't exist are not an error, and
    /// implementations are allowed to skip work under load.
    async fn delete_many(&self, keys: &[String]) -> Result<()>;
}
