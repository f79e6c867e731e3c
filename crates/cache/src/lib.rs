//! Volatile cache tier.
//!
//! The fast half of vellum's two-tier publication system: a plain key-value
//! store with best-effort eviction and no multi-key atomicity. The
//! publication protocol in `vellum-sync` is what turns this weak primitive
//! into atomic-looking document visibility (generation-scoped part keys
//! written before the generation-independent head key).

pub mod backend;
pub mod error;

pub use crate::backend::{CacheBackend, MemoryCache};
use std::sync::Arc;

pub type CacheHandle = Arc<dyn CacheBackend + Send + Sync>;
