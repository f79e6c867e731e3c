//! Double-buffered cache publication.
//!
//! The volatile cache offers per-key atomicity and nothing else, so reader
//! consistency comes entirely from write order. Each document owns two
//! generations of part keys (`name:0:part` and `name:1:part`); a publish
//! writes the inactive generation's parts first, then flips the head stored
//! under the bare document name to point at them. Readers that loaded the
//! old head keep resolving the old generation's keys, which stay in place
//! until after the flip is durably recorded.
//!
//! Publish order:
//! 1. the full rendering goes to the durable store,
//! 2. part keys of the inactive generation are written,
//! 3. the head is flipped in a single key write,
//! 4. the document record (now naming the new generation) is committed,
//! 5. the retired generation's part keys are deleted, best effort.
//!
//! A crash between any two steps leaves readers on a complete generation,
//! and the durable store always holds the newest rendering.

use crate::error::{ErrorKind, Result};
use crate::shard::shard;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use time::UtcDateTime;
use tracing::{debug, instrument, warn};
use vellum_cache::CacheHandle;
use vellum_store::Repository;
use vellum_store::models::{DocumentRecord, Encoding, RawDocument, RenderedHead, RenderedPart};

/// Cache image of a rendered document's head, stored under the bare
/// document name. The flip of this single key is what publishes a new
/// rendering to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedHead {
    /// Which generation of part keys completes this rendering.
    pub generation: u8,
    pub encoding: Encoding,
    /// Entity tag readers serve for the complete rendered output.
    pub etag: String,
    pub total_parts: u32,
    pub data0: Vec<u8>,
    /// Freshness deadline as a unix timestamp, if the run set one.
    pub expires_at: Option<i64>,
}

/// Cache key for one overflow part of one generation of a document.
pub(crate) fn part_key(name: &str, generation: u8, part: u32) -> String {
    format!("{name}:{generation}:{part}")
}

/// Writes renderings to the durable store and the volatile cache in the
/// publish order described at module level.
#[derive(Clone)]
pub struct Publisher {
    repo: Repository,
    cache: CacheHandle,
}

impl Publisher {
    pub fn new(repo: Repository, cache: CacheHandle) -> Self {
        Self { repo, cache }
    }

    /// Publish one rendering, flipping the document to its other cache
    /// generation. Returns the committed record.
    ///
    /// `raw` carries the freshly fetched content to commit alongside the
    /// record; re-renders of already-stored content pass `None`.
    #[instrument(skip_all, fields(name = %record.name, backend = self.cache.name()))]
    pub async fn publish(
        &self,
        mut record: DocumentRecord,
        rendered: Vec<u8>,
        encoding: Encoding,
        expires_at: Option<UtcDateTime>,
        raw: Option<RawDocument>,
    ) -> Result<DocumentRecord> {
        let name = record.name.clone();
        let etag = blake3::hash(&rendered).to_hex().to_string();
        let (data0, overflow) = shard(&rendered);
        let total_parts = 1 + overflow.len() as u32;

        // The outgoing head tells us how many part keys the retired
        // generation holds, for the cleanup in step 5.
        let previous =
            self.repo.get_rendered_head(&name).await.or_raise(|| ErrorKind::Store)?;

        let head = RenderedHead {
            name: name.clone(),
            encoding,
            etag: etag.clone(),
            total_parts,
            data0,
            expires_at,
        };
        let parts: Vec<RenderedPart> = overflow
            .into_iter()
            .zip(1u32..)
            .map(|(data, part)| RenderedPart { name: name.clone(), part, data })
            .collect();

        // Step 1: durable first. Everything after this point can be redone
        // from the store if the process dies.
        self.repo.put_rendered(&head, &parts).await.or_raise(|| ErrorKind::Store)?;

        // Step 2: fill the inactive generation.
        let next = 1 - record.generation;
        let entries: Vec<(String, Vec<u8>)> = parts
            .iter()
            .map(|part| (part_key(&name, next, part.part), part.data.clone()))
            .collect();
        self.cache.set_many(&entries).await.or_raise(|| ErrorKind::Publish(name.clone()))?;

        // Step 3: flip the head.
        let image = CachedHead {
            generation: next,
            encoding,
            etag,
            total_parts,
            data0: head.data0,
            expires_at: expires_at.map(|at| at.unix_timestamp()),
        };
        let body = serde_json::to_vec(&image).or_raise(|| ErrorKind::Publish(name.clone()))?;
        self.cache.set(&name, &body).await.or_raise(|| ErrorKind::Publish(name.clone()))?;

        // Step 4: record the flip.
        record.generation = next;
        record.reprocess = false;
        self.repo.commit_document(&record, raw.as_ref()).await.or_raise(|| ErrorKind::Store)?;

        // Step 5: retire the old generation. Failure here only leaves
        // unreferenced keys behind, which expire on their own.
        if let Some(previous) = previous {
            let stale: Vec<String> =
                (1..previous.total_parts).map(|part| part_key(&name, 1 - next, part)).collect();
            if !stale.is_empty()
                && let Err(error) = self.cache.delete_many(&stale).await
            {
                warn!(%name, ?error, "failed to evict retired cache parts");
            }
        }

        debug!(generation = next, total_parts, "published");
        Ok(record)
    }
}

/// Reassemble a document's published bytes from the cache alone, the way a
/// serving frontend would: head under the bare name, then the overflow
/// parts of the generation the head names.
///
/// `Ok(None)` means the cache can't serve the document (head or a part
/// evicted); the caller falls back to the durable store.
pub async fn read_published(cache: &CacheHandle, name: &str) -> Result<Option<(CachedHead, Vec<u8>)>> {
    let Some(body) = cache.get(name).await.or_raise(|| ErrorKind::Publish(name.to_string()))? else {
        return Ok(None);
    };
    let head: CachedHead =
        serde_json::from_slice(&body).or_raise(|| ErrorKind::Publish(name.to_string()))?;
    let mut bytes = head.data0.clone();
    for part in 1..head.total_parts {
        let key = part_key(name, head.generation, part);
        let Some(chunk) =
            cache.get(&key).await.or_raise(|| ErrorKind::Publish(name.to_string()))?
        else {
            return Ok(None);
        };
        bytes.extend_from_slice(&chunk);
    }
    Ok(Some((head, bytes)))
}
