//! Directory-listing probe payload.
//!
//! The listing endpoint returns a JSON array of entries describing the
//! upstream document directory. Each file entry carries a content digest,
//! which is what lets the orchestrator skip fetches without a network round
//! trip when the digest already matches the stored one.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Deserialize;

/// One entry from the upstream directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Opaque content digest for this entry at its current state.
    pub digest: String,
    /// Absolute URL the entry's raw bytes can be fetched from.
    pub content_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    /// Subdirectories show up in listings but are never tracked.
    #[serde(other)]
    Other,
}

/// Parse a listing response body into its file entries.
///
/// Non-file entries are dropped here; name-pattern filtering is the change
/// detector's job, since the tracked pattern is configuration.
pub fn parse_listing(bytes: &[u8]) -> Result<Vec<ListingEntry>> {
    let entries: Vec<ListingEntry> =
        serde_json::from_slice(bytes).or_raise(|| ErrorKind::MalformedListing)?;
    Ok(entries.into_iter().filter(|entry| entry.kind == EntryKind::File).collect())
}
