//! Typed records for the durable store.
//!
//! Model types are what the rest of the workspace sees; the private `*Row`
//! types mirror the SQLite schema and convert via `TryFrom` so that a bad
//! row surfaces as [`ErrorKind::InvalidData`] instead of a panic.

use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use time::UtcDateTime;

/// Text encoding of an upstream document.
///
/// Detection is deliberately two-valued: a strict UTF-8 decode attempt, and
/// a byte-preserving Latin-1 fallback for everything else. Ambiguity is
/// never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Encoding {
    /// Detect the encoding of raw document bytes.
    pub fn detect(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(_) => Self::Utf8,
            Err(_) => Self::Latin1,
        }
    }

    /// Decode raw bytes under this encoding.
    ///
    /// Latin-1 maps every byte to the code point of the same value, so the
    /// fallback path can never fail (which is the point of having it).
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            // Raw bytes are only labelled Utf8 by detect(), so a lossy
            // decode here never actually replaces anything.
            Self::Utf8 => String::from_utf8_lossy(bytes),
            Self::Latin1 => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Canonical name, as stored in the database and reported to readers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "ISO-8859-1",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = ErrorKind;
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "UTF-8" => Ok(Self::Utf8),
            "ISO-8859-1" => Ok(Self::Latin1),
            _ => Err(ErrorKind::InvalidData("encoding")),
        }
    }
}

/// Per-document sync bookkeeping, keyed by document name.
///
/// Created on first sighting of a name, mutated at the end of a successful
/// process-and-publish step, and deleted only by [`Repository::wipe`](crate::Repository::wipe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub name: String,
    /// Opaque conditional-fetch validator (entity tag), if the source gave one.
    pub etag: Option<String>,
    /// Content digest from the directory listing, for digest-diffed sources.
    pub digest: Option<String>,
    /// Operator-requested full reprocess; cleared once honored.
    pub reprocess: bool,
    /// Which volatile-cache slot (0 or 1) currently holds this document.
    pub generation: u8,
}

impl DocumentRecord {
    /// A fresh record for a document seen for the first time.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            etag: None,
            digest: None,
            reprocess: false,
            generation: 0,
        }
    }
}

/// The singleton global checkpoint: probe validators plus the upstream
/// version label. Only committed after a run with no fetch failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub listing_etag: Option<String>,
    pub version_etag: Option<String>,
    pub version_label: Option<String>,
}

/// Last successfully fetched raw bytes for a document, with its detected
/// encoding. Kept durably so that a version-only change can re-render
/// without re-fetching unchanged content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub name: String,
    pub encoding: Encoding,
    pub bytes: Vec<u8>,
}

/// Head record of a rendered document. Part 0 is inlined here; parts
/// `1..total_parts` are separate [`RenderedPart`] records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHead {
    pub name: String,
    pub encoding: Encoding,
    /// Digest of the complete rendered output, served to readers as an
    /// entity tag.
    pub etag: String,
    pub total_parts: u32,
    pub data0: Vec<u8>,
    /// Operator-supplied freshness deadline, if any.
    pub expires_at: Option<UtcDateTime>,
}

/// One overflow chunk of a rendered document, keyed by `(name, part)` with
/// `part >= 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPart {
    pub name: String,
    pub part: u32,
    pub data: Vec<u8>,
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
pub(crate) struct DocumentRow {
    name: String,
    etag: Option<String>,
    digest: Option<String>,
    reprocess: i64,
    generation: i64,
}

impl From<&DocumentRecord> for DocumentRow {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            name: record.name.clone(),
            etag: record.etag.clone(),
            digest: record.digest.clone(),
            reprocess: i64::from(record.reprocess),
            generation: i64::from(record.generation),
        }
    }
}

impl DocumentRow {
    /// Decompose into bind-ready values, in schema column order.
    pub(crate) fn into_bindings(self) -> (String, Option<String>, Option<String>, i64, i64) {
        (self.name, self.etag, self.digest, self.reprocess, self.generation)
    }
}

impl TryFrom<DocumentRow> for DocumentRecord {
    type Error = Error;
    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            name: row.name,
            etag: row.etag,
            digest: row.digest,
            reprocess: row.reprocess != 0,
            generation: match row.generation {
                0 => 0,
                1 => 1,
                _ => exn::bail!(ErrorKind::InvalidData("generation")),
            },
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CheckpointRow {
    listing_etag: Option<String>,
    version_etag: Option<String>,
    version_label: Option<String>,
}

impl From<CheckpointRow> for Checkpoint {
    fn from(row: CheckpointRow) -> Self {
        Self {
            listing_etag: row.listing_etag,
            version_etag: row.version_etag,
            version_label: row.version_label,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RawDocumentRow {
    name: String,
    encoding: String,
    bytes: Vec<u8>,
}

impl TryFrom<RawDocumentRow> for RawDocument {
    type Error = Error;
    fn try_from(row: RawDocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            name: row.name,
            encoding: row.encoding.parse::<Encoding>().or_raise(|| ErrorKind::InvalidData("encoding"))?,
            bytes: row.bytes,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RenderedHeadRow {
    name: String,
    encoding: String,
    etag: String,
    total_parts: i64,
    data0: Vec<u8>,
    expires_at: Option<i64>,
}

impl TryFrom<RenderedHeadRow> for RenderedHead {
    type Error = Error;
    fn try_from(row: RenderedHeadRow) -> Result<Self, Self::Error> {
        Ok(Self {
            name: row.name,
            encoding: row.encoding.parse::<Encoding>().or_raise(|| ErrorKind::InvalidData("encoding"))?,
            etag: row.etag,
            total_parts: u32::try_from(row.total_parts).or_raise(|| ErrorKind::InvalidData("total parts"))?,
            data0: row.data0,
            expires_at: row
                .expires_at
                .map(UtcDateTime::from_unix_timestamp)
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("expiry date"))?,
        })
    }
}

impl RenderedHead {
    pub(crate) fn expires_at_timestamp(&self) -> Option<i64> {
        self.expires_at.map(|at| at.unix_timestamp())
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RenderedPartRow {
    name: String,
    part: i64,
    data: Vec<u8>,
}

impl TryFrom<RenderedPartRow> for RenderedPart {
    type Error = Error;
    fn try_from(row: RenderedPartRow) -> Result<Self, Self::Error> {
        Ok(Self {
            name: row.name,
            part: u32::try_from(row.part).or_raise(|| ErrorKind::InvalidData("part index"))?,
            data: row.data,
        })
    }
}
