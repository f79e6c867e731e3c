//! Conditional fetch layer.
//!
//! Everything vellum knows about the upstream it learns through three
//! probes, all with conditional-GET semantics: a directory listing (JSON
//! entries with per-file digests), a version source (commit-style message
//! carrying a patch label), and plain document endpoints (raw bytes).
//!
//! The [`DocumentSource`] trait is the seam: production uses
//! [`HttpSource`], tests script a `MockSource` (behind the `mock` feature).

pub mod error;
mod listing;
mod source;
mod version;

pub use crate::listing::{EntryKind, ListingEntry, parse_listing};
#[cfg(feature = "mock")]
pub use crate::source::{MockReply, MockSource};
pub use crate::source::{DocumentSource, FetchResponse, HttpSource};
pub use crate::version::extract_version_label;
use std::sync::Arc;

pub type SourceHandle = Arc<dyn DocumentSource + Send + Sync>;
