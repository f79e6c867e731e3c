//! Converter boundary.
//!
//! The actual text-to-HTML conversion algorithm is not vellum's concern;
//! the sync pipeline consumes it as a black box behind [`Converter`]. The
//! shape mirrors how conversion is actually used during a run: the session
//! is built once from the cross-reference index document, optionally
//! augmented once with the glossary document's extra references, then asked
//! to render each changed document.

mod basic;
pub mod error;

pub use crate::basic::BasicConverter;
use crate::error::Result;
use std::sync::Arc;

/// Factory for per-run conversion sessions.
pub trait Converter: Send + Sync {
    /// Build a session from the cross-reference index document's decoded
    /// text and the upstream version label (stamped into rendered output).
    fn session(&self, index_text: &str, version_label: Option<&str>) -> Result<Box<dyn RenderSession>>;
}

/// One run's conversion state.
///
/// Holds the cross-reference index resolved from the index document so
/// internal links in every subsequently rendered document can be resolved.
pub trait RenderSession: Send {
    /// Merge additional cross-reference entries contributed by a secondary
    /// reference document (called at most once per run, before that
    /// document itself is rendered).
    fn add_references(&mut self, name: &str, text: &str) -> Result<()>;

    /// Render one document's decoded text to HTML bytes.
    fn render(&mut self, name: &str, text: &str) -> Result<Vec<u8>>;
}

pub type ConverterHandle = Arc<dyn Converter + Send + Sync>;
