//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// A fetch failure is deliberately *not* here: individual fetches failing is
/// an expected condition that a run absorbs and reports, not an error that
/// aborts it.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The durable store refused a read or write.
    #[display("durable store operation failed")]
    Store,
    /// The volatile cache refused a publication write.
    #[display("cache publication failed for '{_0}'")]
    Publish(#[error(not(source))] String),
    /// Conversion of a document's text failed.
    #[display("conversion failed for '{_0}'")]
    Render(#[error(not(source))] String),
    /// A listing entry carried a content URL that does not parse.
    #[display("invalid content url for '{_0}'")]
    ContentUrl(#[error(not(source))] String),
    /// A background publish task panicked or was cancelled.
    #[display("background publish task failed")]
    PublishTask,
    /// Configuration could not be turned into a runnable pipeline.
    #[display("invalid pipeline configuration")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            // The store and cache are shared services that come back.
            Self::Store | Self::Publish(_) | Self::PublishTask => true,
            Self::Render(_) | Self::ContentUrl(_) | Self::Config => false,
        }
    }
}
