//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// The cache is best-effort by contract, so callers mostly log these and
/// move on; the publisher treats only the write path as load-bearing.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Backend-specific failure (connection dropped, service overloaded).
    #[display("cache backend error: {_0}")]
    Backend(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}
