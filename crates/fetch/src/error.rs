//! Fetch Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Upstream answered with a status that is neither OK nor Not Modified.
    #[display("unexpected upstream status {_0} for {_1}")]
    Status(#[error(not(source))] u16, String),
    /// Connection-level failure (DNS, TLS, timeout, reset).
    #[display("transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// Directory listing body was not in the expected shape.
    #[display("malformed directory listing")]
    MalformedListing,
    /// A URL could not be built from configured bases.
    #[display("invalid url: {_0}")]
    InvalidUrl(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            // 5xx is worth a retry on the next scheduled run; 4xx isn't.
            Self::Status(code, _) => *code >= 500,
            Self::MalformedListing | Self::InvalidUrl(_) => false,
        }
    }
}
