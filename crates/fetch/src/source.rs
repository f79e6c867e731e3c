//! The `DocumentSource` trait and its HTTP implementation.
//!
//! Everything upstream is reached through conditional GET: the request
//! carries the validator from the last accepted response (`If-None-Match`),
//! and the answer is either "not modified" with no body, or a body plus a
//! fresh validator (`ETag`).

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Outcome of a conditional GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResponse {
    /// The stored validator still matches; no body was transferred.
    NotModified,
    /// Upstream served a (possibly changed) body and a new validator.
    Ok { bytes: Vec<u8>, etag: Option<String> },
}

/// Unified interface to the upstream content source.
///
/// A single method keeps this object-safe and trivially fakeable: the
/// listing endpoint, the version probe and plain document endpoints are all
/// just URLs with conditional-GET semantics.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Issue a conditional GET. `etag` is the stored validator from the
    /// last accepted response, if any; when present and still valid
    /// upstream, the response is [`FetchResponse::NotModified`].
    async fn fetch(&self, url: &Url, etag: Option<&str>) -> Result<FetchResponse>;
}

/// [`DocumentSource`] backed by a real HTTP client.
///
/// # Examples
///
/// ```no_run
/// use url::Url;
/// use vellum_fetch::{DocumentSource, FetchResponse, HttpSource};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = HttpSource::new()?;
/// let url = Url::parse("https://example.org/doc/manual.txt")?;
/// match source.fetch(&url, Some("\"v1\"")).await? {
///     FetchResponse::NotModified => println!("still fresh"),
///     FetchResponse::Ok { bytes, etag } => {
///         println!("{} bytes, new validator {:?}", bytes.len(), etag);
///     },
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Build a client with sane defaults for a time-budgeted batch job.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vellum/", env!("CARGO_PKG_VERSION")))
            // The whole run lives under an external compute budget; a
            // single hung fetch must not eat it.
            .timeout(Duration::from_secs(30))
            .build()
            .or_raise(|| ErrorKind::Transport("failed to build http client".to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    async fn fetch(&self, url: &Url, etag: Option<&str>) -> Result<FetchResponse> {
        let mut request = self.client.get(url.clone());
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = request.send().await.or_raise(|| ErrorKind::Transport(url.to_string()))?;
        debug!(%url, status = %response.status(), "conditional fetch");
        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(FetchResponse::NotModified),
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let bytes =
                    response.bytes().await.or_raise(|| ErrorKind::Transport(url.to_string()))?.to_vec();
                Ok(FetchResponse::Ok { bytes, etag })
            },
            status => exn::bail!(ErrorKind::Status(status.as_u16(), url.to_string())),
        }
    }
}

#[cfg(feature = "mock")]
mod mock {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Scripted reply for one URL in a [`MockSource`].
    #[derive(Debug, Clone)]
    pub enum MockReply {
        /// Serve this body with this validator; report `NotModified` when
        /// the request already carries a matching validator.
        Body { bytes: Vec<u8>, etag: Option<String> },
        /// Fail with this HTTP status.
        Status(u16),
        /// Fail at the transport level.
        Unreachable,
    }

    /// Scripted [`DocumentSource`] for tests.
    ///
    /// A request for an unscripted URL fails with status 404, which is the
    /// behaviour tests usually want when they forget a fixture. Requests
    /// are recorded so tests can assert which fetches actually happened.
    ///
    /// The panics here are DELIBERATE. MockSource is intended to be used
    /// in tests; panics are expected.
    #[derive(Default)]
    pub struct MockSource {
        replies: HashMap<String, MockReply>,
        requests: Mutex<Vec<String>>,
    }

    impl MockSource {
        /// Script a reply for a URL.
        pub fn with(mut self, url: &str, reply: MockReply) -> Self {
            self.replies.insert(url.to_string(), reply);
            self
        }

        /// Script a plain body with a validator for a URL.
        pub fn with_body(self, url: &str, bytes: impl Into<Vec<u8>>, etag: &str) -> Self {
            self.with(url, MockReply::Body { bytes: bytes.into(), etag: Some(etag.to_string()) })
        }

        /// URLs requested so far, in request order.
        pub async fn requested(&self) -> Vec<String> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl DocumentSource for MockSource {
        async fn fetch(&self, url: &Url, etag: Option<&str>) -> Result<FetchResponse> {
            self.requests.lock().await.push(url.to_string());
            match self.replies.get(url.as_str()) {
                Some(MockReply::Body { bytes, etag: current }) => {
                    if etag.is_some() && etag == current.as_deref() {
                        return Ok(FetchResponse::NotModified);
                    }
                    Ok(FetchResponse::Ok { bytes: bytes.clone(), etag: current.clone() })
                },
                Some(MockReply::Status(code)) => exn::bail!(ErrorKind::Status(*code, url.to_string())),
                Some(MockReply::Unreachable) => {
                    exn::bail!(ErrorKind::Transport(format!("unreachable: {url}")))
                },
                None => exn::bail!(ErrorKind::Status(404, url.to_string())),
            }
        }
    }
}

#[cfg(feature = "mock")]
pub use self::mock::{MockReply, MockSource};

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_not_modified_on_matching_etag() {
        let source = MockSource::default().with_body("https://up.example/doc.txt", *b"body", "\"v1\"");
        let url = Url::parse("https://up.example/doc.txt").unwrap();
        assert_eq!(source.fetch(&url, Some("\"v1\"")).await.unwrap(), FetchResponse::NotModified);
        let response = source.fetch(&url, Some("\"v0\"")).await.unwrap();
        assert!(matches!(response, FetchResponse::Ok { .. }));
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let source = MockSource::default().with("https://up.example/a", MockReply::Status(500));
        let url = Url::parse("https://up.example/a").unwrap();
        let err = source.fetch(&url, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Status(500, _)));
        assert!((*err).is_retryable());
        assert_eq!(source.requested().await, vec!["https://up.example/a".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_unscripted_url_is_not_found() {
        let source = MockSource::default();
        let url = Url::parse("https://up.example/missing").unwrap();
        let err = source.fetch(&url, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Status(404, _)));
        assert!(!(*err).is_retryable());
    }
}
