//! Concurrent candidate resolution.
//!
//! Every candidate is dispatched at once and yielded back in completion
//! order, so one slow upstream endpoint never serializes the rest of the
//! run. A candidate whose listing digest already matches the stored one
//! resolves without touching the network at all.

use crate::detect::Candidate;
use futures::Stream;
use futures::stream::FuturesUnordered;
use tracing::debug;
use vellum_fetch::{FetchResponse, SourceHandle};

/// How one candidate resolved.
#[derive(Debug)]
pub enum Resolution {
    /// Content is already current; nothing was transferred.
    Unchanged,
    /// New content arrived.
    Fetched { bytes: Vec<u8>, etag: Option<String> },
    /// The fetch failed; stored state for this document is untouched.
    Failed(vellum_fetch::error::Error),
}

/// One candidate paired with its resolution.
#[derive(Debug)]
pub struct Resolved {
    pub candidate: Candidate,
    pub resolution: Resolution,
}

/// Resolve all candidates concurrently, yielding in completion order.
pub fn gather(
    source: SourceHandle,
    candidates: Vec<Candidate>,
) -> impl Stream<Item = Resolved> + Unpin {
    candidates
        .into_iter()
        .map(|candidate| {
            let source = source.clone();
            async move { resolve(source, candidate).await }
        })
        .collect::<FuturesUnordered<_>>()
}

async fn resolve(source: SourceHandle, candidate: Candidate) -> Resolved {
    // Digest-diffed candidates skip the network when nothing moved, unless
    // an operator flagged the document for reprocessing.
    if !candidate.record.reprocess
        && candidate.listing_digest.is_some()
        && candidate.record.digest == candidate.listing_digest
    {
        debug!(name = %candidate.record.name, "digest unchanged, fetch skipped");
        return Resolved { candidate, resolution: Resolution::Unchanged };
    }

    // A conditional request only makes sense for validator-driven
    // candidates; a digest mismatch already proves the content moved.
    let etag = match (&candidate.listing_digest, candidate.record.reprocess) {
        (None, false) => candidate.record.etag.clone(),
        _ => None,
    };
    let resolution = match source.fetch(&candidate.url, etag.as_deref()).await {
        Ok(FetchResponse::NotModified) => Resolution::Unchanged,
        Ok(FetchResponse::Ok { bytes, etag }) => Resolution::Fetched { bytes, etag },
        Err(error) => Resolution::Failed(error),
    };
    Resolved { candidate, resolution }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;
    use url::Url;
    use vellum_fetch::{MockReply, MockSource};
    use vellum_store::models::DocumentRecord;

    fn candidate(name: &str, digest: Option<&str>) -> Candidate {
        Candidate {
            record: DocumentRecord::new(name),
            url: Url::parse(&format!("https://up.example/raw/{name}")).unwrap(),
            listing_digest: digest.map(str::to_string),
        }
    }

    async fn collect(source: Arc<MockSource>, candidates: Vec<Candidate>) -> Vec<Resolved> {
        gather(source, candidates).collect().await
    }

    #[tokio::test]
    async fn test_matching_digest_skips_the_network() {
        let source = Arc::new(MockSource::default());
        let mut candidate = candidate("a.txt", Some("d1"));
        candidate.record.digest = Some("d1".to_string());

        let resolved = collect(source.clone(), vec![candidate]).await;
        assert!(matches!(resolved[0].resolution, Resolution::Unchanged));
        assert!(source.requested().await.is_empty());
    }

    #[tokio::test]
    async fn test_reprocess_overrides_the_digest_match() {
        let source =
            Arc::new(MockSource::default().with_body("https://up.example/raw/a.txt", *b"body", "\"e\""));
        let mut candidate = candidate("a.txt", Some("d1"));
        candidate.record.digest = Some("d1".to_string());
        candidate.record.reprocess = true;

        let resolved = collect(source.clone(), vec![candidate]).await;
        assert!(matches!(resolved[0].resolution, Resolution::Fetched { .. }));
        assert_eq!(source.requested().await.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_digest_fetches_unconditionally() {
        let source =
            Arc::new(MockSource::default().with_body("https://up.example/raw/a.txt", *b"new", "\"e2\""));
        let mut candidate = candidate("a.txt", Some("d2"));
        candidate.record.digest = Some("d1".to_string());
        // A matching validator must not produce a 304 here; the digest
        // says the content moved.
        candidate.record.etag = Some("\"e2\"".to_string());

        let resolved = collect(source, vec![candidate]).await;
        match &resolved[0].resolution {
            Resolution::Fetched { bytes, etag } => {
                assert_eq!(bytes, b"new");
                assert_eq!(etag.as_deref(), Some("\"e2\""));
            },
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validator_driven_candidate_sends_its_etag() {
        let source =
            Arc::new(MockSource::default().with_body("https://up.example/raw/g.txt", *b"glossary", "\"g1\""));
        let mut candidate = candidate("g.txt", None);
        candidate.record.etag = Some("\"g1\"".to_string());

        let resolved = collect(source, vec![candidate]).await;
        assert!(matches!(resolved[0].resolution, Resolution::Unchanged));
    }

    #[tokio::test]
    async fn test_failures_are_yielded_not_raised() {
        let source = Arc::new(
            MockSource::default()
                .with("https://up.example/raw/bad.txt", MockReply::Unreachable)
                .with_body("https://up.example/raw/good.txt", *b"fine", "\"e\""),
        );
        let resolved = collect(
            source,
            vec![candidate("bad.txt", Some("d1")), candidate("good.txt", Some("d2"))],
        )
        .await;

        let by_name = |name: &str| {
            resolved.iter().find(|r| r.candidate.record.name == name).unwrap()
        };
        assert!(matches!(by_name("bad.txt").resolution, Resolution::Failed(_)));
        assert!(matches!(by_name("good.txt").resolution, Resolution::Fetched { .. }));
    }
}
