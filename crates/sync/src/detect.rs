//! Change detection: two conditional probes and candidate assembly.
//!
//! A run starts by asking upstream two questions. The directory-listing
//! probe answers "did the set of tracked documents or their contents
//! change" with per-entry digests; the version probe answers "did the
//! upstream version label move" from a commit-style message. Both are
//! conditional on validators held in the global checkpoint, so the steady
//! state costs two 304s.
//!
//! Probe failures are absorbed: the stored validator stays put and the
//! next run asks again. They do count as fetch failures, which keeps the
//! checkpoint from committing on a half-seen upstream state.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use url::Url;
use vellum_config::Upstream;
use vellum_fetch::{FetchResponse, ListingEntry, SourceHandle, extract_version_label, parse_listing};
use vellum_store::models::{Checkpoint, DocumentRecord};

/// Outcome of the directory-listing probe.
#[derive(Debug, Default)]
pub struct ListingProbe {
    /// `true` when upstream served a fresh listing body.
    pub changed: bool,
    /// File entries of a changed listing; empty otherwise.
    pub entries: Vec<ListingEntry>,
    /// The probe itself errored; the run must not commit its checkpoint.
    pub failed: bool,
}

/// Outcome of the version probe.
#[derive(Debug, Default)]
pub struct VersionProbe {
    /// A label different from the stored one, when the version moved.
    pub new_label: Option<String>,
    pub failed: bool,
}

/// One document the run will resolve concurrently.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: DocumentRecord,
    pub url: Url,
    /// Digest from the listing entry. `None` for the glossary, whose
    /// freshness is validator-driven because the listing never lists it.
    pub listing_digest: Option<String>,
}

/// How the cross-reference index will be resolved, should a conversion
/// session be needed this run.
#[derive(Debug, Clone)]
pub enum IndexPlan {
    /// The listing shows new index content at this URL.
    Refetch { record: DocumentRecord, url: Url, digest: String },
    /// Index unchanged; load the stored raw bytes on demand.
    Stored,
    /// Index resolution already failed this run. Nothing may render: the
    /// stored index is known stale, and anything published against it
    /// would never be re-rendered once the index becomes reachable.
    Failed,
}

/// Everything a run decided to look at.
#[derive(Debug)]
pub struct SyncPlan {
    pub candidates: Vec<Candidate>,
    pub index: IndexPlan,
}

/// Issues the probes and turns their answers into a [`SyncPlan`].
pub struct Detector {
    source: SourceHandle,
    upstream: Upstream,
}

impl Detector {
    pub fn new(source: SourceHandle, upstream: Upstream) -> Self {
        Self { source, upstream }
    }

    /// Conditionally fetch the directory listing, updating `draft`'s
    /// validator when a fresh body is accepted. `force` drops the stored
    /// validator so upstream must answer with a body.
    #[instrument(skip_all, fields(url = %self.upstream.listing_url))]
    pub async fn probe_listing(&self, draft: &mut Checkpoint, force: bool) -> ListingProbe {
        let etag = if force { None } else { draft.listing_etag.as_deref() };
        match self.source.fetch(&self.upstream.listing_url, etag).await {
            Ok(FetchResponse::NotModified) => {
                debug!("listing unchanged");
                ListingProbe::default()
            },
            Ok(FetchResponse::Ok { bytes, etag }) => match parse_listing(&bytes) {
                Ok(entries) => {
                    draft.listing_etag = etag;
                    info!(entries = entries.len(), "listing changed");
                    ListingProbe { changed: true, entries, failed: false }
                },
                Err(error) => {
                    warn!(?error, "unusable listing body; keeping previous validator");
                    ListingProbe { failed: true, ..ListingProbe::default() }
                },
            },
            Err(error) => {
                warn!(?error, "listing probe failed; will ask again next run");
                ListingProbe { failed: true, ..ListingProbe::default() }
            },
        }
    }

    /// Conditionally fetch the version source and look for a patch label.
    /// Every accepted body advances `draft`'s validator; the label moves
    /// only when a different one is found.
    #[instrument(skip_all, fields(url = %self.upstream.version_url))]
    pub async fn probe_version(&self, draft: &mut Checkpoint) -> VersionProbe {
        match self.source.fetch(&self.upstream.version_url, draft.version_etag.as_deref()).await {
            Ok(FetchResponse::NotModified) => {
                debug!("version source unchanged");
                VersionProbe::default()
            },
            Ok(FetchResponse::Ok { bytes, etag }) => {
                // Any accepted body advances the validator, label or no
                // label; the next run gets a 304 instead of the same bytes.
                draft.version_etag = etag;
                let message = String::from_utf8_lossy(&bytes);
                match extract_version_label(&message) {
                    Some(label) if draft.version_label.as_deref() != Some(label.as_str()) => {
                        info!(%label, "new upstream version");
                        draft.version_label = Some(label.clone());
                        VersionProbe { new_label: Some(label), failed: false }
                    },
                    Some(label) => {
                        debug!(%label, "version source changed, label did not");
                        VersionProbe::default()
                    },
                    None => {
                        warn!("version source carries no recognizable label");
                        VersionProbe::default()
                    },
                }
            },
            Err(error) => {
                warn!(?error, "version probe failed; will ask again next run");
                VersionProbe { new_label: None, failed: true }
            },
        }
    }

    /// Combine a listing probe's entries with the stored records into the
    /// set of documents this run resolves.
    ///
    /// The glossary is always a candidate, listing or no listing. The
    /// cross-reference index never is: it is resolved lazily, on the first
    /// render that needs a session (or at the end of the run if its
    /// content changed but nothing needed rendering).
    pub fn plan(
        &self,
        listing: &ListingProbe,
        stored: Vec<DocumentRecord>,
        tracked: &Regex,
    ) -> Result<SyncPlan> {
        let mut records: HashMap<String, DocumentRecord> =
            stored.into_iter().map(|record| (record.name.clone(), record)).collect();
        let mut plan = SyncPlan { candidates: Vec::new(), index: IndexPlan::Stored };

        let glossary = records
            .remove(&self.upstream.glossary_name)
            .unwrap_or_else(|| DocumentRecord::new(self.upstream.glossary_name.clone()));
        plan.candidates.push(Candidate {
            record: glossary,
            url: self.upstream.glossary_url.clone(),
            listing_digest: None,
        });

        if !listing.changed {
            return Ok(plan);
        }

        for entry in &listing.entries {
            if entry.name == self.upstream.glossary_name {
                // Already a candidate through its fixed URL.
                continue;
            }
            let is_index = entry.name == self.upstream.index_name;
            if !is_index && !tracked.is_match(&entry.name) {
                debug!(name = %entry.name, "listing entry not tracked");
                continue;
            }
            let url = Url::parse(&entry.content_url)
                .or_raise(|| ErrorKind::ContentUrl(entry.name.clone()))?;
            let record = records
                .remove(&entry.name)
                .unwrap_or_else(|| DocumentRecord::new(entry.name.clone()));
            if is_index {
                if record.reprocess || record.digest.as_deref() != Some(entry.digest.as_str()) {
                    plan.index =
                        IndexPlan::Refetch { record, url, digest: entry.digest.clone() };
                }
                continue;
            }
            plan.candidates.push(Candidate {
                record,
                url,
                listing_digest: Some(entry.digest.clone()),
            });
        }

        // Stored records the new listing no longer names. Left untouched:
        // their renderings keep serving until the document reappears or an
        // operator wipes the store.
        for name in records.into_keys() {
            warn!(%name, "tracked document no longer listed upstream");
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vellum_config::Config;
    use vellum_fetch::{MockReply, MockSource};

    fn upstream() -> Upstream {
        let mut config = Config::default();
        config.upstream.listing_url = Url::parse("https://up.example/listing").unwrap();
        config.upstream.version_url = Url::parse("https://up.example/version").unwrap();
        config.upstream.glossary_url = Url::parse("https://up.example/extra/glossary.txt").unwrap();
        config.upstream
    }

    fn detector(source: MockSource) -> Detector {
        Detector::new(Arc::new(source), upstream())
    }

    fn tracked() -> Regex {
        Regex::new(r"^[-\w]+\.txt$").unwrap()
    }

    fn entry(name: &str, digest: &str) -> ListingEntry {
        let body = format!(
            r#"[{{"name": "{name}", "type": "file", "digest": "{digest}",
                "contentUrl": "https://up.example/raw/{name}"}}]"#
        );
        parse_listing(body.as_bytes()).unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_listing_probe_updates_draft_validator() {
        let body = br#"[{"name": "a.txt", "type": "file", "digest": "d", "contentUrl": "u"}]"#;
        let detector = detector(MockSource::default().with_body(
            "https://up.example/listing",
            body.to_vec(),
            "\"l2\"",
        ));
        let mut draft = Checkpoint { listing_etag: Some("\"l1\"".to_string()), ..Checkpoint::default() };
        let probe = detector.probe_listing(&mut draft, false).await;
        assert!(probe.changed && !probe.failed);
        assert_eq!(probe.entries.len(), 1);
        assert_eq!(draft.listing_etag.as_deref(), Some("\"l2\""));
    }

    #[tokio::test]
    async fn test_listing_probe_failure_keeps_validator() {
        let detector = detector(
            MockSource::default().with("https://up.example/listing", MockReply::Unreachable),
        );
        let mut draft = Checkpoint { listing_etag: Some("\"l1\"".to_string()), ..Checkpoint::default() };
        let probe = detector.probe_listing(&mut draft, false).await;
        assert!(!probe.changed && probe.failed);
        assert_eq!(draft.listing_etag.as_deref(), Some("\"l1\""));
    }

    #[tokio::test]
    async fn test_version_probe_ignores_repeated_label() {
        let detector = detector(MockSource::default().with_body(
            "https://up.example/version",
            *b"Patch 9.1.0500",
            "\"v2\"",
        ));
        let mut draft = Checkpoint {
            version_etag: Some("\"v1\"".to_string()),
            version_label: Some("9.1.0500".to_string()),
            ..Checkpoint::default()
        };
        let probe = detector.probe_version(&mut draft).await;
        assert!(probe.new_label.is_none());
        // The validator still advances, so the next run gets a 304 instead
        // of re-downloading the same message.
        assert_eq!(draft.version_etag.as_deref(), Some("\"v2\""));
        assert_eq!(draft.version_label.as_deref(), Some("9.1.0500"));
    }

    #[tokio::test]
    async fn test_version_probe_advances_validator_without_label() {
        let detector = detector(MockSource::default().with_body(
            "https://up.example/version",
            *b"merge queue noise",
            "\"v3\"",
        ));
        let mut draft = Checkpoint::default();
        let probe = detector.probe_version(&mut draft).await;
        assert!(probe.new_label.is_none() && !probe.failed);
        assert_eq!(draft.version_etag.as_deref(), Some("\"v3\""));
        assert!(draft.version_label.is_none());
    }

    #[tokio::test]
    async fn test_version_probe_picks_up_new_label() {
        let detector = detector(MockSource::default().with_body(
            "https://up.example/version",
            *b"patch 9.1.0600: runtime docs",
            "\"v2\"",
        ));
        let mut draft = Checkpoint {
            version_label: Some("9.1.0500".to_string()),
            ..Checkpoint::default()
        };
        let probe = detector.probe_version(&mut draft).await;
        assert_eq!(probe.new_label.as_deref(), Some("9.1.0600: runtime docs"));
        assert_eq!(draft.version_etag.as_deref(), Some("\"v2\""));
    }

    #[test]
    fn plan_always_includes_the_glossary() {
        let detector = detector(MockSource::default());
        let plan = detector.plan(&ListingProbe::default(), Vec::new(), &tracked()).unwrap();
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].record.name, "glossary.txt");
        assert!(plan.candidates[0].listing_digest.is_none());
        assert!(matches!(plan.index, IndexPlan::Stored));
    }

    #[test]
    fn plan_sets_the_index_aside() {
        let detector = detector(MockSource::default());
        let listing = ListingProbe {
            changed: true,
            entries: vec![entry("manual.txt", "d1"), entry("xref", "dx")],
            failed: false,
        };
        let plan = detector.plan(&listing, Vec::new(), &tracked()).unwrap();
        let names: Vec<&str> =
            plan.candidates.iter().map(|c| c.record.name.as_str()).collect();
        assert_eq!(names, vec!["glossary.txt", "manual.txt"]);
        assert!(matches!(plan.index, IndexPlan::Refetch { ref digest, .. } if digest == "dx"));
    }

    #[test]
    fn plan_keeps_index_stored_when_digest_matches() {
        let detector = detector(MockSource::default());
        let listing = ListingProbe {
            changed: true,
            entries: vec![entry("xref", "dx")],
            failed: false,
        };
        let mut record = DocumentRecord::new("xref");
        record.digest = Some("dx".to_string());
        let plan = detector.plan(&listing, vec![record], &tracked()).unwrap();
        assert!(matches!(plan.index, IndexPlan::Stored));
    }

    #[test]
    fn plan_drops_untracked_names() {
        let detector = detector(MockSource::default());
        let listing = ListingProbe {
            changed: true,
            entries: vec![entry("manual.txt", "d1"), entry("README.md", "d2")],
            failed: false,
        };
        let plan = detector.plan(&listing, Vec::new(), &tracked()).unwrap();
        assert!(!plan.candidates.iter().any(|c| c.record.name == "README.md"));
    }

    #[test]
    fn plan_reuses_stored_records() {
        let detector = detector(MockSource::default());
        let listing = ListingProbe {
            changed: true,
            entries: vec![entry("manual.txt", "d2")],
            failed: false,
        };
        let mut record = DocumentRecord::new("manual.txt");
        record.generation = 1;
        record.digest = Some("d1".to_string());
        let plan = detector.plan(&listing, vec![record.clone()], &tracked()).unwrap();
        let candidate =
            plan.candidates.iter().find(|c| c.record.name == "manual.txt").unwrap();
        assert_eq!(candidate.record, record);
        assert_eq!(candidate.listing_digest.as_deref(), Some("d2"));
    }
}
