//! Run orchestration.
//!
//! One call to [`Runner::run`] is one sync pass: probe, plan, resolve
//! candidates concurrently, render what changed, publish each rendering in
//! the background, and commit the global checkpoint only if every fetch
//! succeeded. Runs are idempotent; a run that dies anywhere simply leaves
//! more work for the next one.
//!
//! The conversion session is built lazily. Most runs never render anything,
//! so the cross-reference index document is only loaded (or refetched, when
//! the listing says it moved) the first time a rendering needs it.

use crate::detect::{Candidate, Detector, IndexPlan};
use crate::error::{ErrorKind, Result};
use crate::gather::{Resolution, Resolved, gather};
use crate::publish::Publisher;
use exn::ResultExt;
use futures::StreamExt;
use time::UtcDateTime;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use vellum_cache::CacheHandle;
use vellum_config::Config;
use vellum_fetch::{FetchResponse, SourceHandle};
use vellum_render::{ConverterHandle, RenderSession};
use vellum_store::Repository;
use vellum_store::models::{DocumentRecord, Encoding, RawDocument};

/// Per-run knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Drop stored validators and reprocess every tracked document.
    pub force: bool,
    /// Freshness deadline stamped on every head published this run.
    pub expires_at: Option<UtcDateTime>,
}

/// What a completed run did, by document name (sorted).
#[derive(Debug, Default)]
pub struct RunReport {
    pub published: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<String>,
    pub checkpoint_committed: bool,
}

impl RunReport {
    fn touched(&self, name: &str) -> bool {
        self.published.iter().chain(&self.failed).any(|n| n == name)
    }
}

/// Mutable state of one run in flight.
struct RunState {
    session: Option<Box<dyn RenderSession>>,
    index: IndexPlan,
    new_version: bool,
    version_label: Option<String>,
    expires_at: Option<UtcDateTime>,
    publishes: JoinSet<Result<DocumentRecord>>,
    report: RunReport,
    fetch_failed: bool,
}

/// The sync pipeline, wired to its four seams: durable store, volatile
/// cache, upstream source and converter.
pub struct Runner {
    repo: Repository,
    publisher: Publisher,
    detector: Detector,
    source: SourceHandle,
    converter: ConverterHandle,
    config: Config,
}

impl Runner {
    pub fn new(
        repo: Repository,
        cache: CacheHandle,
        source: SourceHandle,
        converter: ConverterHandle,
        config: Config,
    ) -> Self {
        Self {
            publisher: Publisher::new(repo.clone(), cache),
            detector: Detector::new(source.clone(), config.upstream.clone()),
            repo,
            source,
            converter,
            config,
        }
    }

    /// Execute one sync pass.
    #[instrument(skip_all, fields(force = options.force))]
    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        if options.force {
            let flagged =
                self.repo.mark_all_for_reprocess().await.or_raise(|| ErrorKind::Store)?;
            info!(flagged, "operator-forced reprocess");
        }

        let checkpoint = self.repo.get_checkpoint().await.or_raise(|| ErrorKind::Store)?;
        let mut draft = checkpoint.clone();

        let listing = self.detector.probe_listing(&mut draft, options.force).await;
        let version = self.detector.probe_version(&mut draft).await;

        let stored = self.repo.list_documents().await.or_raise(|| ErrorKind::Store)?;
        let tracked = self.config.tracked_regex().or_raise(|| ErrorKind::Config)?;
        let plan = self.detector.plan(&listing, stored, &tracked)?;

        let mut state = RunState {
            session: None,
            index: plan.index,
            new_version: version.new_label.is_some(),
            version_label: draft.version_label.clone(),
            expires_at: options.expires_at,
            publishes: JoinSet::new(),
            report: RunReport::default(),
            fetch_failed: listing.failed || version.failed,
        };

        // Errors from the collection phase must not short-circuit past the
        // drain below, or in-flight publish tasks get aborted mid-write.
        let collected = self.collect(&mut state, plan.candidates).await;
        let mut first_error = collected.err();

        while let Some(joined) = state.publishes.join_next().await {
            match joined.or_raise(|| ErrorKind::PublishTask).and_then(|done| done) {
                Ok(record) => {
                    debug!(name = %record.name, generation = record.generation, "publish complete");
                },
                Err(error) => {
                    warn!(?error, "publish failed");
                    first_error.get_or_insert(error);
                },
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        if draft != checkpoint {
            if state.fetch_failed {
                info!("fetch failures this run; checkpoint withheld for retry");
            } else {
                self.repo.put_checkpoint(&draft).await.or_raise(|| ErrorKind::Store)?;
                state.report.checkpoint_committed = true;
            }
        }

        let mut report = state.report;
        report.published.sort();
        report.unchanged.sort();
        report.failed.sort();
        info!(
            published = report.published.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            committed = report.checkpoint_committed,
            "run complete"
        );
        Ok(report)
    }

    /// Resolve every candidate and queue the resulting publishes. Split out
    /// of [`Runner::run`] so the publish set is drained even on error.
    async fn collect(
        &self,
        state: &mut RunState,
        candidates: Vec<Candidate>,
    ) -> Result<()> {
        let mut resolved = gather(self.source.clone(), candidates);
        while let Some(Resolved { candidate, resolution }) = resolved.next().await {
            match resolution {
                Resolution::Failed(error) => {
                    warn!(name = %candidate.record.name, ?error, "fetch failed");
                    state.fetch_failed = true;
                    state.report.failed.push(candidate.record.name);
                },
                Resolution::Fetched { bytes, etag } => {
                    let encoding = Encoding::detect(&bytes);
                    let raw = RawDocument {
                        name: candidate.record.name.clone(),
                        encoding,
                        bytes,
                    };
                    let mut record = candidate.record;
                    record.etag = etag;
                    record.digest = candidate.listing_digest;
                    match self.render_document(state, &raw).await? {
                        Some(rendered) => {
                            let name = record.name.clone();
                            self.spawn_publish(state, record, rendered, encoding, Some(raw));
                            state.report.published.push(name);
                        },
                        None => state.report.failed.push(record.name),
                    }
                },
                Resolution::Unchanged => {
                    let name = candidate.record.name.clone();
                    let rerender = candidate.record.reprocess
                        || (state.new_version && name == self.config.upstream.primary_name);
                    if rerender {
                        self.rerender_stored(state, candidate.record).await?;
                    } else {
                        debug!(%name, "unchanged");
                        state.report.unchanged.push(name);
                    }
                },
            }
        }

        // A new version stamps the primary document even when nothing else
        // brought it into the run.
        let primary = self.config.upstream.primary_name.clone();
        if state.new_version && !state.report.touched(&primary) {
            match self.repo.get_document(&primary).await.or_raise(|| ErrorKind::Store)? {
                Some(record) => self.rerender_stored(state, record).await?,
                None => debug!(name = %primary, "primary document never synced"),
            }
        }

        // Fresh index content still has to land even when no rendering
        // demanded a session this run.
        if state.session.is_none() && matches!(state.index, IndexPlan::Refetch { .. }) {
            self.ensure_session(state).await?;
        }
        Ok(())
    }

    /// Operator reset: drop all durable state. Cache keys are left to
    /// expire; the next run republishes over them from scratch.
    pub async fn reset(&self) -> Result<()> {
        self.repo.wipe().await.or_raise(|| ErrorKind::Store)?;
        info!("durable state wiped");
        Ok(())
    }

    /// Build the conversion session on first need. `Ok(false)` means the
    /// cross-reference index could not be resolved this run; callers skip
    /// rendering and the checkpoint stays put.
    async fn ensure_session(&self, state: &mut RunState) -> Result<bool> {
        if state.session.is_some() {
            return Ok(true);
        }
        let index_name = self.config.upstream.index_name.clone();
        let plan = std::mem::replace(&mut state.index, IndexPlan::Stored);
        let (raw, fresh) = match plan {
            IndexPlan::Refetch { mut record, url, digest } => {
                match self.source.fetch(&url, None).await {
                    Ok(FetchResponse::Ok { bytes, etag }) => {
                        let encoding = Encoding::detect(&bytes);
                        record.etag = etag;
                        record.digest = Some(digest);
                        let raw =
                            RawDocument { name: record.name.clone(), encoding, bytes };
                        (raw, Some(record))
                    },
                    Ok(FetchResponse::NotModified) => {
                        // No validator was sent; a 304 is upstream misbehaving.
                        warn!(name = %index_name, "unconditional index fetch answered 304");
                        state.index = IndexPlan::Failed;
                        state.fetch_failed = true;
                        state.report.failed.push(index_name);
                        return Ok(false);
                    },
                    Err(error) => {
                        // The stored index is now known stale. Falling back
                        // to it would publish documents that never get
                        // re-rendered once the index comes back.
                        warn!(name = %index_name, ?error, "index fetch failed");
                        state.index = IndexPlan::Failed;
                        state.fetch_failed = true;
                        state.report.failed.push(index_name);
                        return Ok(false);
                    },
                }
            },
            IndexPlan::Stored => {
                match self.repo.get_raw(&index_name).await.or_raise(|| ErrorKind::Store)? {
                    Some(raw) => (raw, None),
                    None => {
                        warn!(name = %index_name, "cross-reference index has never been stored");
                        state.index = IndexPlan::Failed;
                        state.fetch_failed = true;
                        return Ok(false);
                    },
                }
            },
            IndexPlan::Failed => {
                state.index = IndexPlan::Failed;
                return Ok(false);
            },
        };

        let text = raw.encoding.decode(&raw.bytes).into_owned();
        let mut session = self
            .converter
            .session(&text, state.version_label.as_deref())
            .or_raise(|| ErrorKind::Render(raw.name.clone()))?;
        if let Some(record) = fresh {
            // The index is itself a published document; render it with the
            // session just built from it.
            let rendered = session
                .render(&raw.name, &text)
                .or_raise(|| ErrorKind::Render(raw.name.clone()))?;
            let encoding = raw.encoding;
            self.spawn_publish(state, record, rendered, encoding, Some(raw));
            state.report.published.push(index_name);
        }
        state.session = Some(session);
        Ok(true)
    }

    /// Render one document's raw content, resolving the session first.
    /// `Ok(None)` when no session could be built.
    async fn render_document(
        &self,
        state: &mut RunState,
        raw: &RawDocument,
    ) -> Result<Option<Vec<u8>>> {
        if !self.ensure_session(state).await? {
            return Ok(None);
        }
        let Some(session) = state.session.as_mut() else {
            return Ok(None);
        };
        let text = raw.encoding.decode(&raw.bytes);
        if raw.name == self.config.upstream.glossary_name {
            // The glossary contributes cross-reference targets of its own;
            // merge them before rendering it.
            session
                .add_references(&raw.name, &text)
                .or_raise(|| ErrorKind::Render(raw.name.clone()))?;
        }
        let rendered = session
            .render(&raw.name, &text)
            .or_raise(|| ErrorKind::Render(raw.name.clone()))?;
        Ok(Some(rendered))
    }

    /// Re-render a document from its stored raw bytes, without a fetch.
    async fn rerender_stored(&self, state: &mut RunState, record: DocumentRecord) -> Result<()> {
        let name = record.name.clone();
        match self.repo.get_raw(&name).await.or_raise(|| ErrorKind::Store)? {
            Some(raw) => match self.render_document(state, &raw).await? {
                Some(rendered) => {
                    let encoding = raw.encoding;
                    self.spawn_publish(state, record, rendered, encoding, None);
                    state.report.published.push(name);
                },
                None => state.report.failed.push(name),
            },
            None => {
                warn!(%name, "no stored content to re-render");
                state.report.failed.push(name);
            },
        }
        Ok(())
    }

    fn spawn_publish(
        &self,
        state: &mut RunState,
        record: DocumentRecord,
        rendered: Vec<u8>,
        encoding: Encoding,
        raw: Option<RawDocument>,
    ) {
        let publisher = self.publisher.clone();
        let expires_at = state.expires_at;
        state.publishes.spawn(async move {
            publisher.publish(record, rendered, encoding, expires_at, raw).await
        });
    }
}
