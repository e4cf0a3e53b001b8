//! Run orchestration.
//!
//! Coordinates the batch flows: documents → extraction → dedup → store, and
//! documents → screen/verify → status updates, plus the sweep and compaction
//! maintenance runs. Every run processes documents strictly in order, one at
//! a time, and ends with a [`RunSummary`].
//!
//! Failure handling per document:
//!
//! | Outcome | Counted as | Checkpointed |
//! |---------|------------|--------------|
//! | completed | `processed` | yes |
//! | oracle retries exhausted | `failed` | no, retried next run |
//! | unusable oracle answer | `failed` | no, retried next run |
//! | subject too long to segment | `failed` | no |
//! | configuration or storage error | aborts the run | no |

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, FileCheckpoint};
use crate::config::Config;
use crate::dedup;
use crate::documents::{DocumentSource, FsDocumentSource};
use crate::extract::Extractor;
use crate::models::Document;
use crate::oracle::{create_oracle, DisabledOracle, Oracle, RetryPolicy};
use crate::progress::{NoProgress, ProgressEvent, ProgressMode, ProgressReporter};
use crate::segment::segment;
use crate::similarity::SimilarityThresholds;
use crate::store::sqlite::SqliteStore;
use crate::store::{CommitmentFilter, Store};
use crate::tracker::{self, Tracker};

/// Checkpoint run used by `extract`.
pub const EXTRACT_RUN: &str = "extract";
/// Default checkpoint run used by `track`.
pub const TRACK_RUN: &str = "track";

/// Counts reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run: String,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub rejected: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RunSummary {
    fn new(run: &str) -> Self {
        Self {
            run: run.to_string(),
            ..Self::default()
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.run)?;
        writeln!(f, "  processed: {}", self.processed)?;
        writeln!(f, "  created: {}", self.created)?;
        writeln!(f, "  updated: {}", self.updated)?;
        writeln!(f, "  deleted: {}", self.deleted)?;
        writeln!(f, "  rejected: {}", self.rejected)?;
        writeln!(f, "  skipped: {}", self.skipped)?;
        writeln!(f, "  failed: {}", self.failed)?;
        write!(f, "ok")
    }
}

/// Options for [`Pipeline::extract`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractOptions {
    /// Ignore the checkpoint and reprocess every document.
    pub full: bool,
    /// Report documents and chunk estimates without calling the oracle.
    pub dry_run: bool,
    /// Process at most this many pending documents.
    pub limit: Option<usize>,
}

/// Everything a run needs, borrowed from the caller.
pub struct Pipeline<'a> {
    config: &'a Config,
    store: &'a dyn Store,
    oracle: &'a dyn Oracle,
    progress: &'a dyn ProgressReporter,
    policy: RetryPolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a dyn Store,
        oracle: &'a dyn Oracle,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            config,
            store,
            oracle,
            progress,
            policy: RetryPolicy::from_config(&config.oracle),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn pending<'d>(
        &self,
        documents: &'d [Document],
        checkpoint: &dyn Checkpoint,
        ignore_checkpoint: bool,
        limit: Option<usize>,
        summary: &mut RunSummary,
    ) -> Vec<&'d Document> {
        let mut pending: Vec<&Document> = Vec::new();
        for doc in documents {
            if !ignore_checkpoint && checkpoint.is_done(&doc.id) {
                summary.skipped += 1;
            } else {
                pending.push(doc);
            }
        }
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        pending
    }

    /// Extract commitments from every pending document and merge them.
    pub async fn extract(
        &self,
        documents: &[Document],
        checkpoint: &dyn Checkpoint,
        options: ExtractOptions,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let span = tracing::info_span!("run", run = "extract", run_id = %Uuid::new_v4());
        self.extract_inner(documents, checkpoint, options, now)
            .instrument(span)
            .await
    }

    async fn extract_inner(
        &self,
        documents: &[Document],
        checkpoint: &dyn Checkpoint,
        options: ExtractOptions,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::new("extract");
        let pending = self.pending(documents, checkpoint, options.full, options.limit, &mut summary);

        if options.dry_run {
            summary.run = "extract (dry-run)".to_string();
            let mut chunks = 0u64;
            for doc in &pending {
                match segment(
                    &doc.id,
                    &doc.subject,
                    &doc.content,
                    self.config.segmenter.chunk_size,
                    self.config.segmenter.overlap,
                ) {
                    Ok(c) => {
                        chunks += c.len() as u64;
                        summary.processed += 1;
                    }
                    Err(e) => {
                        warn!(document = %doc.id, error = %e, "document cannot be segmented");
                        summary.failed += 1;
                    }
                }
            }
            info!(documents = pending.len(), estimated_chunks = chunks, "dry run");
            return Ok(summary);
        }

        let extractor = Extractor::new(self.oracle, self.config).with_policy(self.policy);
        let thresholds = SimilarityThresholds::from(&self.config.dedup);
        let total = pending.len() as u64;
        info!(documents = total, skipped = summary.skipped, "extraction started");

        for (i, doc) in pending.into_iter().enumerate() {
            self.progress.report(ProgressEvent::Processing {
                run: "extract".to_string(),
                n: i as u64 + 1,
                total,
                document: doc.id.clone(),
            });

            let candidates = match extractor.extract_document(doc, now).await {
                Ok(c) => c,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(document = %doc.id, error = %e, "extraction failed; document skipped");
                    summary.failed += 1;
                    continue;
                }
            };

            let outcome = dedup::merge_into(self.store, &candidates, &thresholds).await?;
            summary.created += outcome.to_add.len() as u64;
            summary.rejected += outcome.rejected.len() as u64;
            summary.deleted += outcome.delete_existing.len() as u64;

            checkpoint.mark_done(&doc.id)?;
            summary.processed += 1;
        }

        info!(
            processed = summary.processed,
            created = summary.created,
            failed = summary.failed,
            "extraction complete"
        );
        Ok(summary)
    }

    /// Screen and verify every pending document against open commitments.
    pub async fn track(
        &self,
        documents: &[Document],
        checkpoint: &dyn Checkpoint,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let span = tracing::info_span!("run", run = "track", run_id = %Uuid::new_v4());
        self.track_inner(documents, checkpoint, limit, now)
            .instrument(span)
            .await
    }

    async fn track_inner(
        &self,
        documents: &[Document],
        checkpoint: &dyn Checkpoint,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::new("track");
        let pending = self.pending(documents, checkpoint, false, limit, &mut summary);
        let tracker = Tracker::new(self.oracle, self.store, self.config).with_policy(self.policy);
        let total = pending.len() as u64;
        info!(documents = total, skipped = summary.skipped, "tracking started");

        for (i, doc) in pending.into_iter().enumerate() {
            self.progress.report(ProgressEvent::Processing {
                run: "track".to_string(),
                n: i as u64 + 1,
                total,
                document: doc.id.clone(),
            });

            match tracker.track_document(doc, now).await {
                Ok(outcome) => {
                    summary.updated += outcome.updated() as u64;
                    summary.rejected += outcome.rejected as u64;
                    checkpoint.mark_done(&doc.id)?;
                    summary.processed += 1;
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(document = %doc.id, error = %e, "tracking failed; document left for next run");
                    summary.failed += 1;
                }
            }
        }

        info!(
            processed = summary.processed,
            updated = summary.updated,
            failed = summary.failed,
            "tracking complete"
        );
        Ok(summary)
    }

    /// Apply date-driven transitions as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let span = tracing::info_span!("run", run = "sweep", run_id = %Uuid::new_v4());
        async {
            let outcome = tracker::sweep(self.store, now, self.config.tracker.stale_after_months)
                .await?;
            let mut summary = RunSummary::new("sweep");
            summary.processed = outcome.scanned as u64;
            summary.updated = (outcome.delayed.len() + outcome.stale.len()) as u64;
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Re-run dedup over the whole store.
    pub async fn compact(&self) -> Result<RunSummary> {
        let span = tracing::info_span!("run", run = "compact", run_id = %Uuid::new_v4());
        async {
            let before = self.store.list(&CommitmentFilter::all()).await?.len();
            let thresholds = SimilarityThresholds::from(&self.config.dedup);
            let deleted = dedup::compact(self.store, &thresholds).await?;
            let mut summary = RunSummary::new("compact");
            summary.processed = before as u64;
            summary.deleted = deleted.len() as u64;
            Ok(summary)
        }
        .instrument(span)
        .await
    }
}

// ============ CLI entry points ============

fn load_documents(config: &Config, progress: &dyn ProgressReporter, run: &str) -> Result<Vec<Document>> {
    progress.report(ProgressEvent::Discovering {
        run: run.to_string(),
    });
    FsDocumentSource::from_config(config)?.documents()
}

/// `pledge extract`: extract from configured documents into the store.
pub async fn run_extract(
    config: &Config,
    options: ExtractOptions,
    mode: ProgressMode,
) -> Result<()> {
    let reporter = mode.reporter();
    let documents = load_documents(config, reporter.as_ref(), "extract")?;
    let store = SqliteStore::open(config).await?;
    let oracle: Box<dyn Oracle> = if options.dry_run {
        Box::new(DisabledOracle)
    } else {
        create_oracle(&config.oracle)?
    };
    let checkpoint = FileCheckpoint::open(&config.tracker.checkpoint_dir, EXTRACT_RUN)?;

    let summary = Pipeline::new(config, &store, oracle.as_ref(), reporter.as_ref())
        .extract(&documents, &checkpoint, options, Utc::now())
        .await;
    store.close().await;

    println!("{}", summary?);
    Ok(())
}

/// `pledge track`: screen and verify configured documents against open commitments.
pub async fn run_track(
    config: &Config,
    run: &str,
    reset: bool,
    limit: Option<usize>,
    mode: ProgressMode,
) -> Result<()> {
    if reset {
        FileCheckpoint::reset(&config.tracker.checkpoint_dir, run)?;
        info!(run, "checkpoint reset");
    }
    let reporter = mode.reporter();
    let documents = load_documents(config, reporter.as_ref(), run)?;
    let store = SqliteStore::open(config).await?;
    let oracle = create_oracle(&config.oracle)?;
    let checkpoint = FileCheckpoint::open(&config.tracker.checkpoint_dir, run)?;

    let summary = Pipeline::new(config, &store, oracle.as_ref(), reporter.as_ref())
        .track(&documents, &checkpoint, limit, Utc::now())
        .await;
    store.close().await;

    let mut summary = summary?;
    summary.run = run.to_string();
    println!("{}", summary);
    Ok(())
}

/// `pledge sweep`: date-driven transitions as of `today` (default: now).
pub async fn run_sweep(config: &Config, today: Option<NaiveDate>) -> Result<()> {
    let now = match today {
        Some(date) => date.and_time(NaiveTime::MIN).and_utc(),
        None => Utc::now(),
    };
    let store = SqliteStore::open(config).await?;
    let summary = Pipeline::new(config, &store, &DisabledOracle, &NoProgress)
        .sweep(now)
        .await;
    store.close().await;

    println!("{}", summary?);
    Ok(())
}

/// `pledge compact`: re-run dedup over the whole store.
pub async fn run_compact(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let summary = Pipeline::new(config, &store, &DisabledOracle, &NoProgress)
        .compact()
        .await;
    store.close().await;

    println!("{}", summary?);
    Ok(())
}
