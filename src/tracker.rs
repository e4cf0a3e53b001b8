//! Status tracking: matching new documents to open commitments, and the
//! date-driven maintenance sweep.
//!
//! # Document tracking
//!
//! Each document goes through two oracle stages:
//!
//! 1. **Screen**: the document plus the titles of every open commitment,
//!    in batches of `screen_batch_size`. Returns candidate ids; ids that
//!    were not offered are dropped.
//! 2. **Verify**: the document plus the full body of one candidate.
//!    Only `is_related = true` mutates state.
//!
//! A related document either fulfills the commitment (terminal) or adds a
//! progress entry. Progress never clears `delayed` or `stale`.
//!
//! A transient oracle failure aborts the document so it is retried on the
//! next run. A malformed verify answer rejects that one candidate.
//!
//! # Sweep
//!
//! For every open commitment: a past `target_date` makes it `delayed`;
//! otherwise no update for `stale_after_months` makes it `stale`.

use std::collections::HashSet;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::extract::truncate_chars;
use crate::models::{Commitment, CommitmentStatus, Document};
use crate::oracle::{complete_with_retry, Oracle, OracleRequest, OracleTask, RetryPolicy};
use crate::prompts;
use crate::store::{CommitmentFilter, Store};

/// How a document relates to a commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    ProgressUpdate,
    FulfillmentEvidence,
    RelatedInfo,
}

impl RelationType {
    pub fn parse(s: &str) -> Option<RelationType> {
        match s {
            "progress_update" => Some(RelationType::ProgressUpdate),
            "fulfillment_evidence" => Some(RelationType::FulfillmentEvidence),
            "related_info" => Some(RelationType::RelatedInfo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn parse(s: &str) -> Option<Confidence> {
        match s {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }
}

/// A validated verify answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub is_related: bool,
    pub relation_type: Option<RelationType>,
    pub summary: Option<String>,
    pub is_fulfilled: bool,
    pub confidence: Option<Confidence>,
}

fn optional_str<'v>(reply: &'v Value, key: &str) -> PipelineResult<Option<&'v str>> {
    match reply.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(PipelineError::MalformedOracleResponse(format!(
            "{} must be a string, got {}",
            key, other
        ))),
    }
}

/// Validate a verify reply. `is_related` is required; unknown enum values
/// read as absent.
pub fn parse_verification(reply: &Value) -> PipelineResult<Verification> {
    let is_related = reply
        .get("is_related")
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            PipelineError::MalformedOracleResponse("missing boolean is_related".to_string())
        })?;
    let is_fulfilled = match reply.get("is_fulfilled") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(PipelineError::MalformedOracleResponse(format!(
                "is_fulfilled must be a boolean, got {}",
                other
            )))
        }
    };

    Ok(Verification {
        is_related,
        relation_type: optional_str(reply, "relation_type")?.and_then(RelationType::parse),
        summary: optional_str(reply, "summary")?
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        is_fulfilled,
        confidence: optional_str(reply, "confidence")?.and_then(Confidence::parse),
    })
}

/// Validate a screen reply against the ids that were offered.
///
/// Ids the oracle invented are dropped with a warning.
pub fn parse_screen(reply: &Value, offered: &HashSet<&str>) -> PipelineResult<Vec<String>> {
    let ids = reply
        .get("related_ids")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            PipelineError::MalformedOracleResponse("missing related_ids array".to_string())
        })?;

    let mut out = Vec::new();
    for id in ids {
        let Some(id) = id.as_str() else {
            return Err(PipelineError::MalformedOracleResponse(format!(
                "related id is not a string: {}",
                id
            )));
        };
        if offered.contains(id) {
            if !out.iter().any(|o: &String| o == id) {
                out.push(id.to_string());
            }
        } else {
            warn!(id, "screen returned an id that was not offered; dropped");
        }
    }
    Ok(out)
}

/// What tracking one document did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub screened: usize,
    pub related: usize,
    pub progress: usize,
    pub fulfilled: usize,
    /// Candidates whose verify answer was unusable.
    pub rejected: usize,
    /// Screened ids with no stored commitment.
    pub missing: usize,
}

impl DocumentOutcome {
    pub fn updated(&self) -> usize {
        self.progress + self.fulfilled
    }
}

/// Matches documents against open commitments and applies the results.
pub struct Tracker<'a> {
    oracle: &'a dyn Oracle,
    store: &'a dyn Store,
    policy: RetryPolicy,
    screen_batch_size: usize,
    max_input_chars: usize,
}

impl<'a> Tracker<'a> {
    pub fn new(oracle: &'a dyn Oracle, store: &'a dyn Store, config: &Config) -> Self {
        Self {
            oracle,
            store,
            policy: RetryPolicy::from_config(&config.oracle),
            screen_batch_size: config.tracker.screen_batch_size.max(1),
            max_input_chars: config.extractor.max_input_chars,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Screen open commitments by title. Returns related ids in offer order.
    pub async fn screen(
        &self,
        document_text: &str,
        open: &[Commitment],
    ) -> PipelineResult<Vec<String>> {
        let mut related = Vec::new();
        for batch in open.chunks(self.screen_batch_size) {
            let refs: Vec<&Commitment> = batch.iter().collect();
            let offered: HashSet<&str> = batch.iter().map(|c| c.id.as_str()).collect();
            let request = OracleRequest {
                task: OracleTask::Screen,
                system_prompt: prompts::screen_system_prompt(),
                user_text: prompts::screen_user_text(document_text, &refs),
            };
            let reply = complete_with_retry(self.oracle, &request, &self.policy).await?;
            for id in parse_screen(&reply, &offered)? {
                if !related.contains(&id) {
                    related.push(id);
                }
            }
        }
        Ok(related)
    }

    /// Ask the oracle whether `document_text` bears on `commitment`.
    pub async fn verify(
        &self,
        document_text: &str,
        commitment: &Commitment,
    ) -> PipelineResult<Verification> {
        let request = OracleRequest {
            task: OracleTask::Verify,
            system_prompt: prompts::verify_system_prompt(),
            user_text: prompts::verify_user_text(document_text, commitment),
        };
        let reply = complete_with_retry(self.oracle, &request, &self.policy).await?;
        parse_verification(&reply)
    }

    /// Run screen and verify for one document and persist every change.
    ///
    /// Returns `Err` only for failures that must leave the document
    /// unfinished: transient oracle exhaustion, a malformed screen answer,
    /// or a fatal error.
    pub async fn track_document(
        &self,
        document: &Document,
        now: DateTime<Utc>,
    ) -> PipelineResult<DocumentOutcome> {
        let full_text = document.full_text();
        let text = truncate_chars(&full_text, self.max_input_chars);
        let open = self.store.list(&CommitmentFilter::open()).await?;
        let mut outcome = DocumentOutcome::default();

        if open.is_empty() {
            debug!(document = %document.id, "no open commitments to screen");
            return Ok(outcome);
        }

        let related_ids = self.screen(text, &open).await?;
        outcome.screened = related_ids.len();

        for id in &related_ids {
            let Some(mut commitment) = self.store.get(id).await? else {
                let err = PipelineError::StorageInconsistency(format!(
                    "screened commitment {} is not in the store",
                    id
                ));
                warn!(document = %document.id, error = %err, "skipping candidate");
                outcome.missing += 1;
                continue;
            };
            if commitment.status.is_terminal() {
                continue;
            }
            if already_applied(&commitment, &document.id) {
                debug!(document = %document.id, commitment = %id, "already recorded");
                continue;
            }

            let verification = match self.verify(text, &commitment).await {
                Ok(v) => v,
                Err(PipelineError::MalformedOracleResponse(msg)) => {
                    warn!(
                        document = %document.id,
                        commitment = %id,
                        error = %msg,
                        "verify answer rejected"
                    );
                    outcome.rejected += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !verification.is_related {
                continue;
            }
            outcome.related += 1;

            let summary = verification
                .summary
                .clone()
                .unwrap_or_else(|| format!("文件 {} 與此承諾相關", document.id));
            let source_ref = Some(document.id.clone());

            let changed = if verification.is_fulfilled {
                let changed = commitment.transition(
                    CommitmentStatus::Fulfilled,
                    &summary,
                    source_ref,
                    now,
                );
                if changed {
                    outcome.fulfilled += 1;
                }
                changed
            } else {
                let changed = commitment.record_progress(&summary, source_ref, now);
                if changed {
                    outcome.progress += 1;
                }
                changed
            };

            if changed {
                self.store.put(&commitment).await?;
                debug!(
                    document = %document.id,
                    commitment = %commitment.id,
                    status = %commitment.status,
                    "commitment updated"
                );
            }
        }

        Ok(outcome)
    }
}

/// A document whose id is already in the log has nothing new to add.
fn already_applied(commitment: &Commitment, document_id: &str) -> bool {
    commitment
        .tracking_history
        .entries()
        .iter()
        .any(|r| r.source_ref.as_deref() == Some(document_id))
}

/// What a sweep changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub scanned: usize,
    pub delayed: Vec<String>,
    pub stale: Vec<String>,
}

/// Apply date-driven transitions as of `now`. Idempotent for a fixed `now`.
pub async fn sweep(
    store: &dyn Store,
    now: DateTime<Utc>,
    stale_after_months: u32,
) -> PipelineResult<SweepOutcome> {
    let today = now.date_naive();
    let stale_cutoff: Option<NaiveDate> = today.checked_sub_months(Months::new(stale_after_months));
    let open = store.list(&CommitmentFilter::open()).await?;

    let mut outcome = SweepOutcome {
        scanned: open.len(),
        ..SweepOutcome::default()
    };

    for mut commitment in open {
        let changed = match commitment.target_date {
            Some(target) if target < today => {
                let reason = format!("目標日期 {} 已過", target.format("%Y-%m-%d"));
                let changed = commitment.transition(CommitmentStatus::Delayed, &reason, None, now);
                if changed {
                    outcome.delayed.push(commitment.id.clone());
                }
                changed
            }
            _ => {
                let last = commitment.last_updated.date_naive();
                match stale_cutoff {
                    Some(cutoff) if last < cutoff => {
                        let reason = format!(
                            "最後更新於 {}，已超過 {} 個月無更新",
                            last.format("%Y-%m-%d"),
                            stale_after_months
                        );
                        let changed =
                            commitment.transition(CommitmentStatus::Stale, &reason, None, now);
                        if changed {
                            outcome.stale.push(commitment.id.clone());
                        }
                        changed
                    }
                    _ => false,
                }
            }
        };

        if changed {
            store.put(&commitment).await?;
        }
    }

    info!(
        scanned = outcome.scanned,
        delayed = outcome.delayed.len(),
        stale = outcome.stale.len(),
        "sweep complete"
    );
    Ok(outcome)
}
