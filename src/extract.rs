//! Commitment extraction.
//!
//! Sends document text to the oracle under the extraction contract and
//! turns the structured reply into candidate [`Commitment`]s. A reply is
//! accepted whole or rejected whole: unparseable JSON, a missing
//! `commitments` key, or any candidate lacking a required field or
//! carrying an unknown category rejects the entire response. An empty
//! `commitments` array is a valid result.
//!
//! Input is truncated to `max_input_chars`, keeping the earliest text:
//! commitments cluster near the start of these documents.

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::identity::commitment_id;
use crate::models::{
    Category, Commitment, CommitmentStatus, Document, RecordType, SourceRef, TrackingLog,
    TrackingRecord,
};
use crate::oracle::{complete_with_retry, Oracle, OracleRequest, OracleTask, RetryPolicy};
use crate::prompts;
use crate::segment::segment;

pub const MAX_SHORT_NAME_CHARS: usize = 20;
pub const MAX_EXCERPT_CHARS: usize = 200;

const RESERVED_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    commitments: Vec<CandidateReply>,
}

#[derive(Debug, Deserialize)]
struct CandidateReply {
    title: String,
    short_name: String,
    category: Category,
    text: String,
    #[serde(default)]
    target_date: Option<Value>,
    #[serde(default)]
    target_value: Option<String>,
    #[serde(default)]
    responsible_agency: Option<String>,
}

/// Turns document text into candidate commitments via the oracle.
pub struct Extractor<'a> {
    oracle: &'a dyn Oracle,
    policy: RetryPolicy,
    max_input_chars: usize,
    chunk_size: usize,
    overlap: usize,
}

impl<'a> Extractor<'a> {
    pub fn new(oracle: &'a dyn Oracle, config: &Config) -> Self {
        Self {
            oracle,
            policy: RetryPolicy::from_config(&config.oracle),
            max_input_chars: config.extractor.max_input_chars,
            chunk_size: config.segmenter.chunk_size,
            overlap: config.segmenter.overlap,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Extract candidates from one piece of text.
    pub async fn extract(
        &self,
        document_text: &str,
        source: &SourceRef,
        now: DateTime<Utc>,
    ) -> PipelineResult<Vec<Commitment>> {
        let request = OracleRequest {
            task: OracleTask::Extract,
            system_prompt: prompts::extract_system_prompt(),
            user_text: truncate_chars(document_text, self.max_input_chars).to_string(),
        };
        let reply = complete_with_retry(self.oracle, &request, &self.policy).await?;
        parse_candidates(reply, source, now)
    }

    /// Segment a document and extract from every chunk.
    ///
    /// Any chunk failing fails the whole document; the caller restarts it
    /// from chunk 0 on the next run. Candidates repeated across overlapping
    /// chunks collapse to their first occurrence.
    pub async fn extract_document(
        &self,
        document: &Document,
        now: DateTime<Utc>,
    ) -> PipelineResult<Vec<Commitment>> {
        let chunks = segment(
            &document.id,
            &document.subject,
            &document.content,
            self.chunk_size,
            self.overlap,
        )?;
        let source = document.source_ref();

        let mut out: Vec<Commitment> = Vec::new();
        for chunk in &chunks {
            let text = chunk.prompt_text(&document.subject);
            let candidates = self.extract(&text, &source, now).await?;
            debug!(
                document = %document.id,
                chunk = ?chunk.chunk_index,
                candidates = candidates.len(),
                "extracted chunk"
            );
            for candidate in candidates {
                if !out.iter().any(|c| c.id == candidate.id) {
                    out.push(candidate);
                }
            }
        }
        Ok(out)
    }
}

/// Validate an extraction reply and build candidate commitments.
pub fn parse_candidates(
    reply: Value,
    source: &SourceRef,
    now: DateTime<Utc>,
) -> PipelineResult<Vec<Commitment>> {
    if reply.get("commitments").is_none() {
        return Err(PipelineError::MalformedOracleResponse(
            "reply lacks the `commitments` key".to_string(),
        ));
    }
    let parsed: ExtractionReply = serde_json::from_value(reply)
        .map_err(|e| PipelineError::MalformedOracleResponse(format!("bad candidate: {}", e)))?;

    parsed
        .commitments
        .into_iter()
        .map(|raw| build_candidate(raw, source, now))
        .collect()
}

fn build_candidate(
    raw: CandidateReply,
    source: &SourceRef,
    now: DateTime<Utc>,
) -> PipelineResult<Commitment> {
    let title = raw.title.trim().to_string();
    let text = truncate_chars(raw.text.trim(), MAX_EXCERPT_CHARS).to_string();
    if title.is_empty() || text.is_empty() {
        return Err(PipelineError::MalformedOracleResponse(
            "candidate with empty title or text".to_string(),
        ));
    }

    let mut short_name = sanitize_short_name(&raw.short_name);
    if short_name.is_empty() {
        short_name = sanitize_short_name(&title);
    }

    let target_date = match raw.target_date {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => {
            let parsed = normalize_target_date(&s);
            if parsed.is_none() {
                warn!(title = %title, raw = %s, "unparseable target_date dropped");
            }
            parsed
        }
        Some(Value::Number(n)) => n.as_u64().and_then(|y| normalize_target_date(&y.to_string())),
        Some(other) => {
            warn!(title = %title, raw = %other, "unexpected target_date type dropped");
            None
        }
    };

    let id = commitment_id(&title, &text);
    let summary = match source.document_id {
        Some(ref doc) => format!("自文件 {} 擷取建立", doc),
        None => "擷取建立".to_string(),
    };

    let mut history = TrackingLog::new();
    history.append(TrackingRecord {
        date: now.date_naive(),
        record_type: RecordType::Initial,
        summary,
        source_ref: source.document_id.clone(),
        new_status: Some(CommitmentStatus::Tracking),
    });

    Ok(Commitment {
        id,
        title,
        short_name,
        category: raw.category,
        text,
        target_date,
        target_value: non_empty(raw.target_value),
        responsible_agency: non_empty(raw.responsible_agency),
        status: CommitmentStatus::Tracking,
        source: source.clone(),
        created_at: now,
        last_updated: now,
        tracking_history: history,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "null")
}

/// The first `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Make a name safe to use as a file name, at most 20 characters.
pub fn sanitize_short_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if RESERVED_FILENAME_CHARS.contains(&c) || c.is_control() || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '_' || c == '.');
    truncate_chars(trimmed, MAX_SHORT_NAME_CHARS).to_string()
}

/// Normalize a target date to the last day of the stated period.
///
/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD` with `-`, `/` or `.`
/// separators, and the `YYYY年M月D日` forms. Years below 1000 are read as
/// Minguo years (`115年` is 2026).
pub fn normalize_target_date(raw: &str) -> Option<NaiveDate> {
    let unified: String = raw
        .trim()
        .trim_start_matches("民國")
        .chars()
        .map(|c| match c {
            '年' | '月' | '/' | '.' => '-',
            '日' | '底' => ' ',
            other => other,
        })
        .collect();

    let parts: Vec<u32> = unified
        .split('-')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;

    let year = match *parts.first()? {
        y if y < 1000 => (y + 1911) as i32,
        y => y as i32,
    };

    match parts.len() {
        1 => NaiveDate::from_ymd_opt(year, 12, 31),
        2 => last_day_of_month(year, parts[1]),
        3 => NaiveDate::from_ymd_opt(year, parts[1], parts[2]),
        _ => None,
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    first.checked_add_months(Months::new(1))?.pred_opt()
}
