//! Core data models used throughout the pledge tracker.
//!
//! These types represent the documents, chunks, commitments and tracking
//! records that flow through extraction, dedup and status tracking.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A government-response document. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub term: u32,
    pub session_period: u32,
    pub meeting_index: u32,
    pub ey_number: Option<String>,
    pub ly_number: Option<String>,
    pub subject: String,
    pub content: String,
    pub source_url: Option<String>,
    pub date: Option<NaiveDate>,
}

impl Document {
    /// Reference to this document as stored on commitments it yields.
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            document_id: Some(self.id.clone()),
            term: Some(self.term),
            session_period: Some(self.session_period),
            ey_number: self.ey_number.clone(),
            url: self.source_url.clone(),
        }
    }

    /// Subject and content as one text, the way the oracle reads it.
    pub fn full_text(&self) -> String {
        format!("{}\n\n{}", self.subject, self.content)
    }
}

/// A bounded slice of a document's content.
///
/// `chunk_index` is `None` for the implicit single chunk of a short document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub base_document_id: String,
    pub chunk_index: Option<usize>,
    pub total_chunks: usize,
    pub text: String,
}

/// Where a commitment was first found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: Option<String>,
    pub term: Option<u32>,
    pub session_period: Option<u32>,
    pub ey_number: Option<String>,
    pub url: Option<String>,
}

/// Closed set of commitment categories. Partitioning only, no semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "經濟產業", alias = "economy")]
    Economy,
    #[serde(rename = "財政金融", alias = "finance")]
    Finance,
    #[serde(rename = "社會福利", alias = "welfare")]
    Welfare,
    #[serde(rename = "勞動就業", alias = "labor")]
    Labor,
    #[serde(rename = "教育文化", alias = "education")]
    Education,
    #[serde(rename = "醫療衛生", alias = "health")]
    Health,
    #[serde(rename = "環境能源", alias = "environment")]
    Environment,
    #[serde(rename = "交通建設", alias = "infrastructure")]
    Infrastructure,
    #[serde(rename = "農業", alias = "agriculture")]
    Agriculture,
    #[serde(rename = "國防外交", alias = "defense")]
    Defense,
    #[serde(rename = "內政治安", alias = "interior")]
    Interior,
    #[serde(rename = "司法人權", alias = "justice")]
    Justice,
    #[serde(rename = "科技數位", alias = "technology")]
    Technology,
    #[serde(rename = "其他", alias = "other")]
    Other,
}

impl Category {
    pub const ALL: [Category; 14] = [
        Category::Economy,
        Category::Finance,
        Category::Welfare,
        Category::Labor,
        Category::Education,
        Category::Health,
        Category::Environment,
        Category::Infrastructure,
        Category::Agriculture,
        Category::Defense,
        Category::Interior,
        Category::Justice,
        Category::Technology,
        Category::Other,
    ];

    /// Display label, as used in prompts and records.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Economy => "經濟產業",
            Category::Finance => "財政金融",
            Category::Welfare => "社會福利",
            Category::Labor => "勞動就業",
            Category::Education => "教育文化",
            Category::Health => "醫療衛生",
            Category::Environment => "環境能源",
            Category::Infrastructure => "交通建設",
            Category::Agriculture => "農業",
            Category::Defense => "國防外交",
            Category::Interior => "內政治安",
            Category::Justice => "司法人權",
            Category::Technology => "科技數位",
            Category::Other => "其他",
        }
    }

    /// ASCII key used for storage columns and directory names.
    pub fn slug(&self) -> &'static str {
        match self {
            Category::Economy => "economy",
            Category::Finance => "finance",
            Category::Welfare => "welfare",
            Category::Labor => "labor",
            Category::Education => "education",
            Category::Health => "health",
            Category::Environment => "environment",
            Category::Infrastructure => "infrastructure",
            Category::Agriculture => "agriculture",
            Category::Defense => "defense",
            Category::Interior => "interior",
            Category::Justice => "justice",
            Category::Technology => "technology",
            Category::Other => "other",
        }
    }

    pub fn from_slug(s: &str) -> Option<Category> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.slug() == s || c.label() == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle state of a commitment. `Fulfilled` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentStatus {
    #[serde(alias = "追蹤中")]
    Tracking,
    #[serde(alias = "已達成")]
    Fulfilled,
    #[serde(alias = "已延宕")]
    Delayed,
    #[serde(alias = "無更新")]
    Stale,
}

impl CommitmentStatus {
    pub const ALL: [CommitmentStatus; 4] = [
        CommitmentStatus::Tracking,
        CommitmentStatus::Fulfilled,
        CommitmentStatus::Delayed,
        CommitmentStatus::Stale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentStatus::Tracking => "tracking",
            CommitmentStatus::Fulfilled => "fulfilled",
            CommitmentStatus::Delayed => "delayed",
            CommitmentStatus::Stale => "stale",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CommitmentStatus::Tracking => "追蹤中",
            CommitmentStatus::Fulfilled => "已達成",
            CommitmentStatus::Delayed => "已延宕",
            CommitmentStatus::Stale => "無更新",
        }
    }

    pub fn parse(s: &str) -> Option<CommitmentStatus> {
        CommitmentStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s || st.label() == s)
    }

    pub fn is_terminal(&self) -> bool {
        *self == CommitmentStatus::Fulfilled
    }
}

impl fmt::Display for CommitmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entry in a commitment's tracking log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Initial,
    ProgressUpdate,
    StatusChange,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Initial => "initial",
            RecordType::ProgressUpdate => "progress_update",
            RecordType::StatusChange => "status_change",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordType::Initial => "初始建立",
            RecordType::ProgressUpdate => "進度更新",
            RecordType::StatusChange => "狀態變更",
        }
    }

    pub fn parse(s: &str) -> Option<RecordType> {
        [
            RecordType::Initial,
            RecordType::ProgressUpdate,
            RecordType::StatusChange,
        ]
        .into_iter()
        .find(|rt| rt.as_str() == s || rt.label() == s)
    }
}

/// One dated entry in a commitment's tracking log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub date: NaiveDate,
    pub record_type: RecordType,
    pub summary: String,
    pub source_ref: Option<String>,
    /// Status after this entry. Set on `Initial` and `StatusChange` entries.
    pub new_status: Option<CommitmentStatus>,
}

/// Append-only log of tracking records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingLog(Vec<TrackingRecord>);

impl TrackingLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn append(&mut self, record: TrackingRecord) {
        self.0.push(record);
    }

    pub fn entries(&self) -> &[TrackingRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&TrackingRecord> {
        self.0.last()
    }

    /// Fold the log into the status and date it implies.
    ///
    /// Returns `None` for an empty log.
    pub fn replay(&self) -> Option<(CommitmentStatus, NaiveDate)> {
        let mut status = CommitmentStatus::Tracking;
        let mut last = None;
        for record in &self.0 {
            if let Some(next) = record.new_status {
                status = next;
            }
            last = Some(last.map_or(record.date, |d: NaiveDate| d.max(record.date)));
        }
        last.map(|d| (status, d))
    }
}

impl From<Vec<TrackingRecord>> for TrackingLog {
    fn from(records: Vec<TrackingRecord>) -> Self {
        Self(records)
    }
}

/// A canonical policy commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub id: String,
    pub title: String,
    pub short_name: String,
    pub category: Category,
    pub text: String,
    pub target_date: Option<NaiveDate>,
    pub target_value: Option<String>,
    pub responsible_agency: Option<String>,
    pub status: CommitmentStatus,
    pub source: SourceRef,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub tracking_history: TrackingLog,
}

impl Commitment {
    /// Move to `to`, appending one status-change record with `reason`.
    ///
    /// Returns `false` without touching anything when the commitment is
    /// already terminal or already in `to`.
    pub fn transition(
        &mut self,
        to: CommitmentStatus,
        reason: &str,
        source_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status.is_terminal() || self.status == to {
            return false;
        }
        let summary = format!("{} → {}：{}", self.status.label(), to.label(), reason);
        self.tracking_history.append(TrackingRecord {
            date: now.date_naive(),
            record_type: RecordType::StatusChange,
            summary,
            source_ref,
            new_status: Some(to),
        });
        self.status = to;
        self.last_updated = now;
        true
    }

    /// Append a progress record without changing status.
    ///
    /// Returns `false` when the commitment is terminal.
    pub fn record_progress(
        &mut self,
        summary: &str,
        source_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.tracking_history.append(TrackingRecord {
            date: now.date_naive(),
            record_type: RecordType::ProgressUpdate,
            summary: summary.to_string(),
            source_ref,
            new_status: None,
        });
        self.last_updated = now;
        true
    }
}
