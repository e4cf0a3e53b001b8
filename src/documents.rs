//! Document discovery.
//!
//! Documents arrive as JSON files under `[documents].root`. A file holds one
//! document object or an array of them:
//!
//! ```json
//! {
//!   "term": 11, "session_period": 2, "meeting_index": 5,
//!   "ey_number": "院臺1130001", "ly_number": "1130123",
//!   "subject": "行政院函送立法委員質詢之書面答復",
//!   "content": "……",
//!   "source_url": "https://…",
//!   "date": "2025-03-04"
//! }
//! ```
//!
//! `id` is optional and derived from the legislative coordinates when
//! absent. Results are sorted by date, then coordinates, then id.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::config::{Config, DocumentsConfig};
use crate::identity::document_id;
use crate::models::Document;

/// Anything that can hand the pipeline a batch of documents.
pub trait DocumentSource {
    /// Documents in processing order.
    fn documents(&self) -> Result<Vec<Document>>;
}

impl DocumentSource for Vec<Document> {
    fn documents(&self) -> Result<Vec<Document>> {
        Ok(self.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    id: Option<String>,
    term: u32,
    session_period: u32,
    #[serde(default)]
    meeting_index: u32,
    #[serde(default)]
    ey_number: Option<String>,
    #[serde(default)]
    ly_number: Option<String>,
    #[serde(default)]
    subject: String,
    content: String,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFile {
    Many(Vec<RawDocument>),
    One(RawDocument),
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        let id = raw.id.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| {
            document_id(
                raw.term,
                raw.session_period,
                raw.meeting_index,
                raw.ey_number.as_deref(),
                raw.ly_number.as_deref(),
            )
        });
        Document {
            id,
            term: raw.term,
            session_period: raw.session_period,
            meeting_index: raw.meeting_index,
            ey_number: raw.ey_number,
            ly_number: raw.ly_number,
            subject: raw.subject,
            content: raw.content,
            source_url: raw.source_url,
            date: raw.date,
        }
    }
}

/// Parse one JSON document file.
pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let raw: RawFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing document JSON in {}", path.display()))?;
    Ok(match raw {
        RawFile::Many(docs) => docs.into_iter().map(Document::from).collect(),
        RawFile::One(doc) => vec![Document::from(doc)],
    })
}

/// JSON files under a directory tree.
pub struct FsDocumentSource {
    config: DocumentsConfig,
}

impl FsDocumentSource {
    pub fn new(config: DocumentsConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let docs = config
            .documents
            .clone()
            .ok_or_else(|| anyhow!("[documents] section not configured"))?;
        Ok(Self::new(docs))
    }
}

impl DocumentSource for FsDocumentSource {
    fn documents(&self) -> Result<Vec<Document>> {
        let root = &self.config.root;
        if !root.exists() {
            bail!("documents root does not exist: {}", root.display());
        }

        let include_set = build_globset(&self.config.include_globs)?;
        let mut excludes = vec!["**/.git/**".to_string()];
        excludes.extend(self.config.exclude_globs.clone());
        let exclude_set = build_globset(&excludes)?;

        let mut docs = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            docs.extend(load_file(path)?);
        }

        sort_documents(&mut docs);
        docs.dedup_by(|a, b| a.id == b.id);
        Ok(docs)
    }
}

/// Deterministic processing order: oldest first.
pub fn sort_documents(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        (a.date, a.term, a.session_period, a.meeting_index, &a.id).cmp(&(
            b.date,
            b.term,
            b.session_period,
            b.meeting_index,
            &b.id,
        ))
    });
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
