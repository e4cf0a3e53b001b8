//! Index read model.
//!
//! One JSON document summarizing every commitment, grouped by category.
//! It is derived data: [`build_index`] regenerates it from a list of
//! commitments, and [`scan_records`] recovers that list from exported
//! record files, so the index can always be rebuilt from either source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::models::{Category, Commitment, CommitmentStatus};
use crate::record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub generated_at: DateTime<Utc>,
    pub total_count: usize,
    /// Count per status, every status present.
    pub status_summary: BTreeMap<String, usize>,
    pub categories: Vec<CategoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub count: usize,
    pub commitments: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    /// Record path relative to the records directory.
    pub file: String,
    pub status: CommitmentStatus,
    pub target_date: Option<String>,
    pub target_value: Option<String>,
    pub last_updated: DateTime<Utc>,
}

fn relative_file(commitment: &Commitment) -> String {
    record::record_path(Path::new(""), commitment)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Build the index from `(commitment, record file)` pairs.
pub fn build_index_with_files(
    items: &[(Commitment, String)],
    generated_at: DateTime<Utc>,
) -> Index {
    let mut status_summary: BTreeMap<String, usize> = CommitmentStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut by_category: BTreeMap<Category, Vec<IndexEntry>> = BTreeMap::new();

    for (c, file) in items {
        *status_summary.entry(c.status.as_str().to_string()).or_default() += 1;
        by_category.entry(c.category).or_default().push(IndexEntry {
            id: c.id.clone(),
            title: c.title.clone(),
            file: file.clone(),
            status: c.status,
            target_date: c.target_date.map(|d| d.format("%Y-%m-%d").to_string()),
            target_value: c.target_value.clone(),
            last_updated: c.last_updated,
        });
    }

    let categories = by_category
        .into_iter()
        .map(|(category, commitments)| CategoryEntry {
            name: category.label().to_string(),
            count: commitments.len(),
            commitments,
        })
        .collect();

    Index {
        generated_at,
        total_count: items.len(),
        status_summary,
        categories,
    }
}

/// Build the index for commitments whose records live at their default paths.
pub fn build_index(commitments: &[Commitment], generated_at: DateTime<Utc>) -> Index {
    let items: Vec<(Commitment, String)> = commitments
        .iter()
        .map(|c| (c.clone(), relative_file(c)))
        .collect();
    build_index_with_files(&items, generated_at)
}

/// Parse every `*.md` record under `dir`, paired with its relative path.
pub fn scan_records(dir: &Path) -> Result<Vec<(Commitment, String)>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("md")
        {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let commitment =
            record::parse(&text).with_context(|| format!("parsing record {}", path.display()))?;
        let rel = path
            .strip_prefix(dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        out.push((commitment, rel));
    }
    out.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at));
    Ok(out)
}

/// Write the index as pretty JSON, creating parent directories.
pub fn write_index(index: &Index, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(index)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
