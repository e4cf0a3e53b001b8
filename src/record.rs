//! Persisted commitment records.
//!
//! A record is a markdown file with a TOML front-matter header between
//! `+++` fences, followed by the original excerpt and the dated tracking
//! log:
//!
//! ```text
//! +++
//! id = "…"
//! title = "…"
//! category = "環境能源"
//! status = "tracking"
//! …
//! +++
//!
//! # 再生能源占比提升至20%
//!
//! ## 原文摘錄
//!
//! > 政府承諾於2026年將再生能源占比提升至20%
//!
//! ## 追蹤紀錄
//!
//! ### 2025-03-04 [初始建立]
//! - 來源：d1
//! - 狀態：tracking
//!
//! > 自文件 d1 擷取建立
//! ```
//!
//! Free text (excerpt and summaries) is always block-quoted, so no line of
//! it can be mistaken for structure. [`parse`] inverts [`render`] exactly.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    Category, Commitment, CommitmentStatus, RecordType, SourceRef, TrackingLog, TrackingRecord,
};

const FENCE: &str = "+++";
const EXCERPT_HEADING: &str = "## 原文摘錄";
const LOG_HEADING: &str = "## 追蹤紀錄";
const SOURCE_PREFIX: &str = "- 來源：";
const STATUS_PREFIX: &str = "- 狀態：";

#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    id: String,
    title: String,
    short_name: String,
    category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    responsible_agency: Option<String>,
    status: CommitmentStatus,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    source: RecordSource,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    term: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_period: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ey_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

fn push_quoted(out: &mut String, text: &str) {
    for line in text.split('\n') {
        if line.is_empty() {
            out.push_str(">\n");
        } else {
            out.push_str("> ");
            out.push_str(line);
            out.push('\n');
        }
    }
}

fn unquote(line: &str) -> Option<&str> {
    if line == ">" {
        Some("")
    } else {
        line.strip_prefix("> ")
    }
}

/// Render a commitment as a markdown record.
pub fn render(commitment: &Commitment) -> Result<String> {
    let header = RecordHeader {
        id: commitment.id.clone(),
        title: commitment.title.clone(),
        short_name: commitment.short_name.clone(),
        category: commitment.category,
        target_date: commitment.target_date,
        target_value: commitment.target_value.clone(),
        responsible_agency: commitment.responsible_agency.clone(),
        status: commitment.status,
        created_at: commitment.created_at,
        last_updated: commitment.last_updated,
        source: RecordSource {
            document_id: commitment.source.document_id.clone(),
            term: commitment.source.term,
            session_period: commitment.source.session_period,
            ey_number: commitment.source.ey_number.clone(),
            url: commitment.source.url.clone(),
        },
    };
    let front = toml::to_string(&header).context("serializing record header")?;

    let mut out = String::new();
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(&front);
    if !front.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(FENCE);
    out.push_str("\n\n");

    out.push_str(&format!("# {}\n\n", commitment.title.replace('\n', " ")));
    out.push_str(EXCERPT_HEADING);
    out.push_str("\n\n");
    push_quoted(&mut out, &commitment.text);
    out.push('\n');
    out.push_str(LOG_HEADING);
    out.push('\n');

    for record in commitment.tracking_history.entries() {
        out.push_str(&format!(
            "\n### {} [{}]\n",
            record.date.format("%Y-%m-%d"),
            record.record_type.label()
        ));
        if let Some(ref source) = record.source_ref {
            out.push_str(SOURCE_PREFIX);
            out.push_str(source);
            out.push('\n');
        }
        if let Some(status) = record.new_status {
            out.push_str(STATUS_PREFIX);
            out.push_str(status.as_str());
            out.push('\n');
        }
        out.push('\n');
        push_quoted(&mut out, &record.summary);
    }

    Ok(out)
}

/// Byte length of the rendered record. Dedup keeps the largest.
pub fn stored_size(commitment: &Commitment) -> Result<usize> {
    render(commitment)
        .map(|s| s.len())
        .with_context(|| format!("rendering record {}", commitment.id))
}

fn parse_entry_heading(line: &str) -> Result<(NaiveDate, RecordType)> {
    let rest = line
        .strip_prefix("### ")
        .ok_or_else(|| anyhow!("expected log entry heading, got {:?}", line))?;
    let (date, label) = rest
        .split_once(' ')
        .ok_or_else(|| anyhow!("malformed log entry heading: {:?}", line))?;
    let label = label
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| anyhow!("malformed record type in {:?}", line))?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("bad date in {:?}", line))?;
    let record_type =
        RecordType::parse(label).ok_or_else(|| anyhow!("unknown record type: {}", label))?;
    Ok((date, record_type))
}

/// Parse a record produced by [`render`].
pub fn parse(input: &str) -> Result<Commitment> {
    let rest = input
        .strip_prefix("+++\n")
        .ok_or_else(|| anyhow!("record does not start with a +++ header"))?;
    let end = rest
        .find("\n+++\n")
        .ok_or_else(|| anyhow!("unterminated +++ header"))?;
    let header: RecordHeader =
        toml::from_str(&rest[..end]).context("parsing record header")?;
    let body = &rest[end + "\n+++\n".len()..];

    let mut lines = body.split('\n').peekable();

    // Skip to the excerpt.
    for line in lines.by_ref() {
        if line == EXCERPT_HEADING {
            break;
        }
    }
    if lines.next_if(|l| l.is_empty()).is_none() {
        bail!("missing excerpt section");
    }
    let mut excerpt = Vec::new();
    while let Some(line) = lines.next_if(|l| unquote(l).is_some()) {
        excerpt.extend(unquote(line));
    }

    lines.next_if(|l| l.is_empty());
    match lines.next() {
        Some(LOG_HEADING) => {}
        other => bail!("expected {:?}, got {:?}", LOG_HEADING, other),
    }

    let mut records = Vec::new();
    loop {
        while lines.next_if(|l| l.is_empty()).is_some() {}
        let Some(heading) = lines.next() else { break };
        let (date, record_type) = parse_entry_heading(heading)?;

        let mut source_ref = None;
        let mut new_status = None;
        while let Some(line) = lines.next_if(|l| l.starts_with("- ")) {
            if let Some(src) = line.strip_prefix(SOURCE_PREFIX) {
                source_ref = Some(src.to_string());
            } else if let Some(st) = line.strip_prefix(STATUS_PREFIX) {
                new_status = Some(
                    CommitmentStatus::parse(st).ok_or_else(|| anyhow!("unknown status: {}", st))?,
                );
            } else {
                bail!("unexpected log entry line: {:?}", line);
            }
        }
        if lines.next_if(|l| l.is_empty()).is_none() {
            bail!("log entry {:?} has no summary", heading);
        }
        let mut summary = Vec::new();
        while let Some(line) = lines.next_if(|l| unquote(l).is_some()) {
            summary.extend(unquote(line));
        }

        records.push(TrackingRecord {
            date,
            record_type,
            summary: summary.join("\n"),
            source_ref,
            new_status,
        });
    }

    Ok(Commitment {
        id: header.id,
        title: header.title,
        short_name: header.short_name,
        category: header.category,
        text: excerpt.join("\n"),
        target_date: header.target_date,
        target_value: header.target_value,
        responsible_agency: header.responsible_agency,
        status: header.status,
        source: SourceRef {
            document_id: header.source.document_id,
            term: header.source.term,
            session_period: header.source.session_period,
            ey_number: header.source.ey_number,
            url: header.source.url,
        },
        created_at: header.created_at,
        last_updated: header.last_updated,
        tracking_history: TrackingLog::from(records),
    })
}

/// Where a commitment's record lives under `dir`:
/// `<dir>/<category slug>/<short_name>-<first 8 chars of id>.md`.
pub fn record_path(dir: &Path, commitment: &Commitment) -> PathBuf {
    let id8: String = commitment.id.chars().take(8).collect();
    dir.join(commitment.category.slug())
        .join(format!("{}-{}.md", commitment.short_name, id8))
}

/// Write every commitment's record under `dir`. Returns the paths written.
pub fn write_records(dir: &Path, commitments: &[Commitment]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(commitments.len());
    for commitment in commitments {
        let path = record_path(dir, commitment);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&path, render(commitment)?)
            .with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Commitment {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let mut log = TrackingLog::new();
        log.append(TrackingRecord {
            date: t0.date_naive(),
            record_type: RecordType::Initial,
            summary: "自文件 d1 擷取建立".to_string(),
            source_ref: Some("d1".to_string()),
            new_status: Some(CommitmentStatus::Tracking),
        });
        let mut c = Commitment {
            id: "0f5e2c1a-aaaa-bbbb-cccc-000000000000".to_string(),
            title: "再生能源占比提升至20%".to_string(),
            short_name: "再生能源占比".to_string(),
            category: Category::Environment,
            text: "政府承諾於2026年\n\n將再生能源占比提升至20%\n### 不是標題".to_string(),
            target_date: NaiveDate::from_ymd_opt(2026, 12, 31),
            target_value: Some("20%".to_string()),
            responsible_agency: None,
            status: CommitmentStatus::Tracking,
            source: SourceRef {
                document_id: Some("d1".to_string()),
                term: Some(11),
                session_period: None,
                ey_number: None,
                url: Some("https://example.gov.tw/d1".to_string()),
            },
            created_at: t0,
            last_updated: t0,
            tracking_history: log,
        };
        let t1 = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        c.record_progress("- 來源：看起來像結構\n第二行", None, t1);
        c
    }

    #[test]
    fn parse_inverts_render() {
        let c = sample();
        let text = render(&c).unwrap();
        assert!(text.starts_with("+++\n"));
        assert!(text.contains("### 2025-03-04 [初始建立]"));
        assert!(text.contains("### 2025-09-01 [進度更新]"));
        assert_eq!(parse(&text).unwrap(), c);
    }

    #[test]
    fn empty_text_and_log_survive() {
        let mut c = sample();
        c.text = String::new();
        c.tracking_history = TrackingLog::new();
        assert_eq!(parse(&render(&c).unwrap()).unwrap(), c);
    }

    #[test]
    fn stored_size_is_the_rendered_length() {
        let c = sample();
        assert_eq!(stored_size(&c).unwrap(), render(&c).unwrap().len());
    }

    #[test]
    fn stored_size_grows_with_history() {
        let mut c = sample();
        let before = stored_size(&c).unwrap();
        c.record_progress("預算已編列", Some("d2".to_string()), c.last_updated);
        assert!(stored_size(&c).unwrap() > before);
    }

    #[test]
    fn record_path_uses_category_and_short_id() {
        let c = sample();
        let path = record_path(Path::new("/records"), &c);
        assert_eq!(
            path,
            PathBuf::from("/records/environment/再生能源占比-0f5e2c1a.md")
        );
    }

    #[test]
    fn rejects_missing_header() {
        assert!(parse("# just markdown\n").is_err());
    }
}
