//! Store statistics.
//!
//! Summarizes what is being tracked: totals by status and by category, and
//! when anything last changed. Used by `pledge stats`.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::models::{Category, Commitment, CommitmentStatus};
use crate::store::sqlite::SqliteStore;
use crate::store::{CommitmentFilter, Store};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub by_status: BTreeMap<CommitmentStatus, usize>,
    pub by_category: BTreeMap<Category, usize>,
    pub tracking_records: usize,
    pub last_update: Option<DateTime<Utc>>,
}

impl Stats {
    pub fn compute(commitments: &[Commitment]) -> Self {
        let mut stats = Stats {
            total: commitments.len(),
            ..Stats::default()
        };
        for c in commitments {
            *stats.by_status.entry(c.status).or_default() += 1;
            *stats.by_category.entry(c.category).or_default() += 1;
            stats.tracking_records += c.tracking_history.len();
            stats.last_update = Some(match stats.last_update {
                Some(t) => t.max(c.last_updated),
                None => c.last_updated,
            });
        }
        stats
    }
}

/// Run the stats command: read the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let commitments = store.list(&CommitmentFilter::all()).await?;
    let stats = Stats::compute(&commitments);
    store.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Pledge Tracker — Store Stats");
    println!("============================");
    println!();
    println!("  Database:     {}", config.db.path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Commitments:  {}", stats.total);
    println!("  Log entries:  {}", stats.tracking_records);
    println!(
        "  Last update:  {}",
        stats
            .last_update
            .map(|t| format_ts_relative(t.timestamp()))
            .unwrap_or_else(|| "never".to_string())
    );

    println!();
    println!("  By status:");
    for status in CommitmentStatus::ALL {
        println!(
            "  {:<12} {:<8} {:>6}",
            status.as_str(),
            status.label(),
            stats.by_status.get(&status).copied().unwrap_or(0)
        );
    }

    if !stats.by_category.is_empty() {
        println!();
        println!("  By category:");
        for (category, count) in &stats.by_category {
            println!("  {:<16} {:>6}", category.slug(), count);
        }
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceRef, TrackingLog};
    use chrono::TimeZone;

    fn c(status: CommitmentStatus, category: Category, day: u32) -> Commitment {
        let at = Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap();
        Commitment {
            id: format!("c{day}"),
            title: format!("t{day}"),
            short_name: format!("t{day}"),
            category,
            text: String::new(),
            target_date: None,
            target_value: None,
            responsible_agency: None,
            status,
            source: SourceRef::default(),
            created_at: at,
            last_updated: at,
            tracking_history: TrackingLog::new(),
        }
    }

    #[test]
    fn counts_by_status_and_category() {
        let stats = Stats::compute(&[
            c(CommitmentStatus::Tracking, Category::Labor, 1),
            c(CommitmentStatus::Tracking, Category::Health, 5),
            c(CommitmentStatus::Stale, Category::Labor, 3),
        ]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status[&CommitmentStatus::Tracking], 2);
        assert_eq!(stats.by_category[&Category::Labor], 2);
        assert_eq!(
            stats.last_update,
            Some(Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
