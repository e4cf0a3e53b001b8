//! Dedup engine: keeps one canonical commitment per real-world pledge.
//!
//! Two phases run over existing and incoming commitments together:
//!
//! 1. **Exact title**: commitments with identical titles collapse to the
//!    earliest `created_at` (ties go to whichever was seen first, existing
//!    before incoming).
//! 2. **Fuzzy, per source document**: commitments sharing a
//!    `source.document_id` are linked when their titles are similar by
//!    sequence ratio or bigram Jaccard. Connected components collapse to
//!    the member with the largest rendered record. A commitment without a
//!    document id is its own component.
//!
//! Running either entry point twice in a row changes nothing the second time.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, info};

use crate::config::DedupConfig;
use crate::models::Commitment;
use crate::record;
use crate::similarity::{SimilarityThresholds, UnionFind};
use crate::store::{CommitmentFilter, Store};

impl From<&DedupConfig> for SimilarityThresholds {
    fn from(config: &DedupConfig) -> Self {
        Self {
            ratio: config.ratio_threshold,
            jaccard: config.jaccard_threshold,
        }
    }
}

/// Result of [`canonicalize`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CanonicalizeOutcome {
    /// Incoming commitments that survived, in input order.
    pub to_add: Vec<Commitment>,
    /// Ids of existing commitments that lost to another commitment.
    pub delete_existing: Vec<String>,
    /// Incoming commitments that lost, in input order.
    pub rejected: Vec<Commitment>,
}

struct Entry<'a> {
    commitment: &'a Commitment,
    existing: bool,
    size: usize,
}

/// Decide which commitments survive when `incoming` joins `existing`.
///
/// Pure: nothing is read from or written to a store.
pub fn canonicalize(
    existing: &[Commitment],
    incoming: &[Commitment],
    thresholds: &SimilarityThresholds,
) -> Result<CanonicalizeOutcome> {
    let mut entries: Vec<Entry> = Vec::with_capacity(existing.len() + incoming.len());
    let tagged = existing
        .iter()
        .map(|c| (c, true))
        .chain(incoming.iter().map(|c| (c, false)));
    for (commitment, is_existing) in tagged {
        entries.push(Entry {
            commitment,
            existing: is_existing,
            size: record::stored_size(commitment)?,
        });
    }
    let mut alive = vec![true; entries.len()];

    // Phase A: exact title.
    let mut by_title: HashMap<&str, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        match by_title.get(entry.commitment.title.as_str()).copied() {
            None => {
                by_title.insert(&entry.commitment.title, i);
            }
            Some(keeper) => {
                if entry.commitment.created_at < entries[keeper].commitment.created_at {
                    alive[keeper] = false;
                    by_title.insert(&entry.commitment.title, i);
                } else {
                    alive[i] = false;
                }
                debug!(title = %entry.commitment.title, "exact title collision");
            }
        }
    }

    // Phase B: fuzzy clusters within one source document.
    let mut by_document: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        if !alive[i] {
            continue;
        }
        if let Some(doc) = entry.commitment.source.document_id.as_deref() {
            by_document.entry(doc).or_default().push(i);
        }
    }

    for members in by_document.values() {
        if members.len() < 2 {
            continue;
        }
        let mut uf = UnionFind::new(members.len());
        for a in 0..members.len() {
            for b in (a + 1)..members.len() {
                let ta = &entries[members[a]].commitment.title;
                let tb = &entries[members[b]].commitment.title;
                if thresholds.similar(ta, tb) {
                    uf.union(a, b);
                }
            }
        }
        for group in uf.groups() {
            if group.len() < 2 {
                continue;
            }
            // Largest record wins; first seen on ties.
            let mut keeper = members[group[0]];
            for &local in &group[1..] {
                let idx = members[local];
                if entries[idx].size > entries[keeper].size {
                    keeper = idx;
                }
            }
            for &local in &group {
                let idx = members[local];
                if idx != keeper {
                    alive[idx] = false;
                }
            }
            debug!(
                keeper = %entries[keeper].commitment.id,
                size = group.len(),
                "fuzzy cluster collapsed"
            );
        }
    }

    let mut outcome = CanonicalizeOutcome::default();
    for (i, entry) in entries.iter().enumerate() {
        match (entry.existing, alive[i]) {
            (true, true) => {}
            (true, false) => outcome.delete_existing.push(entry.commitment.id.clone()),
            (false, true) => outcome.to_add.push(entry.commitment.clone()),
            (false, false) => outcome.rejected.push(entry.commitment.clone()),
        }
    }
    Ok(outcome)
}

/// Merge `incoming` into the store: persist survivors, delete losers.
pub async fn merge_into(
    store: &dyn Store,
    incoming: &[Commitment],
    thresholds: &SimilarityThresholds,
) -> Result<CanonicalizeOutcome> {
    let existing = store.list(&CommitmentFilter::all()).await?;
    let outcome = canonicalize(&existing, incoming, thresholds)?;

    for commitment in &outcome.to_add {
        store.put(commitment).await?;
    }
    for id in &outcome.delete_existing {
        store.delete(id).await?;
    }

    debug!(
        added = outcome.to_add.len(),
        rejected = outcome.rejected.len(),
        deleted = outcome.delete_existing.len(),
        "merged candidates"
    );
    Ok(outcome)
}

/// Re-run both phases over the whole store and delete the losers.
///
/// Returns the deleted ids.
pub async fn compact(store: &dyn Store, thresholds: &SimilarityThresholds) -> Result<Vec<String>> {
    let existing = store.list(&CommitmentFilter::all()).await?;
    let outcome = canonicalize(&existing, &[], thresholds)?;

    for id in &outcome.delete_existing {
        store.delete(id).await?;
    }
    info!(
        scanned = existing.len(),
        deleted = outcome.delete_existing.len(),
        "compaction complete"
    );
    Ok(outcome.delete_existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::commitment_id;
    use crate::models::{Category, CommitmentStatus, SourceRef, TrackingLog};
    use crate::store::memory::InMemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap()
    }

    fn commitment(title: &str, text: &str, doc: Option<&str>, at: DateTime<Utc>) -> Commitment {
        Commitment {
            id: commitment_id(title, text),
            title: title.to_string(),
            short_name: title.chars().take(10).collect(),
            category: Category::Environment,
            text: text.to_string(),
            target_date: None,
            target_value: None,
            responsible_agency: None,
            status: CommitmentStatus::Tracking,
            source: SourceRef {
                document_id: doc.map(str::to_string),
                ..SourceRef::default()
            },
            created_at: at,
            last_updated: at,
            tracking_history: TrackingLog::new(),
        }
    }

    #[test]
    fn exact_title_keeps_earliest() {
        let old = commitment("推動長照2.0", "舊", Some("d1"), t(1));
        let new = commitment("推動長照2.0", "新", Some("d2"), t(5));
        let out =
            canonicalize(&[old.clone()], &[new.clone()], &SimilarityThresholds::default()).unwrap();
        assert!(out.to_add.is_empty());
        assert_eq!(out.rejected, vec![new]);
        assert!(out.delete_existing.is_empty());
    }

    #[test]
    fn exact_title_newer_existing_loses_to_older_incoming() {
        let existing = commitment("推動長照2.0", "後來的", Some("d1"), t(9));
        let incoming = commitment("推動長照2.0", "較早的", Some("d2"), t(2));
        let out = canonicalize(
            &[existing.clone()],
            &[incoming.clone()],
            &SimilarityThresholds::default(),
        )
        .unwrap();
        assert_eq!(out.delete_existing, vec![existing.id]);
        assert_eq!(out.to_add, vec![incoming]);
    }

    #[test]
    fn fuzzy_cluster_keeps_largest_record() {
        let a = commitment("再生能源占比提升至20%", "短", Some("D"), t(1));
        let b = commitment(
            "再生能源發電占比提升至20%",
            "較長的原文摘錄，包含更多內容與細節說明",
            Some("D"),
            t(1),
        );
        let c = commitment("推動長照2.0", "長照", Some("D"), t(1));

        let out = canonicalize(
            &[],
            &[a.clone(), b.clone(), c.clone()],
            &SimilarityThresholds::default(),
        )
        .unwrap();
        assert_eq!(out.to_add, vec![b, c]);
        assert_eq!(out.rejected, vec![a]);
    }

    #[test]
    fn similarity_is_transitive_within_a_document() {
        let a = commitment("提高基本工資", "a", Some("D"), t(1));
        let b = commitment("基本工資審議", "b", Some("D"), t(1));
        let c = commitment(
            "工資審議委員會法制化",
            "最長的一段原文摘錄，確保這一筆的紀錄最大",
            Some("D"),
            t(1),
        );
        let th = SimilarityThresholds::default();
        assert!(!th.similar(&a.title, &c.title));

        let out = canonicalize(&[], &[a, b, c.clone()], &th).unwrap();
        assert_eq!(out.to_add, vec![c]);
        assert_eq!(out.rejected.len(), 2);
    }

    #[test]
    fn different_documents_do_not_cluster() {
        let a = commitment("再生能源占比提升至20%", "a", Some("D1"), t(1));
        let b = commitment("再生能源發電占比提升至20%", "b", Some("D2"), t(1));
        let out = canonicalize(&[], &[a, b], &SimilarityThresholds::default()).unwrap();
        assert_eq!(out.to_add.len(), 2);
    }

    #[test]
    fn missing_document_id_is_a_singleton() {
        let a = commitment("再生能源占比提升至20%", "a", None, t(1));
        let b = commitment("再生能源發電占比提升至20%", "b", None, t(1));
        let out = canonicalize(&[], &[a, b], &SimilarityThresholds::default()).unwrap();
        assert_eq!(out.to_add.len(), 2);
        assert!(out.rejected.is_empty());
    }

    #[tokio::test]
    async fn compact_is_idempotent() {
        let store = InMemoryStore::with_commitments(vec![
            commitment("再生能源占比提升至20%", "短", Some("D"), t(1)),
            commitment("再生能源發電占比提升至20%", "比較長的摘錄內容", Some("D"), t(1) + Duration::hours(1)),
            commitment("推動長照2.0", "長照", Some("D"), t(2)),
        ]);
        let th = SimilarityThresholds::default();

        let first = compact(&store, &th).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(store.len(), 2);

        let second = compact(&store, &th).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn merge_into_persists_survivors_only() {
        let store = InMemoryStore::new();
        let th = SimilarityThresholds::default();
        let a = commitment("推動長照2.0", "x", Some("D"), t(1));
        let dup = commitment("推動長照2.0", "y", Some("D"), t(3));

        let out = merge_into(&store, &[a.clone(), dup], &th).await.unwrap();
        assert_eq!(out.to_add, vec![a.clone()]);
        assert_eq!(store.len(), 1);

        // Re-running the same candidates adds nothing.
        let again = merge_into(&store, &[a.clone()], &th).await.unwrap();
        assert!(again.to_add.is_empty());
        assert_eq!(store.len(), 1);
    }
}
