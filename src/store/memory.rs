//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Keeps commitments in insertion order behind a `std::sync::RwLock`.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::{check_append_only, CommitmentFilter, Store};
use crate::models::Commitment;

pub struct InMemoryStore {
    items: RwLock<Vec<Commitment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }

    /// Seed a store with commitments, in order.
    pub fn with_commitments(commitments: Vec<Commitment>) -> Self {
        Self {
            items: RwLock::new(commitments),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Commitment>> {
        let items = self.items.read().unwrap();
        Ok(items.iter().find(|c| c.id == id).cloned())
    }

    async fn put(&self, commitment: &Commitment) -> Result<()> {
        let mut items = self.items.write().unwrap();
        match items.iter_mut().find(|c| c.id == commitment.id) {
            Some(existing) => {
                check_append_only(
                    &commitment.id,
                    existing.tracking_history.entries(),
                    commitment.tracking_history.entries(),
                )?;
                *existing = commitment.clone();
            }
            None => items.push(commitment.clone()),
        }
        Ok(())
    }

    async fn list(&self, filter: &CommitmentFilter) -> Result<Vec<Commitment>> {
        let items = self.items.read().unwrap();
        let mut out: Vec<Commitment> = items.iter().filter(|c| filter.matches(c)).cloned().collect();
        // Stable sort keeps insertion order among equal timestamps.
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut items = self.items.write().unwrap();
        let before = items.len();
        items.retain(|c| c.id != id);
        Ok(items.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Category, CommitmentStatus, RecordType, SourceRef, TrackingLog, TrackingRecord,
    };
    use chrono::{TimeZone, Utc};

    fn commitment(id: &str, day: u32) -> Commitment {
        let at = Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap();
        let mut log = TrackingLog::new();
        log.append(TrackingRecord {
            date: at.date_naive(),
            record_type: RecordType::Initial,
            summary: "建立".to_string(),
            source_ref: None,
            new_status: Some(CommitmentStatus::Tracking),
        });
        Commitment {
            id: id.to_string(),
            title: format!("承諾 {}", id),
            short_name: id.to_string(),
            category: Category::Other,
            text: "內容".to_string(),
            target_date: None,
            target_value: None,
            responsible_agency: None,
            status: CommitmentStatus::Tracking,
            source: SourceRef::default(),
            created_at: at,
            last_updated: at,
            tracking_history: log,
        }
    }

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemoryStore::new();
        store.put(&commitment("a", 2)).await.unwrap();
        assert!(store.get("a").await.unwrap().is_some());
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_orders_by_created_at() {
        let store = InMemoryStore::new();
        store.put(&commitment("late", 9)).await.unwrap();
        store.put(&commitment("early", 1)).await.unwrap();
        let ids: Vec<String> = store
            .list(&CommitmentFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn rewriting_history_is_refused() {
        let store = InMemoryStore::new();
        let mut c = commitment("a", 1);
        c.record_progress("進度", None, c.created_at);
        store.put(&c).await.unwrap();

        let truncated = commitment("a", 1);
        assert!(store.put(&truncated).await.is_err());
        assert_eq!(store.get("a").await.unwrap().unwrap(), c);
    }

    #[tokio::test]
    async fn open_filter_skips_fulfilled() {
        let store = InMemoryStore::new();
        let mut done = commitment("done", 1);
        done.transition(CommitmentStatus::Fulfilled, "達成", None, done.created_at);
        store.put(&done).await.unwrap();
        store.put(&commitment("open", 2)).await.unwrap();

        let open = store.list(&CommitmentFilter::open()).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "open");
    }
}
