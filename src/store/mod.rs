//! Commitment repository.
//!
//! The [`Store`] trait is the only way callers read or mutate commitments;
//! serialization stays behind it. Two backends:
//! - [`sqlite::SqliteStore`]: durable store used by the CLI.
//! - [`memory::InMemoryStore`]: for tests and dry runs.
//!
//! `put` is all-or-nothing: the header fields and the tracking log are
//! written together. Tracking logs are append-only; a `put` that would
//! drop or rewrite existing entries is refused.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Category, Commitment, CommitmentStatus, TrackingRecord};

/// Selection criteria for [`Store::list`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CommitmentFilter {
    pub statuses: Option<Vec<CommitmentStatus>>,
    pub category: Option<Category>,
    pub document_id: Option<String>,
}

impl CommitmentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Every commitment an automated transition may still change.
    pub fn open() -> Self {
        Self {
            statuses: Some(vec![
                CommitmentStatus::Tracking,
                CommitmentStatus::Delayed,
                CommitmentStatus::Stale,
            ]),
            ..Self::default()
        }
    }

    pub fn matches(&self, commitment: &Commitment) -> bool {
        if let Some(ref statuses) = self.statuses {
            if !statuses.contains(&commitment.status) {
                return false;
            }
        }
        if let Some(category) = self.category {
            if commitment.category != category {
                return false;
            }
        }
        if let Some(ref doc) = self.document_id {
            if commitment.source.document_id.as_deref() != Some(doc.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Abstract storage backend for commitments.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](Store::get) | Fetch one commitment with its full log |
/// | [`put`](Store::put) | Insert or update header + append new log entries |
/// | [`list`](Store::list) | Commitments matching a filter, oldest first |
/// | [`delete`](Store::delete) | Remove a commitment and its log |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Commitment>>;

    async fn put(&self, commitment: &Commitment) -> Result<()>;

    /// Matching commitments ordered by `created_at`, then insertion order.
    async fn list(&self, filter: &CommitmentFilter) -> Result<Vec<Commitment>>;

    /// Returns whether anything was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Refuse a write whose log does not extend the stored one.
pub(crate) fn check_append_only(
    id: &str,
    stored: &[TrackingRecord],
    incoming: &[TrackingRecord],
) -> Result<()> {
    if incoming.len() < stored.len() || incoming[..stored.len()] != *stored {
        anyhow::bail!(
            "tracking history of {} is append-only: {} stored entries, write would rewrite them",
            id,
            stored.len()
        );
    }
    Ok(())
}
