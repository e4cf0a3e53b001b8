//! Commitment retrieval by id.
//!
//! Prints a commitment as its persisted record. Used by `pledge get`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::Commitment;
use crate::record;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

/// Fetch one commitment, accepting either the full id or a unique prefix.
pub async fn get_commitment(store: &dyn Store, id: &str) -> Result<Commitment> {
    if let Some(c) = store.get(id).await? {
        return Ok(c);
    }

    let mut matches: Vec<Commitment> = store
        .list(&Default::default())
        .await?
        .into_iter()
        .filter(|c| c.id.starts_with(id))
        .collect();
    match matches.len() {
        0 => bail!("commitment not found: {}", id),
        1 => Ok(matches.remove(0)),
        n => bail!("id prefix {} is ambiguous ({} matches)", id, n),
    }
}

/// CLI entry point: print the record to stdout.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let result = get_commitment(&store, id).await;
    store.close().await;

    let commitment = result?;
    print!("{}", record::render(&commitment)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CommitmentStatus, SourceRef, TrackingLog};
    use crate::store::memory::InMemoryStore;
    use chrono::{TimeZone, Utc};

    fn c(id: &str) -> Commitment {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Commitment {
            id: id.to_string(),
            title: id.to_string(),
            short_name: id.to_string(),
            category: Category::Other,
            text: String::new(),
            target_date: None,
            target_value: None,
            responsible_agency: None,
            status: CommitmentStatus::Tracking,
            source: SourceRef::default(),
            created_at: at,
            last_updated: at,
            tracking_history: TrackingLog::new(),
        }
    }

    #[tokio::test]
    async fn resolves_full_id_and_unique_prefix() {
        let store = InMemoryStore::with_commitments(vec![c("abc-1"), c("abd-2")]);
        assert_eq!(get_commitment(&store, "abc-1").await.unwrap().id, "abc-1");
        assert_eq!(get_commitment(&store, "abd").await.unwrap().id, "abd-2");
        assert!(get_commitment(&store, "ab").await.is_err());
        assert!(get_commitment(&store, "zzz").await.is_err());
    }
}
