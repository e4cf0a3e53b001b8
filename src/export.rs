//! Export commitments as record files and regenerate the index.
//!
//! `pledge export` writes one markdown record per commitment under the
//! records directory. `pledge index` writes the aggregate index JSON, built
//! either from the store or by scanning a directory of exported records.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use crate::config::Config;
use crate::index::{build_index, build_index_with_files, scan_records, write_index};
use crate::record;
use crate::store::sqlite::SqliteStore;
use crate::store::{CommitmentFilter, Store};

/// Write every stored commitment's record under `dir` (default: `[export].records_dir`).
pub async fn run_export(config: &Config, dir: Option<&Path>) -> Result<()> {
    let dir = dir.unwrap_or(&config.export.records_dir);
    let store = SqliteStore::open(config).await?;
    let commitments = store.list(&CommitmentFilter::all()).await?;
    store.close().await;

    let written = record::write_records(dir, &commitments)?;

    println!("export");
    println!("  records written: {}", written.len());
    println!("  directory: {}", dir.display());
    println!("ok");
    Ok(())
}

/// Regenerate the index JSON at `output` (default: `[export].index_path`).
///
/// With `from_records`, the index is rebuilt from record files instead of
/// the store.
pub async fn run_index(
    config: &Config,
    output: Option<&Path>,
    from_records: Option<&Path>,
) -> Result<()> {
    let output = output.unwrap_or(&config.export.index_path);
    let now = Utc::now();

    let index = match from_records {
        Some(dir) => build_index_with_files(&scan_records(dir)?, now),
        None => {
            let store = SqliteStore::open(config).await?;
            let commitments = store.list(&CommitmentFilter::all()).await?;
            store.close().await;
            build_index(&commitments, now)
        }
    };
    write_index(&index, output)?;

    println!("index");
    println!("  commitments: {}", index.total_count);
    println!("  categories: {}", index.categories.len());
    println!("  output: {}", output.display());
    println!("ok");
    Ok(())
}
