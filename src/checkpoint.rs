//! Resumable progress for long-running backfills.
//!
//! A checkpoint is an append-only set of document ids that finished
//! processing under a named run. [`FileCheckpoint`] persists it as one id
//! per line in `<checkpoint_dir>/<run>.txt`; each `mark_done` appends and
//! flushes a line, so a crash loses at most the document in flight.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};

/// Done-set for one named run.
pub trait Checkpoint: Send + Sync {
    fn is_done(&self, document_id: &str) -> bool;

    /// Record `document_id` as finished. Idempotent.
    fn mark_done(&self, document_id: &str) -> Result<()>;

    /// Number of documents recorded.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Newline-delimited file checkpoint.
pub struct FileCheckpoint {
    path: PathBuf,
    done: Mutex<HashSet<String>>,
}

fn validate_run_name(run: &str) -> Result<()> {
    if run.is_empty()
        || !run
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        || run.starts_with('.')
    {
        bail!(
            "invalid run name {:?}: use letters, digits, '-', '_' or '.'",
            run
        );
    }
    Ok(())
}

impl FileCheckpoint {
    /// Open (or create) the checkpoint for `run` under `dir`.
    pub fn open(dir: &Path, run: &str) -> Result<Self> {
        validate_run_name(run)?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating checkpoint dir {}", dir.display()))?;
        let path = dir.join(format!("{}.txt", run));

        let mut done = HashSet::new();
        if path.exists() {
            let file = File::open(&path)
                .with_context(|| format!("reading checkpoint {}", path.display()))?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                let id = line.trim();
                if !id.is_empty() {
                    done.insert(id.to_string());
                }
            }
        }

        Ok(Self {
            path,
            done: Mutex::new(done),
        })
    }

    /// Forget everything recorded for `run`.
    pub fn reset(dir: &Path, run: &str) -> Result<()> {
        validate_run_name(run)?;
        let path = dir.join(format!("{}.txt", run));
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing checkpoint {}", path.display()))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Checkpoint for FileCheckpoint {
    fn is_done(&self, document_id: &str) -> bool {
        self.done
            .lock()
            .map(|d| d.contains(document_id))
            .unwrap_or(false)
    }

    fn mark_done(&self, document_id: &str) -> Result<()> {
        let mut done = match self.done.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if done.contains(document_id) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening checkpoint {}", self.path.display()))?;
        writeln!(file, "{}", document_id)?;
        file.sync_data()?;

        done.insert(document_id.to_string());
        Ok(())
    }

    fn len(&self) -> usize {
        self.done.lock().map(|d| d.len()).unwrap_or(0)
    }
}

/// Checkpoint that lives only as long as the process.
#[derive(Default)]
pub struct MemoryCheckpoint {
    done: Mutex<HashSet<String>>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checkpoint for MemoryCheckpoint {
    fn is_done(&self, document_id: &str) -> bool {
        self.done
            .lock()
            .map(|d| d.contains(document_id))
            .unwrap_or(false)
    }

    fn mark_done(&self, document_id: &str) -> Result<()> {
        if let Ok(mut done) = self.done.lock() {
            done.insert(document_id.to_string());
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.done.lock().map(|d| d.len()).unwrap_or(0)
    }
}
