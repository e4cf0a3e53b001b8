//! Sliding-window document segmenter.
//!
//! Splits an over-long document into overlapping [`Chunk`]s so that
//! `subject + chunk text` always fits the oracle's input budget. Lengths
//! are counted in characters, not bytes: the documents are mostly CJK.
//!
//! A document whose subject and content together fit in `chunk_size` is
//! a single implicit chunk (`chunk_index = None`). Otherwise the content
//! is walked with a window of `effective_size` characters advancing by
//! `effective_size - overlap`, so consecutive chunks share `overlap`
//! characters and no commitment is severed at a boundary.

use std::path::Path;

use crate::config::Config;
use crate::documents::load_file;
use crate::error::{PipelineError, PipelineResult};
use crate::identity::{chunk_id, content_hash};
use crate::models::Chunk;

/// Characters reserved per chunk for the separator and position marker.
pub const SEPARATOR_OVERHEAD: usize = 50;

/// Window size left for content once the subject and separators are paid for.
pub fn effective_size(subject: &str, chunk_size: usize) -> PipelineResult<usize> {
    let reserved = subject.chars().count() + SEPARATOR_OVERHEAD;
    match chunk_size.checked_sub(reserved) {
        Some(size) if size > 0 => Ok(size),
        _ => Err(PipelineError::Unsegmentable(format!(
            "chunk_size {} leaves no room for content after a {}-character subject",
            chunk_size,
            subject.chars().count()
        ))),
    }
}

/// Split `content` into ordered chunks for the document `base_document_id`.
///
/// Not restartable mid-stream: a failure on any chunk means starting over
/// from chunk 0.
pub fn segment(
    base_document_id: &str,
    subject: &str,
    content: &str,
    chunk_size: usize,
    overlap: usize,
) -> PipelineResult<Vec<Chunk>> {
    let content_len = content.chars().count();
    if subject.chars().count() + content_len <= chunk_size {
        return Ok(vec![Chunk {
            id: chunk_id(base_document_id, None),
            base_document_id: base_document_id.to_string(),
            chunk_index: None,
            total_chunks: 1,
            text: content.to_string(),
        }]);
    }

    let window = effective_size(subject, chunk_size)?;
    if overlap >= window {
        return Err(PipelineError::Unsegmentable(format!(
            "overlap {} must be smaller than the effective chunk size {}",
            overlap, window
        )));
    }
    let step = window - overlap;

    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();

    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window).min(content_len);
        pieces.push(&content[bounds[start]..bounds[end]]);
        if end >= content_len {
            break;
        }
        start += step;
    }

    let total = pieces.len();
    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            id: chunk_id(base_document_id, Some(i)),
            base_document_id: base_document_id.to_string(),
            chunk_index: Some(i),
            total_chunks: total,
            text: text.to_string(),
        })
        .collect())
}

impl Chunk {
    /// Text handed to the oracle: subject, position marker, chunk body.
    pub fn prompt_text(&self, subject: &str) -> String {
        match self.chunk_index {
            None => format!("{}\n\n{}", subject, self.text),
            Some(i) => format!(
                "{}\n（第 {}/{} 段）\n{}",
                subject,
                i + 1,
                self.total_chunks,
                self.text
            ),
        }
    }
}

/// `pledge segment`: print the chunk boundaries of every document in a file.
pub fn run_segment(config: &Config, path: &Path) -> anyhow::Result<()> {
    for doc in load_file(path)? {
        let chunks = segment(
            &doc.id,
            &doc.subject,
            &doc.content,
            config.segmenter.chunk_size,
            config.segmenter.overlap,
        )?;
        println!("document {}", doc.id);
        println!("  subject: {}", doc.subject);
        println!("  content chars: {}", doc.content.chars().count());
        println!("  chunks: {}", chunks.len());
        for chunk in &chunks {
            let position = match chunk.chunk_index {
                Some(i) => format!("{}/{}", i + 1, chunk.total_chunks),
                None => "single".to_string(),
            };
            let hash = content_hash(&chunk.text);
            println!(
                "  [{}] {}  {} chars  sha256:{}",
                position,
                chunk.id,
                chunk.text.chars().count(),
                &hash[..12]
            );
        }
    }
    println!("ok");
    Ok(())
}
