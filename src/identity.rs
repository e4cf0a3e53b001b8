//! Content-addressed identifiers.
//!
//! Every id is the first 16 bytes of a SHA-256 digest over a canonical
//! input tuple, printed as a UUID. Fields are joined with the ASCII unit
//! separator so `("ab", "c")` and `("a", "bc")` never collide. No clock,
//! no randomness: the same tuple yields the same id in every process.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const FIELD_SEPARATOR: u8 = 0x1f;

fn hashed_uuid(domain: &str, fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    for field in fields {
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(field.as_bytes());
    }
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Id of a commitment, derived from its title and excerpt.
pub fn commitment_id(title: &str, text: &str) -> String {
    hashed_uuid("commitment", &[title, text])
}

/// Id of a document, derived from its legislative coordinates.
pub fn document_id(
    term: u32,
    session_period: u32,
    meeting_index: u32,
    ey_number: Option<&str>,
    ly_number: Option<&str>,
) -> String {
    hashed_uuid(
        "document",
        &[
            &term.to_string(),
            &session_period.to_string(),
            &meeting_index.to_string(),
            ey_number.unwrap_or(""),
            ly_number.unwrap_or(""),
        ],
    )
}

/// Id of one chunk of a document. `None` is the implicit single chunk.
pub fn chunk_id(base_id: &str, chunk_index: Option<usize>) -> String {
    let index = chunk_index.map(|i| i.to_string()).unwrap_or_default();
    hashed_uuid("chunk", &[base_id, &index])
}

/// SHA-256 hex digest of a text, used for change detection.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
