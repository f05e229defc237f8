//! Stable identities for indexed chunks.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::document::Metadata;

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Fingerprint of a chunk.
///
/// Rows that declare a `source` are identified by `"{source}::{row_id}"` (with an empty
/// `row_id` when absent), so re-ingesting an updated row keeps its identity. Everything else
/// is identified by the hash of its text.
pub fn fingerprint(text: &str, metadata: &Metadata) -> String {
    match metadata.get("source").and_then(render) {
        Some(source) => {
            let row_id = metadata.get("row_id").and_then(render).unwrap_or_default();
            format!("{source}::{row_id}")
        }
        None => content_hash(text),
    }
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
