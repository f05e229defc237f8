//! Extracted documents and the chunks cut from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::index::fingerprint;

/// Free-form key/value metadata carried by documents and chunks.
pub type Metadata = Map<String, Value>;

/// Text extracted from one stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Extracted plain text.
    pub text: String,
    /// Provenance of the text.
    pub metadata: Metadata,
}

impl Document {
    /// Build a document from text and metadata.
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// A bounded slice of a document's text; the unit of embedding and indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Metadata inherited unchanged from the source document.
    pub metadata: Metadata,
}

impl Chunk {
    /// Build a chunk from text and metadata.
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Identity used to decide whether this chunk is already indexed.
    pub fn fingerprint(&self) -> String {
        fingerprint::fingerprint(&self.text, &self.metadata)
    }
}
