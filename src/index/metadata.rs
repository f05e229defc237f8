//! Ledger of fingerprints already added to an index.

use super::{IndexError, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

/// File name of the ledger inside an index directory.
pub const METADATA_FILE_NAME: &str = "ingested_meta.json";

/// Persisted set of fingerprints, serialized as `{"rows": {"<fingerprint>": true}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    #[serde(default)]
    rows: BTreeMap<String, bool>,
}

impl IndexMetadata {
    /// Load the ledger at `path`. A missing file yields an empty ledger; an unreadable or
    /// corrupt one is logged and also treated as empty.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Unreadable index metadata; starting empty");
                return Self::default();
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(metadata) => metadata,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "Corrupt index metadata; starting empty");
                Self::default()
            }
        }
    }

    /// Whether `fingerprint` is recorded.
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.rows.contains_key(fingerprint)
    }

    /// Record `fingerprint`.
    pub fn mark(&mut self, fingerprint: impl Into<String>) {
        self.rows.insert(fingerprint.into(), true);
    }

    /// Number of recorded fingerprints.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Persist as pretty JSON via temp file and rename.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        write_json_atomic(path, self)
    }
}
