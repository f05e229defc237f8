//! Exact cosine-similarity index persisted as two JSON files.

use super::{IndexEntry, IndexError, SearchHit, VectorIndex, read_json, write_json_atomic};
use crate::document::Metadata;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Vector file name inside an index directory.
pub const VECTORS_FILE_NAME: &str = "index.json";
/// Chunk text and metadata file name inside an index directory.
pub const DOCSTORE_FILE_NAME: &str = "docstore.json";

/// Brute-force index over an in-memory list of vectors.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

#[derive(Serialize, Deserialize)]
struct VectorsFile {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

#[derive(Serialize, Deserialize)]
struct DocstoreFile {
    entries: Vec<DocstoreEntry>,
}

#[derive(Serialize, Deserialize)]
struct DocstoreEntry {
    fingerprint: String,
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

impl FlatIndex {
    fn check_dimensions(dimension: usize, entries: &[IndexEntry]) -> Result<(), IndexError> {
        match entries
            .iter()
            .find(|entry| entry.vector.len() != dimension)
        {
            Some(entry) => Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: entry.vector.len(),
            }),
            None => Ok(()),
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

impl VectorIndex for FlatIndex {
    fn exists(dir: &Path) -> bool {
        dir.join(VECTORS_FILE_NAME).is_file() && dir.join(DOCSTORE_FILE_NAME).is_file()
    }

    fn from_entries(dimension: usize, entries: Vec<IndexEntry>) -> Result<Self, IndexError> {
        Self::check_dimensions(dimension, &entries)?;
        Ok(Self { dimension, entries })
    }

    fn load_local(dir: &Path) -> Result<Self, IndexError> {
        let vectors: VectorsFile = read_json(&dir.join(VECTORS_FILE_NAME))?;
        let docstore: DocstoreFile = read_json(&dir.join(DOCSTORE_FILE_NAME))?;

        if vectors.vectors.len() != docstore.entries.len() {
            return Err(IndexError::Inconsistent {
                path: dir.to_path_buf(),
                vectors: vectors.vectors.len(),
                entries: docstore.entries.len(),
            });
        }

        let entries: Vec<IndexEntry> = docstore
            .entries
            .into_iter()
            .zip(vectors.vectors)
            .map(|(doc, vector)| IndexEntry {
                fingerprint: doc.fingerprint,
                text: doc.text,
                metadata: doc.metadata,
                vector,
            })
            .collect();

        Self::from_entries(vectors.dimension, entries)
    }

    fn add(&mut self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        Self::check_dimensions(self.dimension, &entries)?;
        self.entries.extend(entries);
        Ok(())
    }

    fn save_local(&self, dir: &Path) -> Result<(), IndexError> {
        std::fs::create_dir_all(dir).map_err(|source| IndexError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let docstore = DocstoreFile {
            entries: self
                .entries
                .iter()
                .map(|entry| DocstoreEntry {
                    fingerprint: entry.fingerprint.clone(),
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                })
                .collect(),
        };
        let vectors = VectorsFile {
            dimension: self.dimension,
            vectors: self
                .entries
                .iter()
                .map(|entry| entry.vector.clone())
                .collect(),
        };

        // Two renames; readers hold the directory read lock so they never see a mixed pair.
        write_json_atomic(&dir.join(DOCSTORE_FILE_NAME), &docstore)?;
        write_json_atomic(&dir.join(VECTORS_FILE_NAME), &vectors)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine(query, &entry.vector), entry))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| SearchHit {
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(name: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            fingerprint: format!("fp-{name}"),
            text: name.to_string(),
            metadata: json!({ "name": name }).as_object().cloned().expect("object"),
            vector,
        }
    }

    fn sample() -> FlatIndex {
        FlatIndex::from_entries(
            2,
            vec![
                entry("east", vec![1.0, 0.0]),
                entry("north", vec![0.0, 1.0]),
                entry("northeast", vec![1.0, 1.0]),
            ],
        )
        .expect("index")
    }

    #[test]
    fn search_ranks_by_cosine_and_truncates() {
        let hits = sample().search(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "east");
        assert_eq!(hits[1].text, "northeast");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        assert_eq!(sample().search(&[0.0, 1.0], 10).len(), 3);
    }

    #[test]
    fn persist_and_reload_preserves_entries() {
        let dir = TempDir::new().expect("tempdir");
        let index = sample();
        assert!(!FlatIndex::exists(dir.path()));
        index.save_local(dir.path()).expect("save");
        assert!(FlatIndex::exists(dir.path()));

        let loaded = FlatIndex::load_local(dir.path()).expect("load");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimension(), 2);
        assert_eq!(loaded.entries, index.entries);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let mut index = sample();
        let error = index.add(vec![entry("bad", vec![1.0, 2.0, 3.0])]).unwrap_err();
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn truncated_docstore_is_inconsistent() {
        let dir = TempDir::new().expect("tempdir");
        sample().save_local(dir.path()).expect("save");
        std::fs::write(
            dir.path().join(DOCSTORE_FILE_NAME),
            r#"{"entries": []}"#,
        )
        .expect("overwrite");
        assert!(matches!(
            FlatIndex::load_local(dir.path()),
            Err(IndexError::Inconsistent { vectors: 3, entries: 0, .. })
        ));
    }
}
