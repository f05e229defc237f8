//! Persist uploaded byte streams into session-scoped directories.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Extensions accepted by default.
pub const BASE_EXTENSIONS: [&str; 3] = ["pdf", "docx", "txt"];
/// Extension accepted when markdown uploads are enabled.
pub const MARKDOWN_EXTENSION: &str = "md";

const STORED_NAME_LEN: usize = 8;
const MAX_NAME_ATTEMPTS: usize = 8;

/// Errors raised while writing uploads to disk.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// The target directory could not be created.
    #[error("failed to create upload directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Writing an upload failed (disk full, permission denied, ...).
    #[error("failed to write upload {path}: {source}")]
    Io {
        /// Destination path of the failed write.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
}

/// One uploaded file as received from the caller.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name declared by the client; only the extension is trusted.
    pub name: String,
    /// Raw file content.
    pub content: Bytes,
}

impl UploadedFile {
    /// Wrap a declared name and its content.
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A file written by [`FileStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Location on disk, named `<8 hex chars>.<extension>`.
    pub path: PathBuf,
    /// Name the client declared for the upload.
    pub original_name: String,
    /// Lower-cased extension without the dot.
    pub extension: String,
}

/// Result of [`FileStore::save`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedUploads {
    /// Files written, in input order.
    pub files: Vec<StoredFile>,
    /// Declared names of uploads dropped for an unsupported extension.
    pub skipped: Vec<String>,
}

/// Writes uploads to disk under collision-free names, dropping unsupported formats.
#[derive(Debug, Clone)]
pub struct FileStore {
    supported: BTreeSet<String>,
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStore {
    /// Store accepting pdf, docx and txt.
    pub fn new() -> Self {
        Self {
            supported: BASE_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }

    /// Toggle acceptance of markdown uploads.
    pub fn with_markdown(mut self, allow: bool) -> Self {
        if allow {
            self.supported.insert(MARKDOWN_EXTENSION.to_string());
        } else {
            self.supported.remove(MARKDOWN_EXTENSION);
        }
        self
    }

    /// Whether uploads with `extension` are kept.
    pub fn supports(&self, extension: &str) -> bool {
        self.supported.contains(&extension.to_lowercase())
    }

    /// Write every supported upload into `target_dir`, preserving input order.
    ///
    /// Unsupported uploads are logged and skipped. The declared file name is discarded; the
    /// stored name is random so two uploads called `report.pdf` never clash and a name like
    /// `../../x.pdf` cannot escape the directory.
    pub async fn save(
        &self,
        files: Vec<UploadedFile>,
        target_dir: &Path,
    ) -> Result<SavedUploads, FileStoreError> {
        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|source| FileStoreError::CreateDir {
                path: target_dir.to_path_buf(),
                source,
            })?;

        let mut saved = SavedUploads::default();
        for upload in files {
            let Some(extension) = extension_of(&upload.name).filter(|ext| self.supports(ext))
            else {
                tracing::warn!(filename = %upload.name, "Unsupported file skipped");
                saved.skipped.push(upload.name);
                continue;
            };

            let path = write_new_file(target_dir, &extension, &upload.content).await?;
            tracing::info!(
                uploaded = %upload.name,
                saved_as = %path.display(),
                bytes = upload.content.len(),
                "File saved for ingestion"
            );
            saved.files.push(StoredFile {
                path,
                original_name: upload.name,
                extension,
            });
        }

        Ok(saved)
    }
}

/// Lower-cased extension of a declared file name, if any.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn random_file_name(extension: &str) -> String {
    let mut stem = Uuid::new_v4().simple().to_string();
    stem.truncate(STORED_NAME_LEN);
    format!("{stem}.{extension}")
}

async fn write_new_file(
    dir: &Path,
    extension: &str,
    content: &[u8],
) -> Result<PathBuf, FileStoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let path = dir.join(random_file_name(extension));
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        let mut file = match opened {
            Ok(file) => file,
            Err(error)
                if error.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS =>
            {
                tracing::debug!(path = %path.display(), "Stored name already taken; retrying");
                continue;
            }
            Err(source) => return Err(FileStoreError::Io { path, source }),
        };

        let written = async {
            file.write_all(content).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        return match written {
            Ok(()) => Ok(path),
            Err(source) => Err(FileStoreError::Io { path, source }),
        };
    }
}
