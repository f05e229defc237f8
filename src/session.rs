//! Session identifiers and the directories they scope.
//!
//! A session id looks like `session_20250916_154533_a1b2c3d4`: a prefix, the UTC creation time
//! at second granularity, and eight hex characters of randomness. Ids double as directory
//! names, so caller-supplied ids go through [`SessionId::parse`] before touching the disk.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

/// Prefix used when the caller does not supply one.
pub const DEFAULT_SESSION_PREFIX: &str = "session";

const MAX_SESSION_ID_LEN: usize = 128;
const SUFFIX_LEN: usize = 8;

/// Reasons a caller-supplied session id is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The id was empty or whitespace.
    #[error("session id must not be empty")]
    Empty,
    /// The id exceeded the maximum length.
    #[error("session id must be at most 128 bytes")]
    TooLong,
    /// The id contained a character outside `[A-Za-z0-9_-]`.
    #[error("session id contains unsupported character {0:?}")]
    InvalidCharacter(char),
}

/// Opaque, practically-unique identifier for one ingestion session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh id from the current UTC time and a random suffix.
    ///
    /// Characters of `prefix` that are not valid in an id are dropped; an empty result falls
    /// back to [`DEFAULT_SESSION_PREFIX`].
    pub fn generate(prefix: Option<&str>) -> Self {
        let prefix: String = prefix
            .unwrap_or(DEFAULT_SESSION_PREFIX)
            .chars()
            .filter(|c| is_allowed(*c))
            .take(MAX_SESSION_ID_LEN - 32)
            .collect();
        let prefix = if prefix.is_empty() {
            DEFAULT_SESSION_PREFIX.to_string()
        } else {
            prefix
        };

        let format = format_description!("[year][month][day]_[hour][minute][second]");
        let timestamp = OffsetDateTime::now_utc()
            .format(&format)
            .unwrap_or_else(|_| "19700101_000000".to_string());

        let mut suffix = Uuid::new_v4().simple().to_string();
        suffix.truncate(SUFFIX_LEN);

        Self(format!("{prefix}_{timestamp}_{suffix}"))
    }

    /// Validate a caller-supplied id.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SessionError::Empty);
        }
        if trimmed.len() > MAX_SESSION_ID_LEN {
            return Err(SessionError::TooLong);
        }
        if let Some(bad) = trimmed.chars().find(|c| !is_allowed(*c)) {
            return Err(SessionError::InvalidCharacter(bad));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Use the supplied id when present, otherwise generate one.
    pub fn parse_or_generate(raw: Option<&str>) -> Result<Self, SessionError> {
        match raw.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => Self::parse(value),
            None => Ok(Self::generate(None)),
        }
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Directory owned by `session` under `base`, or `base` itself when sessions share it.
pub fn resolve_dir(base: &Path, session: &SessionId, use_session_dirs: bool) -> PathBuf {
    if use_session_dirs {
        base.join(session.as_str())
    } else {
        base.to_path_buf()
    }
}

/// Delete all but the newest `keep_latest` session directories directly under `base`.
///
/// Directories are ordered by name, which sorts generated ids by creation time. Plain files
/// (for example a shared index living in `base`) are never touched. Returns the removed paths.
pub fn prune_sessions(base: &Path, keep_latest: usize) -> io::Result<Vec<PathBuf>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut sessions: Vec<PathBuf> = std::fs::read_dir(base)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    sessions.sort();
    sessions.reverse();

    let mut removed = Vec::new();
    for folder in sessions.into_iter().skip(keep_latest) {
        match std::fs::remove_dir_all(&folder) {
            Ok(()) => {
                tracing::info!(path = %folder.display(), "Old session folder deleted");
                removed.push(folder);
            }
            Err(error) => {
                tracing::warn!(path = %folder.display(), %error, "Failed to delete session folder");
            }
        }
    }
    Ok(removed)
}
