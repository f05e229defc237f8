use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_UPLOAD_BASE: &str = "data";
const DEFAULT_INDEX_BASE: &str = "vector_index";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_RETRIEVER_K: usize = 5;
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document portal.
///
/// Loaded once at process start and handed to the components that need it; nothing in the
/// library reads the environment on its own.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory that receives per-session upload folders.
    pub upload_base_dir: PathBuf,
    /// Base directory that holds vector index directories.
    pub index_base_dir: PathBuf,
    /// Default chunk length in characters.
    pub chunk_size: usize,
    /// Default number of characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Default number of neighbours returned per query.
    pub retriever_k: usize,
    /// Whether each session gets its own index directory by default.
    pub use_session_dirs: bool,
    /// Accept `.md` uploads in addition to pdf/docx/txt.
    pub allow_markdown: bool,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Maximum number of texts sent to the provider per request.
    pub embedding_batch_size: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Deterministic offline token-hashing embeddings.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset so that `KEY=` in a `.env` file falls back to the
    /// default instead of failing to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            upload_base_dir: get("UPLOAD_BASE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_BASE)),
            index_base_dir: get("INDEX_BASE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_BASE)),
            chunk_size: parse_or(&get, "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: parse_or(&get, "CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            retriever_k: parse_or(&get, "RETRIEVER_K", DEFAULT_RETRIEVER_K)?,
            use_session_dirs: parse_bool_or(&get, "USE_SESSION_DIRS", true)?,
            allow_markdown: parse_bool_or(&get, "ALLOW_MARKDOWN", false)?,
            embedding_provider: parse_or(&get, "EMBEDDING_PROVIDER", EmbeddingProvider::Hashing)?,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_or(
                &get,
                "EMBEDDING_DIMENSION",
                DEFAULT_EMBEDDING_DIMENSION,
            )?,
            embedding_batch_size: parse_or(
                &get,
                "EMBEDDING_BATCH_SIZE",
                DEFAULT_EMBEDDING_BATCH_SIZE,
            )?,
            ollama_url: get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            server_port: get("SERVER_PORT")
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".into()));
        }
        if self.retriever_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVER_K".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => {
            parse_flag(&value).ok_or_else(|| ConfigError::InvalidValue(key.to_string()))
        }
        None => Ok(default),
    }
}

/// Interpret common textual boolean spellings (`1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`).
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Load `.env`, read the environment and log the resulting configuration.
pub fn load() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        upload_base = %config.upload_base_dir.display(),
        index_base = %config.index_base_dir.display(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        use_session_dirs = config.use_session_dirs,
        embedding_provider = ?config.embedding_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = Config::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.retriever_k, 5);
        assert!(config.use_session_dirs);
        assert!(!config.allow_markdown);
        assert_eq!(config.embedding_provider, EmbeddingProvider::Hashing);
        assert_eq!(config.upload_base_dir, PathBuf::from("data"));
        assert_eq!(config.index_base_dir, PathBuf::from("vector_index"));
        assert_eq!(config.server_port, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("CHUNK_SIZE", "500"),
            ("CHUNK_OVERLAP", "50"),
            ("USE_SESSION_DIRS", "false"),
            ("ALLOW_MARKDOWN", "yes"),
            ("EMBEDDING_PROVIDER", "Ollama"),
            ("SERVER_PORT", "4242"),
            ("INDEX_BASE", "/srv/index"),
        ]))
        .expect("valid overrides");
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert!(!config.use_session_dirs);
        assert!(config.allow_markdown);
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(config.server_port, Some(4242));
        assert_eq!(config.index_base_dir, PathBuf::from("/srv/index"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[("CHUNK_SIZE", "   ")])).expect("valid");
        assert_eq!(config.chunk_size, 1000);
    }

    #[test]
    fn overlap_not_smaller_than_chunk_size_is_rejected() {
        let error = Config::from_lookup(lookup(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]))
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "CHUNK_OVERLAP"));
    }

    #[test]
    fn unparsable_values_name_the_variable() {
        let error = Config::from_lookup(lookup(&[("RETRIEVER_K", "many")])).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "RETRIEVER_K"));

        let error = Config::from_lookup(lookup(&[("EMBEDDING_PROVIDER", "magic")])).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "EMBEDDING_PROVIDER"));
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
