//! Persisted configuration (input/output directories, chunking knobs,
//! embedding provider) and its startup validation.
//!
//! Loading is tolerant: a missing or unparseable default config yields
//! defaults. Validation at the start of a build is strict: a missing input
//! directory or remote credential is fatal before any partial work happens.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::chunker::{ChunkingOptions, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_CHARS, DEFAULT_OVERLAP};
use crate::remote::{DEFAULT_BATCH_DELAY_MS, DEFAULT_BATCH_SIZE, DEFAULT_ITEM_DELAY_MS};
use crate::retriever::DEFAULT_TOP_K;
use crate::vocab::DEFAULT_MAX_TERMS;

const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the source documents.
    pub input_dir: Option<String>,
    /// Directory the corpus files are written to. Defaults to `corpus/`
    /// under the app data directory.
    pub output_dir: Option<String>,
    /// Fixed list of source file names under `input_dir`. Empty means
    /// discover every `.md`/`.txt` file.
    pub sources: Vec<String>,
    pub chunking: ChunkingConfig,
    pub vocabulary: VocabularyConfig,
    pub retrieval: RetrievalConfig,
    pub provider: ProviderKind,
    pub remote: RemoteConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkingOptions {
        ChunkingOptions {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            min_chars: self.min_chars,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    pub max_terms: usize,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            max_terms: DEFAULT_MAX_TERMS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K }
    }
}

/// Which encoder produces the stored vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    pub model: String,
    /// Environment variable the API key is read from.
    pub api_key_env: String,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub item_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            item_delay_ms: DEFAULT_ITEM_DELAY_MS,
            timeout_secs: 30,
        }
    }
}

/// Load config from the app data directory. Returns default config if
/// missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    let path = data_dir.join(CONFIG_FILENAME);
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_default()
}

/// Load config from an explicit path. Unlike [`load_config`], a missing or
/// malformed file here is an error: the operator asked for this file.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&s).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    let path = data_dir.join(CONFIG_FILENAME);
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(&path, s).map_err(ConfigError::Write)
}

/// Settings a build run actually needs, validated once at startup.
#[derive(Debug)]
pub struct BuildSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sources: Vec<String>,
    pub chunking: ChunkingOptions,
    pub max_terms: usize,
    /// Present exactly when the remote provider was requested.
    pub remote: Option<RemoteSettings>,
}

/// Remote endpoint settings with the credential already resolved.
#[derive(Debug)]
pub struct RemoteSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub batch_size: usize,
    pub batch_delay: std::time::Duration,
    pub item_delay: std::time::Duration,
    pub timeout: std::time::Duration,
}

impl Config {
    /// Where the corpus files live, for both the build and the query side.
    pub fn corpus_dir(&self) -> Result<PathBuf, ConfigError> {
        match self.output_dir.as_deref().filter(|s| !s.is_empty()) {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => app_data::app_data_dir()
                .map(|d| d.join("corpus"))
                .ok_or(ConfigError::NoDataDir),
        }
    }

    /// Validates everything a build needs. Fails before any partial work:
    /// missing input directory and missing remote credential are setup
    /// errors, the only class that exits non-zero.
    pub fn build_settings(&self, provider: ProviderKind) -> Result<BuildSettings, ConfigError> {
        let input = self
            .input_dir
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingInputDir)?;
        let input_dir = PathBuf::from(input);
        if !input_dir.is_dir() {
            return Err(ConfigError::InputDirNotFound(input_dir));
        }

        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(ConfigError::InvalidChunking {
                chunk_size: self.chunking.chunk_size,
                overlap: self.chunking.overlap,
            });
        }

        let remote = match provider {
            ProviderKind::Local => None,
            ProviderKind::Remote => {
                let api_key = std::env::var(&self.remote.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingCredential(self.remote.api_key_env.clone()))?;
                Some(RemoteSettings {
                    base_url: self.remote.base_url.clone(),
                    model: self.remote.model.clone(),
                    api_key,
                    batch_size: self.remote.batch_size,
                    batch_delay: std::time::Duration::from_millis(self.remote.batch_delay_ms),
                    item_delay: std::time::Duration::from_millis(self.remote.item_delay_ms),
                    timeout: std::time::Duration::from_secs(self.remote.timeout_secs),
                })
            }
        };

        Ok(BuildSettings {
            input_dir,
            output_dir: self.corpus_dir()?,
            sources: self.sources.clone(),
            chunking: self.chunking.options(),
            max_terms: self.vocabulary.max_terms,
            remote,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("no input directory configured")]
    MissingInputDir,
    #[error("input directory not found: {0}")]
    InputDirNotFound(PathBuf),
    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidChunking { chunk_size: usize, overlap: usize },
    #[error("required credential is missing: set the {0} environment variable")]
    MissingCredential(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.vocabulary.max_terms, DEFAULT_MAX_TERMS);
        assert_eq!(config.provider, ProviderKind::Local);
        assert_eq!(config.remote.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn parses_a_partial_config() {
        let config: Config = toml::from_str(
            r#"
            input_dir = "/srv/docs"
            sources = ["about.md", "faq.txt"]

            [chunking]
            chunk_size = 400

            [remote]
            model = "my-embedder"
            "#,
        )
        .unwrap();
        assert_eq!(config.input_dir.as_deref(), Some("/srv/docs"));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.chunking.chunk_size, 400);
        // Untouched knobs keep their defaults.
        assert_eq!(config.chunking.overlap, DEFAULT_OVERLAP);
        assert_eq!(config.remote.model, "my-embedder");
    }

    #[test]
    fn missing_input_dir_is_a_setup_error() {
        let config = Config::default();
        assert!(matches!(
            config.build_settings(ProviderKind::Local),
            Err(ConfigError::MissingInputDir)
        ));
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.input_dir = Some(dir.path().to_string_lossy().into_owned());
        config.chunking.overlap = config.chunking.chunk_size;
        assert!(matches!(
            config.build_settings(ProviderKind::Local),
            Err(ConfigError::InvalidChunking { .. })
        ));
    }

    #[test]
    fn remote_provider_requires_a_credential() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.input_dir = Some(dir.path().to_string_lossy().into_owned());
        config.remote.api_key_env = "MNEME_TEST_KEY_THAT_IS_NOT_SET".to_string();
        assert!(matches!(
            config.build_settings(ProviderKind::Remote),
            Err(ConfigError::MissingCredential(_))
        ));

        std::env::set_var("MNEME_TEST_KEY_THAT_IS_SET", "sk-test");
        config.remote.api_key_env = "MNEME_TEST_KEY_THAT_IS_SET".to_string();
        let settings = config.build_settings(ProviderKind::Remote).unwrap();
        assert_eq!(settings.remote.unwrap().api_key, "sk-test");
    }
}
