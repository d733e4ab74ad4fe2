//! Runtime configuration
//!
//! Loaded from a TOML file (every section optional), then patched from
//! `RANKER_*` environment variables and validated.
//!
//! ```toml
//! [catalog]
//! url = "surrealkv://.ranker/catalog"
//!
//! [recommendations]
//! url = "surrealkv://.ranker/recommendations"
//!
//! [search]
//! artifacts_dir = ".ranker/index"
//! default_top_k = 3
//!
//! [embedding]
//! provider = "hashing"
//! dimensions = 384
//!
//! [logging]
//! json = false
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use ranker_state::StoreConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::search::{DEFAULT_TOP_K, MAX_TOP_K};

pub const ENV_CATALOG_URL: &str = "RANKER_CATALOG_URL";
pub const ENV_RECOMMEND_URL: &str = "RANKER_RECOMMEND_URL";
pub const ENV_ARTIFACTS_DIR: &str = "RANKER_ARTIFACTS_DIR";
pub const ENV_EMBEDDING_API_KEY: &str = "RANKER_EMBEDDING_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub catalog: StoreSection,
    pub recommendations: StoreSection,
    pub search: SearchSection,
    pub embedding: EmbeddingConfig,
    pub logging: LoggingSection,
}

/// One SurrealDB store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub root: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            url: "mem://".to_string(),
            namespace: "ranker".to_string(),
            database: "main".to_string(),
            username: None,
            password: None,
            root: false,
        }
    }
}

impl StoreSection {
    pub fn store_config(&self) -> StoreConfig {
        let cfg = StoreConfig::new(self.url.clone())
            .with_namespace(self.namespace.clone())
            .with_database(self.database.clone());
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => cfg.with_credentials(user, pass, self.root),
            _ => cfg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub artifacts_dir: PathBuf,
    pub default_top_k: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from(".ranker/index"),
            default_top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Offline feature hashing
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimensions: u32,
    pub api_base: String,
    pub path: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            model: "all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
            api_base: "http://localhost:8080".to_string(),
            path: "/v1/embeddings".to_string(),
            api_key: None,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub json: bool,
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            json: false,
            level: "info".to_string(),
        }
    }
}

impl RankerConfig {
    /// Load `path` (defaults when it does not exist), apply env overrides and
    /// validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::default()
        };

        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Patch fields from environment-style lookups.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_CATALOG_URL) {
            self.catalog.url = url;
        }
        if let Some(url) = lookup(ENV_RECOMMEND_URL) {
            self.recommendations.url = url;
        }
        if let Some(dir) = lookup(ENV_ARTIFACTS_DIR) {
            self.search.artifacts_dir = PathBuf::from(dir);
        }
        if let Some(key) = lookup(ENV_EMBEDDING_API_KEY) {
            self.embedding.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "catalog.url must be non-empty.".to_string(),
            ));
        }
        if self.recommendations.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "recommendations.url must be non-empty.".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Validation(
                "embedding.dimensions must be greater than zero.".to_string(),
            ));
        }
        if !(1..=MAX_TOP_K).contains(&self.search.default_top_k) {
            return Err(ConfigError::Validation(format!(
                "search.default_top_k must be in the range 1-{MAX_TOP_K}."
            )));
        }
        if self.embedding.provider == EmbeddingProvider::Http {
            if self.embedding.api_base.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "embedding.api_base must be non-empty for the http provider.".to_string(),
                ));
            }
            if self.embedding.timeout_ms == 0 {
                return Err(ConfigError::Validation(
                    "embedding.timeout_ms must be greater than zero.".to_string(),
                ));
            }
        }
        Ok(())
    }
}
