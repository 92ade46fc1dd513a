//! Application configuration: TOML file + `PERSON_SEARCH_*` environment overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::Metric;

/// Config file looked up in the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "person-search.toml";

const ENV_PREFIX: &str = "PERSON_SEARCH_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub people: PathBuf,
    pub embeddings: PathBuf,
    pub index_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            people: PathBuf::from("people_with_index.json"),
            embeddings: PathBuf::from("embeddings.json"),
            index_dir: PathBuf::from("person_index"),
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/embed".to_string(),
            retries: 3,
            retry_delay_ms: 1_000,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_n: usize,
    /// Unset: queries score with the metric recorded in the store, builds use dot product.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    pub default_query: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_n: 30,
            metric: None,
            default_query: "lawyer".to_string(),
        }
    }
}

impl SearchConfig {
    /// Query metric: `flag`, else the configured metric, else `None` (store default).
    pub fn query_metric(&self, flag: Option<Metric>) -> Option<Metric> {
        flag.or(self.metric)
    }

    /// Metric recorded in a new store: `flag`, else the configured metric, else dot product.
    pub fn build_metric(&self, flag: Option<Metric>) -> Metric {
        flag.or(self.metric).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Optional log file; stderr only when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Load configuration from `path` (or [`DEFAULT_CONFIG_FILE`] if present), then
/// apply `.env` and process environment overrides.
///
/// An explicit path that does not exist is an error; a missing default file is not.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut cfg = match path {
        Some(p) => read_config_file(p)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                read_config_file(default)?
            } else {
                AppConfig::default()
            }
        }
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

pub fn read_config_file(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))
}

/// Apply `PERSON_SEARCH_*` overrides using `lookup` as the environment.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(v) = var("PEOPLE") {
        cfg.paths.people = PathBuf::from(v);
    }
    if let Some(v) = var("EMBEDDINGS") {
        cfg.paths.embeddings = PathBuf::from(v);
    }
    if let Some(v) = var("INDEX_DIR") {
        cfg.paths.index_dir = PathBuf::from(v);
    }
    if let Some(v) = var("OUTPUT_DIR") {
        cfg.paths.output_dir = PathBuf::from(v);
    }
    if let Some(v) = var("ENDPOINT") {
        cfg.embedding.endpoint = v;
    }
    if let Some(v) = var("RETRIES") {
        cfg.embedding.retries = v
            .parse()
            .with_context(|| format!("{ENV_PREFIX}RETRIES must be an integer, got '{v}'"))?;
    }
    if let Some(v) = var("TOP_N") {
        cfg.search.top_n = v
            .parse()
            .with_context(|| format!("{ENV_PREFIX}TOP_N must be an integer, got '{v}'"))?;
    }
    if let Some(v) = var("METRIC") {
        cfg.search.metric = Some(v.parse()?);
    }
    if let Some(v) = var("LOG_LEVEL") {
        cfg.logging.level = v;
    }
    Ok(())
}
