//! Run configuration, loaded once per cycle and immutable afterwards.
//!
//! The file is YAML with three required sections (`search`, `weights`,
//! `output`). Schema problems surface as [`ConfigError::InvalidConfiguration`]
//! before any API call is made.

pub mod weights;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::merge::RemovedPolicy;

pub use weights::{DecayCurve, DecayMode, RecencyDecay, WeightConfig};

pub const REQUIRED_TOP_LEVEL_KEYS: [&str; 3] = ["search", "weights", "output"];

/// Largest page the search API serves.
pub const MAX_PER_PAGE: u32 = 100;

/// The search API never returns more than this many results per query.
pub const SEARCH_RESULT_CEILING: u32 = 1000;

pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratorConfig {
    #[serde(default)]
    pub dry_run: bool,
    pub search: SearchConfig,
    pub weights: WeightConfig,
    /// Ordered category definitions. When absent the legacy
    /// `output.categories` + `category_keywords` pair is used.
    #[serde(default)]
    pub categories: Option<Vec<CategoryDefinition>>,
    #[serde(default)]
    pub category_keywords: Option<BTreeMap<String, Vec<String>>>,
    pub output: OutputConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Cap on unique repositories per cycle.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_max_quota_wait_secs")]
    pub max_quota_wait_secs: u64,
    /// Fetch open PR and contributor counts per repository.
    #[serde(default)]
    pub enrich: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            query: String::new(),
            topics: Vec::new(),
            languages: Vec::new(),
            per_page: default_per_page(),
            max_results: default_max_results(),
            limit: None,
            parallelism: default_parallelism(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            max_quota_wait_secs: default_max_quota_wait_secs(),
            enrich: false,
        }
    }
}

impl SearchConfig {
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn max_quota_wait(&self) -> Duration {
        Duration::from_secs(self.max_quota_wait_secs)
    }
}

fn default_per_page() -> u32 {
    MAX_PER_PAGE
}

fn default_max_results() -> u32 {
    SEARCH_RESULT_CEILING
}

fn default_parallelism() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_max_quota_wait_secs() -> u64 {
    3600
}

/// A category and the rule inputs that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub name: String,
    /// Phrases matched word-bounded in name, description and topics.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Topics matched exactly.
    #[serde(default)]
    pub topics: Vec<String>,
}

impl CategoryDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        CategoryDefinition {
            name: name.into(),
            keywords: Vec::new(),
            topics: Vec::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Dated output path; `{date}` expands to `YYYY-MM-DD`.
    pub file: String,
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_uncategorized")]
    pub uncategorized: Option<String>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub removed: RemovedPolicy,
    #[serde(default = "default_true")]
    pub builtin_keywords: bool,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub category_keywords: BTreeMap<String, Vec<String>>,
}

fn default_title() -> String {
    "Curated Repositories".to_string()
}

fn default_uncategorized() -> Option<String> {
    Some("Uncategorized".to_string())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// On-disk response cache carried between runs.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl CuratorConfig {
    /// Read, inject `GITHUB_TOKEN`, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml_str(&content)?
            .with_token(std::env::var(TOKEN_ENV_VAR).ok());

        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse and validate without touching the environment.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(content)?;

        let missing: Vec<&str> = REQUIRED_TOP_LEVEL_KEYS
            .iter()
            .copied()
            .filter(|key| raw.get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "missing required top-level keys: {missing:?}"
            )));
        }

        let config: CuratorConfig = serde_yaml::from_value(raw)
            .map_err(|e| ConfigError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.auth.token = Some(token);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidConfiguration(msg));

        if self.output.file.trim().is_empty() {
            return invalid("'output.file' must be provided".to_string());
        }
        if let Err(msg) = self.weights.validate() {
            return invalid(msg);
        }
        if let Some(min) = self.output.min_score {
            if !min.is_finite() {
                return invalid("output.min_score must be finite".to_string());
            }
        }

        let search = &self.search;
        if search.query.trim().is_empty() && search.topics.iter().all(|t| t.trim().is_empty()) {
            return invalid("search needs a query or at least one topic".to_string());
        }
        if !(1..=MAX_PER_PAGE).contains(&search.per_page) {
            return invalid(format!("search.per_page must be within 1..={MAX_PER_PAGE}"));
        }
        if search.max_results == 0 {
            return invalid("search.max_results must be positive".to_string());
        }
        if search.parallelism == 0 {
            return invalid("search.parallelism must be at least 1".to_string());
        }
        if search.max_attempts == 0 {
            return invalid("search.max_attempts must be at least 1".to_string());
        }

        let mut seen = BTreeSet::new();
        for def in self.category_definitions() {
            if def.name.trim().is_empty() {
                return invalid("category names must not be empty".to_string());
            }
            if !seen.insert(def.name.to_lowercase()) {
                return invalid(format!("category {:?} declared twice", def.name));
            }
        }
        Ok(())
    }

    /// Category definitions in declaration order, normalizing the legacy
    /// `output.categories` + `category_keywords` shape.
    pub fn category_definitions(&self) -> Vec<CategoryDefinition> {
        if let Some(categories) = &self.categories {
            return categories.clone();
        }

        let keywords = self
            .category_keywords
            .as_ref()
            .unwrap_or(&self.output.category_keywords);

        self.output
            .categories
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(|name| {
                CategoryDefinition::new(name)
                    .with_keywords(keywords.get(name).cloned().unwrap_or_default())
            })
            .collect()
    }
}
