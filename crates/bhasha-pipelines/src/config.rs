//! Workspace configuration loaded from `.bhasha/config.toml`.
//!
//! Every section is optional; missing keys fall back to their defaults.
//!
//! ```toml
//! [cache]
//! cache_duration_secs = 1800
//! max_cache_size = 2
//!
//! [backend]
//! kind = "http"
//! base_url = "http://localhost:8080"
//!
//! [pipelines.translation]
//! candidates = [{ name = "Xenova/m2m100_418M", src_lang = "en", tgt_lang = "ne" }]
//! candidate_timeout_secs = 120
//!
//! [fallback]
//! dictionary_path = "words.toml"
//! ```

use crate::cache::{CacheConfig, CacheConfigError};
use crate::dictionary::DictionaryError;
use crate::candidate::{AllowList, Candidate, default_candidates};
use crate::factory::{CandidateFactory, DEFAULT_CANDIDATE_TIMEOUT};
use crate::loader::{HttpLoader, MockLoader, PipelineLoader};
use bhasha_abstraction::Task;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// The cache could not be built from the `[cache]` section.
    #[error("Invalid cache configuration: {0}")]
    Cache(#[from] CacheConfigError),

    /// The configured word list could not be loaded.
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
}

/// Which pipeline backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process mock pipelines.
    Mock,
    /// A Hugging Face Inference-compatible server.
    #[default]
    Http,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mock => write!(f, "mock"),
            Self::Http => write!(f, "http"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::Validation(format!("Unknown backend: {}", other))),
        }
    }
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Server base URL for the `http` backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token; `HF_TOKEN` is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

fn default_base_url() -> String {
    "https://api-inference.huggingface.co".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { kind: BackendKind::default(), base_url: default_base_url(), api_token: None }
    }
}

impl BackendConfig {
    /// Builds the loader this section describes.
    #[must_use]
    pub fn loader(&self) -> Arc<dyn PipelineLoader> {
        match self.kind {
            BackendKind::Mock => Arc::new(MockLoader::new()),
            BackendKind::Http => {
                let loader = HttpLoader::from_env(self.base_url.clone());
                match self.api_token {
                    Some(ref token) => Arc::new(loader.with_api_key(token.clone())),
                    None => Arc::new(loader),
                }
            }
        }
    }
}

/// `[pipelines.<name>]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Candidates tried in order; the built-in list is used when empty.
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    /// Case-insensitive name patterns. `None` uses the built-in list for the
    /// task; an empty list allows every candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_patterns: Option<Vec<String>>,

    /// Seconds a single candidate may take to load.
    #[serde(default = "default_candidate_timeout_secs")]
    pub candidate_timeout_secs: u64,

    /// Seconds the whole cascade may take; the cache default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_timeout_secs: Option<u64>,
}

fn default_candidate_timeout_secs() -> u64 {
    DEFAULT_CANDIDATE_TIMEOUT.as_secs()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            allow_patterns: None,
            candidate_timeout_secs: default_candidate_timeout_secs(),
            load_timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    fn allow_list(&self, task: Task) -> Result<AllowList, ConfigError> {
        match self.allow_patterns {
            Some(ref patterns) => AllowList::new(patterns)
                .map_err(|e| ConfigError::Validation(format!("Invalid allow pattern: {}", e))),
            None => Ok(AllowList::for_task(task)),
        }
    }

    fn validate(&self, name: &str, task: Task) -> Result<(), ConfigError> {
        if self.candidate_timeout_secs == 0 {
            return Err(ConfigError::Validation(format!(
                "pipelines.{}.candidate_timeout_secs must be greater than 0",
                name
            )));
        }
        if self.load_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(format!(
                "pipelines.{}.load_timeout_secs must be greater than 0",
                name
            )));
        }
        if self.candidates.iter().any(|c| c.name.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "pipelines.{} has a candidate without a name",
                name
            )));
        }
        self.allow_list(task).map(|_| ())
    }

    /// Builds the candidate factory for `task`.
    pub fn factory(
        &self,
        task: Task,
        loader: Arc<dyn PipelineLoader>,
    ) -> Result<CandidateFactory, ConfigError> {
        let candidates =
            if self.candidates.is_empty() { default_candidates(task) } else { self.candidates.clone() };

        let mut factory = CandidateFactory::new(task, loader)
            .with_candidates(candidates)
            .with_allow_list(self.allow_list(task)?)
            .with_candidate_timeout(Duration::from_secs(self.candidate_timeout_secs));
        if let Some(secs) = self.load_timeout_secs {
            factory = factory.with_load_timeout(Duration::from_secs(secs));
        }
        Ok(factory)
    }
}

/// `[pipelines]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelinesConfig {
    #[serde(default)]
    pub translation: PipelineConfig,

    /// Sentiment pipeline used for text checks.
    #[serde(default)]
    pub grammar: PipelineConfig,
}

/// `[service]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Seconds a single pipeline invocation may take (default: 30).
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,

    /// Whether a failed call clears cached failures so the next call retries.
    #[serde(default = "default_clear_errors_on_failure")]
    pub clear_errors_on_failure: bool,
}

fn default_invocation_timeout_secs() -> u64 {
    30
}

fn default_clear_errors_on_failure() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_secs: default_invocation_timeout_secs(),
            clear_errors_on_failure: default_clear_errors_on_failure(),
        }
    }
}

impl ServiceConfig {
    /// Invocation timeout as a `Duration`.
    #[must_use]
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }
}

/// `[fallback]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackConfig {
    /// Word list replacing the built-in dictionary. Relative paths resolve
    /// against the workspace root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary_path: Option<PathBuf>,
}

/// Complete workspace configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BhashaConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub pipelines: PipelinesConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl BhashaConfig {
    /// Parses configuration from TOML text and validates it.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;

        if self.backend.kind == BackendKind::Http && self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("backend.base_url must not be empty".to_string()));
        }

        self.pipelines.translation.validate("translation", Task::Translation)?;
        self.pipelines.grammar.validate("grammar", Task::SentimentAnalysis)?;

        if self.service.invocation_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "service.invocation_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolves the dictionary path against `workspace_root`.
    #[must_use]
    pub fn dictionary_path(&self, workspace_root: &Path) -> Option<PathBuf> {
        self.fallback.dictionary_path.as_ref().map(|path| {
            if path.is_absolute() { path.clone() } else { workspace_root.join(path) }
        })
    }
}

/// Load configuration from the workspace config file.
///
/// Searches for `.bhasha/config.toml` in the workspace root and returns the
/// defaults when it does not exist.
///
/// # Errors
/// Returns error if config file exists but cannot be read, parsed or validated.
pub fn load_config(workspace_root: &Path) -> Result<BhashaConfig, ConfigError> {
    let config_path = default_config_path(workspace_root);

    if !config_path.exists() {
        return Ok(BhashaConfig::default());
    }

    let content = std::fs::read_to_string(&config_path)?;
    BhashaConfig::from_toml_str(&content)
}

/// Get the default config file path for a workspace.
#[must_use]
pub fn default_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".bhasha").join("config.toml")
}
