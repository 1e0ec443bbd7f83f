//! Translation and text checking on top of the resource cache.
//!
//! The service owns no pipelines itself. Each call acquires the pipeline for
//! its key from the shared [`ResourceCache`], runs it under an invocation
//! timeout and turns failures into [`ServiceError`]s a user can act on. When
//! every translation candidate fails, the word-by-word
//! [`FallbackDictionary`] answers instead.

use crate::PipelineHandle;
use crate::cache::{AcquireError, CacheStats, EntrySnapshot, FailureKind, LoadError, ResourceCache};
use crate::candidate::Candidate;
use crate::config::{BhashaConfig, ConfigError};
use crate::dictionary::FallbackDictionary;
use crate::factory::ResourceFactory;
use bhasha_abstraction::{PipelineError, PipelineOptions, PipelineOutput, SentimentScore, Task};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Cache key of the translation pipeline.
pub const TRANSLATION_KEY: &str = "translation";

/// Cache key of the sentiment pipeline used for text checks.
pub const GRAMMAR_KEY: &str = "grammar";

/// Default time budget for running a loaded pipeline once.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Confidence reported when no classifier could score the text.
const UNVERIFIED_CONFIDENCE: f32 = 0.5;

/// Sentiment scores above this are treated as a possible problem.
const FLAG_SCORE_THRESHOLD: f32 = 0.8;

const FALLBACK_NOTE: &str = "Translation models unavailable. Using basic dictionary translation.";

/// User-facing failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Empty or whitespace-only input.
    #[error("Input text is empty")]
    EmptyInput,

    /// The load or the invocation ran out of time.
    #[error(
        "Translation timed out. The model is still loading or the text is too long. Please try again in a few moments."
    )]
    Timeout,

    /// The backend ran out of memory or aborted the load.
    #[error(
        "Translation failed due to memory constraints. Please try with shorter text or try again later."
    )]
    ResourceExhausted,

    /// A recent failure is still cooling down.
    #[error(
        "Translation service is temporarily unavailable. Please wait {}s and try again.",
        .retry_after.as_secs().max(1)
    )]
    TemporarilyUnavailable { retry_after: Duration },

    /// Any other pipeline failure, with its message.
    #[error("Translation failed: {0}")]
    Translation(String),

    /// The service was shut down.
    #[error("Language service has been shut down")]
    ShutDown,
}

/// Outcome of a translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub translation_text: String,
    /// `true` when the dictionary answered instead of a model.
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Model that produced the translation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Verdict of a text check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The classifier found nothing suspicious.
    Correct,
    /// The classifier flagged the text.
    Flagged,
    /// No classifier was available.
    Unverified,
}

/// Result of [`LanguageService::check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCheck {
    pub status: CheckStatus,
    pub original: String,
    /// Label of the top classifier score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl TextCheck {
    fn from_sentiment(text: &str, top: &SentimentScore, model: String) -> Self {
        let flagged = top.label == "NEGATIVE" || top.score > FLAG_SCORE_THRESHOLD;
        Self {
            status: if flagged { CheckStatus::Flagged } else { CheckStatus::Correct },
            original: text.to_string(),
            label: Some(top.label.clone()),
            confidence: top.score,
            model: Some(model),
        }
    }

    fn unverified(text: &str) -> Self {
        Self {
            status: CheckStatus::Unverified,
            original: text.to_string(),
            label: None,
            confidence: UNVERIFIED_CONFIDENCE,
            model: None,
        }
    }
}

/// Why running a pipeline failed.
#[derive(Debug)]
enum RunError {
    Acquire(AcquireError),
    Pipeline(PipelineError),
    Timeout,
    UnexpectedOutput,
}

/// Translation and text checking backed by a shared [`ResourceCache`].
pub struct LanguageService {
    cache: Arc<ResourceCache<PipelineHandle>>,
    translation: Arc<dyn ResourceFactory<PipelineHandle>>,
    grammar: Arc<dyn ResourceFactory<PipelineHandle>>,
    dictionary: FallbackDictionary,
    invocation_timeout: Duration,
    clear_errors_on_failure: bool,
}

impl LanguageService {
    /// Creates a service with the built-in dictionary and default timeouts.
    #[must_use]
    pub fn new(
        cache: Arc<ResourceCache<PipelineHandle>>,
        translation: Arc<dyn ResourceFactory<PipelineHandle>>,
        grammar: Arc<dyn ResourceFactory<PipelineHandle>>,
    ) -> Self {
        Self {
            cache,
            translation,
            grammar,
            dictionary: FallbackDictionary::default(),
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            clear_errors_on_failure: true,
        }
    }

    /// Builds the cache, loader, factories and dictionary described by `config`.
    ///
    /// # Errors
    /// Returns `ConfigError` if a section is invalid or the word list cannot be read.
    pub fn from_config(config: &BhashaConfig, workspace_root: &Path) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = Arc::new(ResourceCache::new(config.cache.clone())?);
        let loader = config.backend.loader();
        let translation = config.pipelines.translation.factory(Task::Translation, Arc::clone(&loader))?;
        let grammar = config.pipelines.grammar.factory(Task::SentimentAnalysis, loader)?;

        let dictionary = match config.dictionary_path(workspace_root) {
            Some(path) => FallbackDictionary::load(&path)?,
            None => FallbackDictionary::default(),
        };

        info!(
            backend = %config.backend.kind,
            dictionary_words = dictionary.len(),
            "Language service configured"
        );

        Ok(Self::new(cache, Arc::new(translation), Arc::new(grammar))
            .with_dictionary(dictionary)
            .with_invocation_timeout(config.service.invocation_timeout())
            .with_clear_errors_on_failure(config.service.clear_errors_on_failure))
    }

    /// Replaces the fallback dictionary.
    #[must_use]
    pub fn with_dictionary(mut self, dictionary: FallbackDictionary) -> Self {
        self.dictionary = dictionary;
        self
    }

    /// Sets the time budget for one pipeline invocation.
    #[must_use]
    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Whether a failed call clears cached failures so the next call retries.
    #[must_use]
    pub fn with_clear_errors_on_failure(mut self, enabled: bool) -> Self {
        self.clear_errors_on_failure = enabled;
        self
    }

    /// The shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResourceCache<PipelineHandle>> {
        &self.cache
    }

    async fn run(
        &self,
        key: &str,
        factory: &Arc<dyn ResourceFactory<PipelineHandle>>,
        text: &str,
        options: Option<&PipelineOptions>,
    ) -> Result<(PipelineOutput, String), RunError> {
        let pipeline = self.cache.acquire(key, Arc::clone(factory)).await.map_err(RunError::Acquire)?;
        let model = pipeline.model_id().to_string();

        match tokio::time::timeout(self.invocation_timeout, pipeline.run(text, options)).await {
            Ok(Ok(output)) => Ok((output, model)),
            Ok(Err(e)) => Err(RunError::Pipeline(e)),
            Err(_) => {
                warn!(key = %key, timeout_secs = self.invocation_timeout.as_secs(), "Pipeline invocation timed out");
                Err(RunError::Timeout)
            }
        }
    }

    fn after_failure(&self) {
        if self.clear_errors_on_failure {
            let cleared = self.cache.clear_errors();
            debug!(cleared, "Cleared error states after failure");
        }
    }

    /// Translates `text`. Languages default to those of the loaded model.
    ///
    /// # Errors
    /// Returns `ServiceError` if no translation can be produced. Exhausting
    /// every candidate is not an error: the dictionary answers instead.
    pub async fn translate(
        &self,
        text: &str,
        src_lang: Option<&str>,
        tgt_lang: Option<&str>,
    ) -> Result<TranslationResult, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyInput);
        }

        info!(chars = text.chars().count(), src_lang = ?src_lang, tgt_lang = ?tgt_lang, "Translating");

        let options = (src_lang.is_some() || tgt_lang.is_some()).then(|| PipelineOptions {
            src_lang: src_lang.map(str::to_string),
            tgt_lang: tgt_lang.map(str::to_string),
        });

        let error = match self.run(TRANSLATION_KEY, &self.translation, text, options.as_ref()).await {
            Ok((output, model)) => match output {
                PipelineOutput::Translation(translation) => {
                    debug!(model = %model, "Translation completed");
                    return Ok(TranslationResult {
                        translation_text: translation.translation_text,
                        fallback_used: false,
                        note: None,
                        model: Some(model),
                    });
                }
                PipelineOutput::Sentiment { .. } => RunError::UnexpectedOutput,
            },
            Err(e) => e,
        };

        warn!(error = ?error, "Translation failed");
        self.after_failure();

        match error {
            RunError::Acquire(AcquireError::Load { source: LoadError::Exhausted { .. }, .. }) => {
                info!("Using fallback dictionary translation");
                Ok(TranslationResult {
                    translation_text: self.dictionary.translate(text),
                    fallback_used: true,
                    note: Some(FALLBACK_NOTE.to_string()),
                    model: None,
                })
            }
            RunError::Acquire(AcquireError::Load { source, .. }) => Err(classify_load_error(&source)),
            RunError::Acquire(AcquireError::Cooldown { retry_after, .. }) => {
                Err(ServiceError::TemporarilyUnavailable { retry_after })
            }
            RunError::Acquire(AcquireError::ShutDown) => Err(ServiceError::ShutDown),
            RunError::Pipeline(e) => Err(classify_message(&e.to_string())),
            RunError::Timeout => Err(ServiceError::Timeout),
            RunError::UnexpectedOutput => {
                Err(ServiceError::Translation("pipeline did not return a translation".to_string()))
            }
        }
    }

    /// Checks `text` with the sentiment heuristic.
    ///
    /// Without a working classifier the result is [`CheckStatus::Unverified`].
    ///
    /// # Errors
    /// Returns `ServiceError` for empty input or after shutdown.
    pub async fn check(&self, text: &str) -> Result<TextCheck, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyInput);
        }

        debug!(chars = text.chars().count(), "Checking text");

        let error = match self.run(GRAMMAR_KEY, &self.grammar, text, None).await {
            Ok((output, model)) => match output.top_sentiment() {
                Some(top) => return Ok(TextCheck::from_sentiment(text, top, model)),
                None => RunError::UnexpectedOutput,
            },
            Err(RunError::Acquire(AcquireError::ShutDown)) => return Err(ServiceError::ShutDown),
            Err(e) => e,
        };

        warn!(error = ?error, "Text check failed, returning unverified result");
        self.after_failure();
        Ok(TextCheck::unverified(text))
    }

    /// Cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Per-key cache state.
    #[must_use]
    pub fn cache_entries(&self) -> Vec<EntrySnapshot> {
        self.cache.entries()
    }

    /// Drops every cached pipeline.
    pub fn clear_cache(&self) {
        self.cache.clear_cache();
    }

    /// Forgets recent failures so the next call retries immediately.
    pub fn clear_errors(&self) -> usize {
        self.cache.clear_errors()
    }

    /// The candidate behind the cached translation pipeline, if one is loaded.
    #[must_use]
    pub fn current_translation_model(&self) -> Option<Candidate> {
        self.cache.candidate(TRANSLATION_KEY)
    }

    /// Stops the cache. Later calls fail with [`ServiceError::ShutDown`].
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}

fn classify_load_error(error: &LoadError) -> ServiceError {
    if error.is_timeout() {
        ServiceError::Timeout
    } else if error.failure_kind() == FailureKind::ResourceExhausted {
        ServiceError::ResourceExhausted
    } else {
        ServiceError::Translation(error.to_string())
    }
}

fn classify_message(message: &str) -> ServiceError {
    if message.to_lowercase().contains("timeout") {
        ServiceError::Timeout
    } else if FailureKind::classify(message) == FailureKind::ResourceExhausted {
        ServiceError::ResourceExhausted
    } else {
        ServiceError::Translation(message.to_string())
    }
}
