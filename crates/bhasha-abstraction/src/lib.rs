//! Pipeline abstraction layer for Bhasha.
//!
//! This crate defines the core traits and types shared by every inference
//! pipeline, independent of the backend that actually runs the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Represents an error that can occur when loading or invoking a pipeline.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineError {
    /// An error occurred while talking to the backend (e.g., network issues).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The backend answered with an error (e.g., model not found, out of memory).
    #[error("Pipeline Response Error: {0}")]
    ResponseError(String),

    /// The backend answered with a payload that could not be decoded.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The pipeline does not support the requested task or model.
    #[error("Unsupported Task: {0}")]
    UnsupportedTask(String),

    /// Other unexpected errors.
    #[error("Other Pipeline Error: {0}")]
    Other(String),
}

/// The inference task a pipeline performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    /// Text-to-text translation between two languages.
    Translation,
    /// Sentiment classification, used as a cheap text-quality signal.
    SentimentAnalysis,
}

impl Task {
    /// Returns the canonical task name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::SentimentAnalysis => "sentiment-analysis",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "translation" | "translate" => Ok(Self::Translation),
            "sentiment-analysis" | "sentiment" | "text-classification" => {
                Ok(Self::SentimentAnalysis)
            }
            other => Err(PipelineError::UnsupportedTask(other.to_string())),
        }
    }
}

/// Options passed alongside the pipeline input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Source language code in the model's own notation (e.g. `eng_Latn`, `en`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_lang: Option<String>,
    /// Target language code in the model's own notation (e.g. `npi_Deva`, `ne`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tgt_lang: Option<String>,
}

impl PipelineOptions {
    /// Creates options for a translation between two languages.
    #[must_use]
    pub fn translation(src_lang: impl Into<String>, tgt_lang: impl Into<String>) -> Self {
        Self { src_lang: Some(src_lang.into()), tgt_lang: Some(tgt_lang.into()) }
    }
}

/// A translated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    /// The translated text.
    pub translation_text: String,
}

/// One label scored by a classification pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// The label (e.g. `POSITIVE`, `NEGATIVE`, `1 star`).
    pub label: String,
    /// Confidence between 0 and 1.
    pub score: f32,
}

/// Normalized pipeline output.
///
/// Backends convert whatever their wire format is into one of these variants,
/// so callers never have to probe the shape of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineOutput {
    /// Output of a translation pipeline.
    Translation(Translation),
    /// Output of a sentiment pipeline, sorted by descending score.
    Sentiment {
        /// Scored labels.
        scores: Vec<SentimentScore>,
    },
}

impl PipelineOutput {
    /// Returns the translated text, if this is a translation output.
    #[must_use]
    pub fn translation_text(&self) -> Option<&str> {
        match self {
            Self::Translation(t) => Some(&t.translation_text),
            Self::Sentiment { .. } => None,
        }
    }

    /// Returns the highest scored label, if this is a sentiment output.
    #[must_use]
    pub fn top_sentiment(&self) -> Option<&SentimentScore> {
        match self {
            Self::Sentiment { scores } => {
                scores.iter().max_by(|a, b| a.score.total_cmp(&b.score))
            }
            Self::Translation(_) => None,
        }
    }
}

/// A loaded inference pipeline.
///
/// All pipelines must be `Send + Sync` so a single loaded instance can be
/// shared between concurrent callers.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Runs the pipeline on a single input.
    ///
    /// # Errors
    /// Returns a `PipelineError` if inference fails.
    async fn run(
        &self,
        input: &str,
        options: Option<&PipelineOptions>,
    ) -> Result<PipelineOutput, PipelineError>;

    /// Returns the ID of the model backing this pipeline.
    fn model_id(&self) -> &str;

    /// Returns the task this pipeline performs.
    fn task(&self) -> Task;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_from_str() {
        assert_eq!(Task::from_str("translation"), Ok(Task::Translation));
        assert_eq!(Task::from_str("Translate"), Ok(Task::Translation));
        assert_eq!(Task::from_str("sentiment-analysis"), Ok(Task::SentimentAnalysis));
        assert_eq!(Task::from_str("SENTIMENT"), Ok(Task::SentimentAnalysis));
        assert!(matches!(Task::from_str("fill-mask"), Err(PipelineError::UnsupportedTask(_))));
    }

    #[test]
    fn test_task_display_matches_as_str() {
        assert_eq!(Task::Translation.to_string(), "translation");
        assert_eq!(Task::SentimentAnalysis.to_string(), "sentiment-analysis");
    }

    #[test]
    fn test_top_sentiment_picks_highest_score() {
        let output = PipelineOutput::Sentiment {
            scores: vec![
                SentimentScore { label: "NEGATIVE".to_string(), score: 0.2 },
                SentimentScore { label: "POSITIVE".to_string(), score: 0.8 },
            ],
        };

        let top = output.top_sentiment().unwrap();
        assert_eq!(top.label, "POSITIVE");
        assert!(output.translation_text().is_none());
    }

    #[test]
    fn test_translation_text_accessor() {
        let output = PipelineOutput::Translation(Translation {
            translation_text: "नमस्ते".to_string(),
        });
        assert_eq!(output.translation_text(), Some("नमस्ते"));
        assert!(output.top_sentiment().is_none());
    }

    #[test]
    fn test_pipeline_options_serialization_skips_missing_langs() {
        let json = serde_json::to_string(&PipelineOptions::default()).unwrap();
        assert_eq!(json, "{}");

        let json = serde_json::to_string(&PipelineOptions::translation("en", "ne")).unwrap();
        assert_eq!(json, r#"{"src_lang":"en","tgt_lang":"ne"}"#);
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::ResponseError("out of memory".to_string());
        assert_eq!(err.to_string(), "Pipeline Response Error: out of memory");
    }
}
