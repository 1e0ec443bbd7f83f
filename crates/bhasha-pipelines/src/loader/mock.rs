//! In-process mock backend.

use super::PipelineLoader;
use crate::PipelineHandle;
use crate::candidate::Candidate;
use async_trait::async_trait;
use bhasha_abstraction::{
    Pipeline, PipelineError, PipelineOptions, PipelineOutput, SentimentScore, Task, Translation,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

const NEGATIVE_MARKERS: [&str; 6] = ["not", "bad", "wrong", "never", "poor", "terrible"];

/// A mock pipeline for testing and demonstration.
#[derive(Debug)]
pub struct MockPipeline {
    id: String,
    task: Task,
    defaults: PipelineOptions,
}

impl MockPipeline {
    /// Creates a new `MockPipeline` with the given model ID.
    #[must_use]
    pub fn new(id: String, task: Task) -> Self {
        Self { id, task, defaults: PipelineOptions::default() }
    }

    /// Sets the language pair used when the caller passes none.
    #[must_use]
    pub fn with_defaults(mut self, defaults: PipelineOptions) -> Self {
        self.defaults = defaults;
        self
    }
}

#[async_trait]
impl Pipeline for MockPipeline {
    async fn run(
        &self,
        input: &str,
        options: Option<&PipelineOptions>,
    ) -> Result<PipelineOutput, PipelineError> {
        debug!(model_id = %self.id, task = %self.task, input_len = input.len(), "MockPipeline running");

        match self.task {
            Task::Translation => {
                let tgt = options
                    .and_then(|o| o.tgt_lang.as_deref())
                    .or(self.defaults.tgt_lang.as_deref())
                    .unwrap_or("ne");
                Ok(PipelineOutput::Translation(Translation {
                    translation_text: format!("[{tgt}] {input}"),
                }))
            }
            Task::SentimentAnalysis => {
                let lower = input.to_lowercase();
                let negative =
                    lower.split_whitespace().any(|word| NEGATIVE_MARKERS.contains(&word));
                let (positive_score, negative_score) = if negative { (0.1, 0.9) } else { (0.7, 0.3) };
                let mut scores = vec![
                    SentimentScore { label: "POSITIVE".to_string(), score: positive_score },
                    SentimentScore { label: "NEGATIVE".to_string(), score: negative_score },
                ];
                scores.sort_by(|a, b| b.score.total_cmp(&a.score));
                Ok(PipelineOutput::Sentiment { scores })
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.id
    }

    fn task(&self) -> Task {
        self.task
    }
}

/// Loader that builds [`MockPipeline`]s, with scripted failures and latency.
#[derive(Debug, Default)]
pub struct MockLoader {
    failures: HashMap<String, String>,
    latency: HashMap<String, Duration>,
    loads: AtomicUsize,
}

impl MockLoader {
    /// Creates a loader where every candidate loads instantly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes loading `name` fail with `message`.
    #[must_use]
    pub fn fail_on(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(name.into(), message.into());
        self
    }

    /// Makes loading `name` take `latency`.
    #[must_use]
    pub fn with_latency_for(mut self, name: impl Into<String>, latency: Duration) -> Self {
        self.latency.insert(name.into(), latency);
        self
    }

    /// Number of load attempts so far.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineLoader for MockLoader {
    async fn load(
        &self,
        task: Task,
        candidate: &Candidate,
    ) -> Result<PipelineHandle, PipelineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency.get(&candidate.name) {
            tokio::time::sleep(*latency).await;
        }

        if let Some(message) = self.failures.get(&candidate.name) {
            return Err(PipelineError::ResponseError(message.clone()));
        }

        let defaults = PipelineOptions {
            src_lang: candidate.src_lang.clone(),
            tgt_lang: candidate.tgt_lang.clone(),
        };
        Ok(Arc::new(MockPipeline::new(candidate.name.clone(), task).with_defaults(defaults)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_translation_uses_candidate_language() {
        let loader = MockLoader::new();
        let candidate = Candidate::new("test/m2m100").with_languages("en", "ne");
        let pipeline = loader.load(Task::Translation, &candidate).await.unwrap();

        let output = pipeline.run("hello", None).await.unwrap();
        assert_eq!(output.translation_text(), Some("[ne] hello"));

        let options = PipelineOptions::translation("eng_Latn", "npi_Deva");
        let output = pipeline.run("hello", Some(&options)).await.unwrap();
        assert_eq!(output.translation_text(), Some("[npi_Deva] hello"));
    }

    #[tokio::test]
    async fn test_mock_sentiment() {
        let pipeline = MockPipeline::new("test/sentiment".to_string(), Task::SentimentAnalysis);

        let output = pipeline.run("this is not right", None).await.unwrap();
        let top = output.top_sentiment().unwrap();
        assert_eq!(top.label, "NEGATIVE");

        let output = pipeline.run("a lovely day", None).await.unwrap();
        assert_eq!(output.top_sentiment().unwrap().label, "POSITIVE");
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let loader = MockLoader::new().fail_on("test/big", "out of memory");
        let err = loader.load(Task::Translation, &Candidate::new("test/big")).await.err().unwrap();
        assert_eq!(err, PipelineError::ResponseError("out of memory".to_string()));
        assert_eq!(loader.load_count(), 1);
    }
}
