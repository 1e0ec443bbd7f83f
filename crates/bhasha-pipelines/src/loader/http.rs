//! Backend for Hugging Face Inference-compatible model servers.
//!
//! Loading a candidate checks that the server can serve the model
//! (`GET {base_url}/models/{name}`); running it posts the input
//! (`POST {base_url}/models/{name}` with `{"inputs", "parameters"}`).
//! Responses are decoded into [`PipelineOutput`] here so callers never see the
//! wire format.

use super::PipelineLoader;
use crate::PipelineHandle;
use crate::candidate::Candidate;
use async_trait::async_trait;
use bhasha_abstraction::{
    Pipeline, PipelineError, PipelineOptions, PipelineOutput, SentimentScore, Task, Translation,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Default request timeout for the model server.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn build_client() -> Client {
    Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_else(|_| Client::new())
}

/// Loader that resolves candidates against a model server.
#[derive(Debug, Clone)]
pub struct HttpLoader {
    /// Base URL of the server (e.g. "http://localhost:8080").
    base_url: String,
    /// Optional bearer token.
    api_key: Option<String>,
    /// HTTP client for requests.
    client: Client,
}

impl HttpLoader {
    /// Creates a loader without authentication.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client: build_client(),
        }
    }

    /// Creates a loader, taking the bearer token from `HF_TOKEN` if it is set.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // env::var is needed for token loading
    pub fn from_env(base_url: impl Into<String>) -> Self {
        let loader = Self::new(base_url);
        match env::var("HF_TOKEN") {
            Ok(token) if !token.is_empty() => loader.with_api_key(token),
            _ => loader,
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn model_url(&self, name: &str) -> String {
        format!("{}/models/{}", self.base_url, name)
    }
}

#[async_trait]
impl PipelineLoader for HttpLoader {
    async fn load(
        &self,
        task: Task,
        candidate: &Candidate,
    ) -> Result<PipelineHandle, PipelineError> {
        let url = self.model_url(&candidate.name);
        debug!(url = %url, task = %task, "Checking model availability");

        let mut request = self.client.get(&url);
        if let Some(ref api_key) = self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to reach model server");
            PipelineError::RequestError(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = error_body(response).await;
            return Err(PipelineError::ResponseError(format!(
                "Model {} is currently loading: {}",
                candidate.name, body
            )));
        }
        if !status.is_success() {
            return Err(status_error(&candidate.name, status, error_body(response).await));
        }

        Ok(Arc::new(HttpPipeline {
            model_id: candidate.name.clone(),
            task,
            url,
            api_key: self.api_key.clone(),
            client: self.client.clone(),
            defaults: PipelineOptions {
                src_lang: candidate.src_lang.clone(),
                tgt_lang: candidate.tgt_lang.clone(),
            },
        }))
    }
}

async fn error_body(response: Response) -> String {
    response.text().await.unwrap_or_else(|_| "Unknown error".to_string())
}

fn status_error(model: &str, status: StatusCode, body: String) -> PipelineError {
    error!(status = %status, model = %model, error = %body, "Model server returned error status");
    match status.as_u16() {
        401 | 403 => PipelineError::RequestError(format!("Authentication failed ({}): {}", status, body)),
        404 => PipelineError::ResponseError(format!("Model {} not found: {}", model, body)),
        _ => PipelineError::ResponseError(format!("Server error ({}): {}", status, body)),
    }
}

/// A pipeline served by a remote model server.
#[derive(Debug, Clone)]
pub struct HttpPipeline {
    model_id: String,
    task: Task,
    url: String,
    api_key: Option<String>,
    client: Client,
    defaults: PipelineOptions,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<PipelineOptions>,
}

#[derive(Debug, Deserialize)]
struct TranslationItem {
    translation_text: String,
}

/// Classification servers answer `[[{..}]]` for a single input, some `[{..}]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SentimentResponse {
    Nested(Vec<Vec<SentimentScore>>),
    Flat(Vec<SentimentScore>),
}

impl HttpPipeline {
    fn merged_options(&self, options: Option<&PipelineOptions>) -> Option<PipelineOptions> {
        if self.task != Task::Translation {
            return None;
        }
        let src_lang = options.and_then(|o| o.src_lang.clone()).or_else(|| self.defaults.src_lang.clone());
        let tgt_lang = options.and_then(|o| o.tgt_lang.clone()).or_else(|| self.defaults.tgt_lang.clone());
        if src_lang.is_none() && tgt_lang.is_none() {
            None
        } else {
            Some(PipelineOptions { src_lang, tgt_lang })
        }
    }

    fn decode(&self, body: &str) -> Result<PipelineOutput, PipelineError> {
        match self.task {
            Task::Translation => {
                let items: Vec<TranslationItem> = serde_json::from_str(body).map_err(|e| {
                    PipelineError::SerializationError(format!("Failed to parse translation: {}", e))
                })?;
                let first = items.into_iter().next().ok_or_else(|| {
                    PipelineError::SerializationError("Empty translation response".to_string())
                })?;
                Ok(PipelineOutput::Translation(Translation { translation_text: first.translation_text }))
            }
            Task::SentimentAnalysis => {
                let response: SentimentResponse = serde_json::from_str(body).map_err(|e| {
                    PipelineError::SerializationError(format!("Failed to parse sentiment: {}", e))
                })?;
                let mut scores = match response {
                    SentimentResponse::Nested(nested) => nested.into_iter().next().unwrap_or_default(),
                    SentimentResponse::Flat(flat) => flat,
                };
                scores.sort_by(|a, b| b.score.total_cmp(&a.score));
                Ok(PipelineOutput::Sentiment { scores })
            }
        }
    }
}

#[async_trait]
impl Pipeline for HttpPipeline {
    async fn run(
        &self,
        input: &str,
        options: Option<&PipelineOptions>,
    ) -> Result<PipelineOutput, PipelineError> {
        debug!(model_id = %self.model_id, task = %self.task, input_len = input.len(), "HttpPipeline running");

        let body = InferenceRequest { inputs: input, parameters: self.merged_options(options) };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(ref api_key) = self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, url = %self.url, "Failed to send inference request");
            PipelineError::RequestError(format!("Network error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(&self.model_id, status, error_body(response).await));
        }

        let text = response.text().await.map_err(|e| {
            PipelineError::RequestError(format!("Failed to read response: {}", e))
        })?;
        self.decode(&text)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn task(&self) -> Task {
        self.task
    }
}
