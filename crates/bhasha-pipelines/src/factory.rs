//! Resource factories: how the cache builds the handles it stores.
//!
//! A factory owns an ordered list of backend candidates and tries them one by
//! one until a handle can be built. Per-candidate failures are logged and
//! swallowed; only the aggregated failure reaches the cache.

use crate::PipelineHandle;
use crate::cache::{FailureKind, LoadError};
use crate::candidate::{AllowList, Candidate, default_candidates};
use crate::loader::PipelineLoader;
use async_trait::async_trait;
use bhasha_abstraction::Task;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A handle produced by a factory, with the candidate that produced it.
#[derive(Debug, Clone)]
pub struct Loaded<H> {
    /// The constructed handle.
    pub handle: H,
    /// Metadata about the winning candidate, when the factory tracks one.
    pub candidate: Option<Candidate>,
}

impl<H> Loaded<H> {
    /// Wraps a handle without candidate metadata.
    pub fn new(handle: H) -> Self {
        Self { handle, candidate: None }
    }

    /// Attaches the winning candidate.
    #[must_use]
    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.candidate = Some(candidate);
        self
    }
}

/// Builds the resource cached under one key.
#[async_trait]
pub trait ResourceFactory<H>: Send + Sync {
    /// Constructs a new handle.
    ///
    /// # Errors
    /// Returns a `LoadError` if no handle can be built.
    async fn create(&self) -> Result<Loaded<H>, LoadError>;

    /// Time budget for a whole `create` call, overriding the cache default.
    fn load_timeout(&self) -> Option<Duration> {
        None
    }
}

/// Factory backed by an async closure.
pub struct FnFactory<F> {
    f: F,
}

/// Creates a factory from an async closure.
pub fn factory_fn<H, F, Fut>(f: F) -> FnFactory<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Loaded<H>, LoadError>> + Send,
{
    FnFactory { f }
}

#[async_trait]
impl<H, F, Fut> ResourceFactory<H> for FnFactory<F>
where
    H: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Loaded<H>, LoadError>> + Send,
{
    async fn create(&self) -> Result<Loaded<H>, LoadError> {
        (self.f)().await
    }
}

/// Default time budget for a single candidate.
pub const DEFAULT_CANDIDATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Factory that cascades through pipeline candidates until one loads.
pub struct CandidateFactory {
    task: Task,
    candidates: Vec<Candidate>,
    loader: Arc<dyn PipelineLoader>,
    allow_list: AllowList,
    candidate_timeout: Duration,
    load_timeout: Option<Duration>,
}

impl CandidateFactory {
    /// Creates a factory for `task` using the built-in candidates and allow-list.
    #[must_use]
    pub fn new(task: Task, loader: Arc<dyn PipelineLoader>) -> Self {
        Self {
            task,
            candidates: default_candidates(task),
            loader,
            allow_list: AllowList::for_task(task),
            candidate_timeout: DEFAULT_CANDIDATE_TIMEOUT,
            load_timeout: None,
        }
    }

    /// Replaces the candidate list.
    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Replaces the allow-list.
    #[must_use]
    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Sets the time budget for a single candidate.
    #[must_use]
    pub fn with_candidate_timeout(mut self, timeout: Duration) -> Self {
        self.candidate_timeout = timeout;
        self
    }

    /// Sets the time budget for the whole cascade.
    #[must_use]
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// The task this factory loads pipelines for.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task
    }

    /// The candidates, in the order they are tried.
    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }
}

#[async_trait]
impl ResourceFactory<PipelineHandle> for CandidateFactory {
    async fn create(&self) -> Result<Loaded<PipelineHandle>, LoadError> {
        info!(task = %self.task, candidates = self.candidates.len(), "Loading pipeline");

        let mut last_error: Option<String> = None;

        for candidate in &self.candidates {
            if !self.allow_list.allows(&candidate.name) {
                warn!(
                    task = %self.task,
                    candidate = %candidate.name,
                    "Skipping candidate not allowed for this task"
                );
                continue;
            }

            debug!(task = %self.task, candidate = %candidate.name, "Attempting candidate");

            let attempt =
                tokio::time::timeout(self.candidate_timeout, self.loader.load(self.task, candidate))
                    .await;

            let message = match attempt {
                Ok(Ok(pipeline)) => {
                    info!(
                        task = %self.task,
                        candidate = %candidate,
                        model = %pipeline.model_id(),
                        "Pipeline loaded"
                    );
                    return Ok(Loaded::new(pipeline).with_candidate(candidate.clone()));
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("Pipeline creation timeout for {}", candidate.name),
            };

            match FailureKind::classify(&message) {
                FailureKind::ResourceExhausted => warn!(
                    candidate = %candidate.name,
                    error = %message,
                    "Memory or timeout failure, trying next candidate"
                ),
                FailureKind::Other => warn!(
                    candidate = %candidate.name,
                    error = %message,
                    "Candidate failed, trying next candidate"
                ),
            }
            last_error = Some(message);
        }

        Err(LoadError::Exhausted {
            resource: self.task.to_string(),
            last_error: last_error.unwrap_or_else(|| "no eligible candidates".to_string()),
        })
    }

    fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout
    }
}
