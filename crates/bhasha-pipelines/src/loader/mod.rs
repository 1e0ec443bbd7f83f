//! Pipeline loaders: the backends a [`CandidateFactory`](crate::CandidateFactory)
//! asks to turn a candidate into a running pipeline.
//!
//! - **Mock**: in-process pipelines for tests and offline use
//! - **Http**: a Hugging Face Inference-compatible model server

pub mod http;
pub mod mock;

use crate::PipelineHandle;
use crate::candidate::Candidate;
use async_trait::async_trait;
use bhasha_abstraction::{PipelineError, Task};

pub use http::{HttpLoader, HttpPipeline};
pub use mock::{MockLoader, MockPipeline};

/// Builds a pipeline for one candidate.
#[async_trait]
pub trait PipelineLoader: Send + Sync {
    /// Loads `candidate` for `task`.
    ///
    /// # Errors
    /// Returns a `PipelineError` if the backend cannot provide the model.
    async fn load(&self, task: Task, candidate: &Candidate)
    -> Result<PipelineHandle, PipelineError>;
}
