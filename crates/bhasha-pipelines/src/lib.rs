//! Cached inference pipelines for Bhasha.
//!
//! This crate loads named pipelines on demand and keeps them warm in a
//! [`ResourceCache`]: concurrent requests share one load, idle entries expire,
//! failures cool down before they are retried, and each pipeline is built by
//! cascading through an ordered list of model candidates.
//!
//! # Backends
//!
//! - **Mock**: in-process pipelines for testing and offline use
//! - **Http**: Hugging Face Inference-compatible model servers
//!
//! [`LanguageService`] puts translation (English to Nepali by default) and a
//! sentiment-based text check on top, with a dictionary fallback when no
//! translation model can be loaded.

pub mod cache;
pub mod candidate;
pub mod config;
pub mod dictionary;
pub mod factory;
pub mod loader;
pub mod service;

use bhasha_abstraction::Pipeline;
use std::sync::Arc;

/// A loaded pipeline, shared between the cache and its callers.
pub type PipelineHandle = Arc<dyn Pipeline>;

pub use cache::{
    AcquireError, CacheConfig, CacheConfigError, CacheStats, EntrySnapshot, EntryStatus,
    FailureKind, LoadError, ResourceCache,
};
pub use candidate::{AllowList, Candidate, default_candidates};
pub use config::{
    BackendConfig, BackendKind, BhashaConfig, ConfigError, FallbackConfig, PipelineConfig,
    PipelinesConfig, ServiceConfig, default_config_path, load_config,
};
pub use dictionary::{DictionaryError, FallbackDictionary};
pub use factory::{CandidateFactory, FnFactory, Loaded, ResourceFactory, factory_fn};
pub use loader::{HttpLoader, HttpPipeline, MockLoader, MockPipeline, PipelineLoader};
pub use service::{
    CheckStatus, GRAMMAR_KEY, LanguageService, ServiceError, TRANSLATION_KEY, TextCheck,
    TranslationResult,
};
