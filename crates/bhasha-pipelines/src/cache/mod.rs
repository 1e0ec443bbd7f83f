//! Resource caching with single-flight loading.
//!
//! This module provides a caching layer for expensive, named resources such
//! as loaded inference pipelines. Concurrent requests for the same key share
//! one load, failures are held back for a cooldown window, and idle entries
//! expire or are evicted least-recently-used first.

pub mod config;
pub mod error;
pub mod manager;
pub mod types;

pub use config::{CacheConfig, CacheConfigError};
pub use error::{AcquireError, FailureKind, LoadError};
pub use manager::ResourceCache;
pub use types::{CacheStats, EntrySnapshot, EntryStatus};
