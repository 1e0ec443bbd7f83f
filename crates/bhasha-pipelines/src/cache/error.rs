//! Error types for resource loading and cache access.

use std::time::Duration;
use thiserror::Error;

/// How a failed load should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend ran out of memory, was aborted or timed out.
    ///
    /// A smaller candidate may still succeed.
    ResourceExhausted,
    /// Any other failure.
    Other,
}

impl FailureKind {
    /// Classify a failure from its message.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        const MARKERS: [&str; 5] = ["memory", "aborted", "timeout", "enomem", "out of memory"];

        let lower = message.to_lowercase();
        if MARKERS.iter().any(|marker| lower.contains(marker)) {
            Self::ResourceExhausted
        } else {
            Self::Other
        }
    }
}

/// Error produced by a resource factory or by the cache while loading.
///
/// This error is shared with every caller waiting on the same load, hence `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A single candidate could not be constructed.
    #[error("Candidate '{candidate}' failed: {message}")]
    Candidate {
        /// The candidate name.
        candidate: String,
        /// The failure message reported by the backend.
        message: String,
    },

    /// The load did not finish within its time budget.
    #[error("Loading timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Every candidate failed.
    #[error("Failed to load any {resource} candidate. Last error: {last_error}")]
    Exhausted {
        /// What was being loaded (e.g. "translation").
        resource: String,
        /// Message of the last candidate that was tried.
        last_error: String,
    },

    /// The load task was cancelled before it completed.
    #[error("Load aborted: {0}")]
    Aborted(String),
}

impl LoadError {
    /// Returns `true` if the load ran out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Candidate { message, .. } => message.to_lowercase().contains("timeout"),
            Self::Exhausted { .. } | Self::Aborted(_) => false,
        }
    }

    /// Classify this failure.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) | Self::Aborted(_) => FailureKind::ResourceExhausted,
            Self::Candidate { message, .. } => FailureKind::classify(message),
            Self::Exhausted { last_error, .. } => FailureKind::classify(last_error),
        }
    }
}

/// Error returned by [`ResourceCache::acquire`](super::ResourceCache::acquire).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// The resource could not be loaded.
    #[error("Failed to load {key}: {source}")]
    Load {
        /// The cache key.
        key: String,
        /// The underlying load failure.
        #[source]
        source: LoadError,
    },

    /// A recent failure for this key is still within its cooldown window.
    #[error("Recent error loading {key} (retry in {}s): {message}", .retry_after.as_secs())]
    Cooldown {
        /// The cache key.
        key: String,
        /// Message of the stored failure.
        message: String,
        /// Time left until the key may be retried.
        retry_after: Duration,
    },

    /// The cache has been shut down.
    #[error("Resource cache has been shut down")]
    ShutDown,
}

impl AcquireError {
    /// Returns the load error, if this is a load failure.
    #[must_use]
    pub fn load_error(&self) -> Option<&LoadError> {
        match self {
            Self::Load { source, .. } => Some(source),
            Self::Cooldown { .. } | Self::ShutDown => None,
        }
    }
}
