//! Core data types for resource caching.

use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::error::LoadError;
use crate::candidate::Candidate;

/// A load in progress, shared by every caller waiting on the same key.
pub(crate) type LoadFuture<H> = Shared<BoxFuture<'static, Result<H, LoadError>>>;

/// State of a single cache entry.
pub(crate) enum EntryState<H> {
    /// A load is in flight.
    Loading {
        /// Future resolved by the load task.
        flight: LoadFuture<H>,
        /// Cancels the load task on shutdown.
        abort: AbortHandle,
        /// Identifies this flight so a late result never replaces a newer entry.
        generation: u64,
    },
    /// The resource is loaded.
    Ready(H),
    /// The last load failed with this message.
    Errored(String),
}

/// A cache entry with metadata.
pub(crate) struct CacheEntry<H> {
    pub(crate) state: EntryState<H>,
    /// Timestamp of last access (or of the failure for errored entries).
    pub(crate) last_used: Instant,
    /// Timestamp when the entry was created.
    pub(crate) created_at: Instant,
    /// Number of times the handle was served from this entry.
    pub(crate) access_count: u64,
    /// The candidate that produced the handle, if the factory reported one.
    pub(crate) candidate: Option<Candidate>,
}

impl<H> CacheEntry<H> {
    pub(crate) fn loading(
        flight: LoadFuture<H>,
        abort: AbortHandle,
        generation: u64,
        now: Instant,
    ) -> Self {
        Self {
            state: EntryState::Loading { flight, abort, generation },
            last_used: now,
            created_at: now,
            access_count: 0,
            candidate: None,
        }
    }

    pub(crate) fn ready(handle: H, candidate: Option<Candidate>, now: Instant) -> Self {
        Self {
            state: EntryState::Ready(handle),
            last_used: now,
            created_at: now,
            access_count: 1,
            candidate,
        }
    }

    pub(crate) fn errored(message: String, now: Instant) -> Self {
        Self {
            state: EntryState::Errored(message),
            last_used: now,
            created_at: now,
            access_count: 0,
            candidate: None,
        }
    }

    /// Update the last used timestamp and increment the access count.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_used = now;
        self.access_count += 1;
    }

    pub(crate) fn is_loading(&self) -> bool {
        matches!(self.state, EntryState::Loading { .. })
    }

    pub(crate) fn is_errored(&self) -> bool {
        matches!(self.state, EntryState::Errored(_))
    }

    pub(crate) fn status(&self) -> EntryStatus {
        match self.state {
            EntryState::Loading { .. } => EntryStatus::Loading,
            EntryState::Ready(_) => EntryStatus::Ready,
            EntryState::Errored(_) => EntryStatus::Errored,
        }
    }
}

/// Public view of an entry's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// A load is in flight.
    Loading,
    /// The resource is loaded and can be served.
    Ready,
    /// The last load failed.
    Errored,
}

/// Snapshot of one cache entry, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    /// The cache key.
    pub key: String,
    /// Entry state.
    pub status: EntryStatus,
    /// Time since the entry was last used.
    pub idle: Duration,
    /// Time since the entry was created.
    pub age: Duration,
    /// Number of times the handle was served.
    pub access_count: u64,
    /// The candidate that produced the handle.
    pub candidate: Option<Candidate>,
    /// The stored failure message, for errored entries.
    pub error: Option<String>,
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Current number of entries, in any state.
    pub size: usize,
    /// Number of calls served from a ready entry.
    pub hits: u64,
    /// Number of calls that started a load.
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 when nothing was requested yet.
    pub hit_rate: f64,
    /// Number of entries removed by expiry or size pressure.
    pub evictions: u64,
    /// Number of calls that joined a load already in flight.
    pub coalesced: u64,
}

impl CacheStats {
    pub(crate) fn compute_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 { 0.0 } else { hits as f64 / total as f64 }
    }
}
