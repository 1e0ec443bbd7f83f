//! ResourceCache implementation with single-flight loading, expiry and cooldown.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, CacheConfigError};
use super::error::{AcquireError, LoadError};
use super::types::{CacheEntry, CacheStats, EntrySnapshot, EntryState, LoadFuture};
use crate::candidate::Candidate;
use crate::factory::{Loaded, ResourceFactory};

/// Mutable state shared between callers, load tasks and the sweeper.
struct CacheState<H> {
    entries: HashMap<String, CacheEntry<H>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    coalesced: u64,
    next_generation: u64,
    closed: bool,
}

impl<H> Default for CacheState<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            evictions: 0,
            coalesced: 0,
            next_generation: 0,
            closed: false,
        }
    }
}

/// Outcome of looking a key up under the lock.
enum Lookup<H> {
    Hit(H),
    Cooldown { message: String, retry_after: Duration },
    Join(LoadFuture<H>),
    Miss,
}

fn lock_state<H>(state: &Mutex<CacheState<H>>) -> MutexGuard<'_, CacheState<H>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache of expensive, named resource handles.
///
/// Handles are built by a [`ResourceFactory`] on the first request for a key
/// and served from memory afterwards. Concurrent requests for a key that is
/// being loaded share one load and observe the same outcome. Failed keys are
/// refused for a cooldown window, and the cache never holds more than
/// `max_cache_size` entries once a load completes.
///
/// The cache is an explicit dependency: construct it once, share it behind an
/// `Arc`, and call [`shutdown`](Self::shutdown) when the application stops.
pub struct ResourceCache<H> {
    state: Arc<Mutex<CacheState<H>>>,
    config: CacheConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<H> ResourceCache<H>
where
    H: Clone + Send + Sync + 'static,
{
    /// Create a new cache with the given configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn new(config: CacheConfig) -> Result<Self, CacheConfigError> {
        config.validate()?;

        Ok(Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            config,
            sweeper: Mutex::new(None),
        })
    }

    /// Get the handle for `key`, loading it with `factory` if needed.
    ///
    /// - A ready entry younger than the cache duration is returned immediately.
    /// - An errored entry younger than the error cooldown fails with
    ///   [`AcquireError::Cooldown`] without calling the factory.
    /// - If a load is already in flight, this call waits for it and shares
    ///   its outcome.
    /// - Otherwise a new load is started. The load runs on its own task, so it
    ///   completes and populates the cache even if this caller gives up.
    ///
    /// # Errors
    /// Returns `AcquireError` if the load fails, times out, is refused by the
    /// cooldown, or the cache has been shut down.
    pub async fn acquire(
        &self,
        key: &str,
        factory: Arc<dyn ResourceFactory<H>>,
    ) -> Result<H, AcquireError> {
        if !self.config.enabled {
            return self.load_uncached(key, factory).await;
        }

        let flight = {
            let mut guard = lock_state(&self.state);
            let state = &mut *guard;
            if state.closed {
                return Err(AcquireError::ShutDown);
            }

            let now = Instant::now();
            match self.lookup(state, key, now) {
                Lookup::Hit(handle) => {
                    if let Some(entry) = state.entries.get_mut(key) {
                        entry.touch(now);
                    }
                    state.hits += 1;
                    debug!(key = %key, "Cache hit");
                    return Ok(handle);
                }
                Lookup::Cooldown { message, retry_after } => {
                    debug!(
                        key = %key,
                        retry_after_secs = retry_after.as_secs(),
                        "Refusing load during error cooldown"
                    );
                    return Err(AcquireError::Cooldown {
                        key: key.to_string(),
                        message,
                        retry_after,
                    });
                }
                Lookup::Join(flight) => {
                    state.coalesced += 1;
                    debug!(key = %key, "Waiting for in-flight load");
                    flight
                }
                Lookup::Miss => {
                    state.misses += 1;
                    debug!(key = %key, "Cache miss, starting load");
                    self.start_load(state, key, factory, now)
                }
            }
        };

        flight.await.map_err(|source| AcquireError::Load { key: key.to_string(), source })
    }

    fn lookup(&self, state: &CacheState<H>, key: &str, now: Instant) -> Lookup<H> {
        let Some(entry) = state.entries.get(key) else {
            return Lookup::Miss;
        };

        let idle = now.saturating_duration_since(entry.last_used);
        match &entry.state {
            EntryState::Ready(handle) if idle < self.config.cache_duration() => {
                Lookup::Hit(handle.clone())
            }
            EntryState::Errored(message) if idle < self.config.error_cooldown() => {
                Lookup::Cooldown {
                    message: message.clone(),
                    retry_after: self.config.error_cooldown() - idle,
                }
            }
            EntryState::Loading { flight, .. } => Lookup::Join(flight.clone()),
            EntryState::Ready(_) | EntryState::Errored(_) => Lookup::Miss,
        }
    }

    /// Spawn the load task and register it as the entry for `key`.
    ///
    /// Must be called with the state lock held so the entry is in place before
    /// the task can try to complete it.
    fn start_load(
        &self,
        state: &mut CacheState<H>,
        key: &str,
        factory: Arc<dyn ResourceFactory<H>>,
        now: Instant,
    ) -> LoadFuture<H> {
        let generation = state.next_generation;
        state.next_generation += 1;

        let timeout = factory.load_timeout().unwrap_or_else(|| self.config.load_timeout());
        let shared = Arc::clone(&self.state);
        let config = self.config.clone();
        let task_key = key.to_string();

        let task = tokio::spawn(async move {
            let load = tokio::time::timeout(timeout, factory.create());
            // A panicking factory must still leave an Errored entry behind.
            let result = match AssertUnwindSafe(load).catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(LoadError::Timeout(timeout)),
                Err(panic) => Err(LoadError::Aborted(format!(
                    "factory panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            complete_load(&shared, &config, &task_key, generation, &result);
            result.map(|loaded| loaded.handle)
        });

        let abort = task.abort_handle();
        let flight: LoadFuture<H> = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(LoadError::Aborted(e.to_string())),
            }
        }
        .boxed()
        .shared();

        state
            .entries
            .insert(key.to_string(), CacheEntry::loading(flight.clone(), abort, generation, now));
        flight
    }

    /// Load without touching the entry map, used when caching is disabled.
    async fn load_uncached(
        &self,
        key: &str,
        factory: Arc<dyn ResourceFactory<H>>,
    ) -> Result<H, AcquireError> {
        {
            let mut state = lock_state(&self.state);
            if state.closed {
                return Err(AcquireError::ShutDown);
            }
            state.misses += 1;
        }

        let timeout = factory.load_timeout().unwrap_or_else(|| self.config.load_timeout());
        let result = match tokio::time::timeout(timeout, factory.create()).await {
            Ok(result) => result,
            Err(_) => Err(LoadError::Timeout(timeout)),
        };
        result
            .map(|loaded| loaded.handle)
            .map_err(|source| AcquireError::Load { key: key.to_string(), source })
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = lock_state(&self.state);
        CacheStats {
            size: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
            hit_rate: CacheStats::compute_hit_rate(state.hits, state.misses),
            evictions: state.evictions,
            coalesced: state.coalesced,
        }
    }

    /// Snapshot every entry, sorted by key.
    #[must_use]
    pub fn entries(&self) -> Vec<EntrySnapshot> {
        let state = lock_state(&self.state);
        let now = Instant::now();
        let mut snapshots: Vec<EntrySnapshot> = state
            .entries
            .iter()
            .map(|(key, entry)| EntrySnapshot {
                key: key.clone(),
                status: entry.status(),
                idle: now.saturating_duration_since(entry.last_used),
                age: now.saturating_duration_since(entry.created_at),
                access_count: entry.access_count,
                candidate: entry.candidate.clone(),
                error: match &entry.state {
                    EntryState::Errored(message) => Some(message.clone()),
                    _ => None,
                },
            })
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    /// The candidate that produced the ready handle for `key`, if any.
    #[must_use]
    pub fn candidate(&self, key: &str) -> Option<Candidate> {
        let state = lock_state(&self.state);
        state
            .entries
            .get(key)
            .filter(|entry| matches!(entry.state, EntryState::Ready(_)))
            .and_then(|entry| entry.candidate.clone())
    }

    /// Remove every entry and reset the counters.
    ///
    /// Loads in flight are not cancelled; they insert their result when they
    /// finish unless a newer entry exists by then.
    pub fn clear_cache(&self) {
        let mut state = lock_state(&self.state);
        let cleared_count = state.entries.len();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
        state.evictions = 0;
        state.coalesced = 0;
        info!(cleared_count, "Cleared resource cache");
    }

    /// Remove errored entries so their keys can be retried immediately.
    ///
    /// Returns the number of entries removed.
    pub fn clear_errors(&self) -> usize {
        let mut state = lock_state(&self.state);
        let before = state.entries.len();
        state.entries.retain(|key, entry| {
            if entry.is_errored() {
                info!(key = %key, "Cleared error state");
                false
            } else {
                true
            }
        });
        before - state.entries.len()
    }

    /// Remove expired entries, then the least recently used ones until the
    /// cache fits `max_cache_size`. Entries that are loading are never removed.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let mut state = lock_state(&self.state);
        sweep_locked(&mut state, &self.config, Instant::now(), None)
    }

    /// Start a background task that sweeps every `cleanup_interval`.
    ///
    /// Calling this again replaces the previous sweeper. Must be called from
    /// within a Tokio runtime.
    pub fn start_sweeper(&self) {
        let shared = Arc::clone(&self.state);
        let config = self.config.clone();
        let period = config.cleanup_interval();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut state = lock_state(&shared);
                if state.closed {
                    break;
                }
                let removed = sweep_locked(&mut state, &config, Instant::now(), None);
                if removed > 0 {
                    debug!(removed, "Periodic sweep removed entries");
                }
            }
        });

        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = sweeper.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the sweeper, abort loads in flight and drop every entry.
    ///
    /// Callers waiting on an aborted load receive [`LoadError::Aborted`]; later
    /// calls to `acquire` fail with [`AcquireError::ShutDown`].
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }

        let mut state = lock_state(&self.state);
        state.closed = true;
        let mut aborted = 0_usize;
        for entry in state.entries.values() {
            if let EntryState::Loading { abort, .. } = &entry.state {
                abort.abort();
                aborted += 1;
            }
        }
        state.entries.clear();
        info!(aborted, "Resource cache shut down");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        lock_state(&self.state).closed
    }

    /// Get the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Store the outcome of a load, unless a newer entry replaced it meanwhile.
fn complete_load<H>(
    shared: &Mutex<CacheState<H>>,
    config: &CacheConfig,
    key: &str,
    generation: u64,
    result: &Result<Loaded<H>, LoadError>,
) where
    H: Clone,
{
    let mut state = lock_state(shared);
    if state.closed {
        return;
    }

    let current = match state.entries.get(key) {
        None => true,
        Some(entry) => matches!(
            entry.state,
            EntryState::Loading { generation: g, .. } if g == generation
        ),
    };
    if !current {
        debug!(key = %key, generation, "Discarding result of superseded load");
        return;
    }

    let now = Instant::now();
    match result {
        Ok(loaded) => {
            state.entries.insert(
                key.to_string(),
                CacheEntry::ready(loaded.handle.clone(), loaded.candidate.clone(), now),
            );
            info!(
                key = %key,
                candidate = loaded.candidate.as_ref().map_or("-", |c| c.name.as_str()),
                "Resource loaded"
            );
            sweep_locked(&mut state, config, now, Some(key));
        }
        Err(e) => {
            state.entries.insert(key.to_string(), CacheEntry::errored(e.to_string(), now));
            warn!(key = %key, error = %e, "Failed to load resource");
        }
    }
}

fn sweep_locked<H>(
    state: &mut CacheState<H>,
    config: &CacheConfig,
    now: Instant,
    keep: Option<&str>,
) -> usize {
    let ttl = config.cache_duration();

    let expired: Vec<String> = state
        .entries
        .iter()
        .filter(|(_, entry)| {
            !entry.is_loading() && now.saturating_duration_since(entry.last_used) > ttl
        })
        .map(|(key, _)| key.clone())
        .collect();

    let mut removed = 0;
    for key in expired {
        state.entries.remove(&key);
        removed += 1;
        info!(key = %key, "Removed expired cache entry");
    }

    if state.entries.len() > config.max_cache_size {
        let mut lru: Vec<(String, Instant)> = state
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_loading() && Some(key.as_str()) != keep)
            .map(|(key, entry)| (key.clone(), entry.last_used))
            .collect();
        lru.sort_by_key(|(_, last_used)| *last_used);

        let excess = state.entries.len() - config.max_cache_size;
        for (key, _) in lru.into_iter().take(excess) {
            state.entries.remove(&key);
            removed += 1;
            info!(key = %key, "Evicted least recently used cache entry");
        }
    }

    state.evictions += removed as u64;
    removed
}

impl<H> Drop for ResourceCache<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().unwrap_or_else(PoisonError::into_inner).take()
        {
            handle.abort();
        }
    }
}

impl<H> fmt::Debug for ResourceCache<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock_state(&self.state);
        f.debug_struct("ResourceCache")
            .field("config", &self.config)
            .field("size", &state.entries.len())
            .field("hits", &state.hits)
            .field("misses", &state.misses)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EntryStatus;
    use crate::factory::factory_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Handle = Arc<String>;

    /// Factory that counts its calls and yields `value`, or fails with `error`.
    fn counting_factory(
        calls: &Arc<AtomicUsize>,
        value: &str,
        error: Option<&str>,
    ) -> Arc<dyn ResourceFactory<Handle>> {
        let calls = Arc::clone(calls);
        let value = value.to_string();
        let error = error.map(str::to_string);
        Arc::new(factory_fn(move || {
            let calls = Arc::clone(&calls);
            let value = value.clone();
            let error = error.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                match error {
                    Some(message) => Err(LoadError::Candidate { candidate: value, message }),
                    None => Ok(Loaded::new(Arc::new(value))),
                }
            }
        }))
    }

    fn slow_factory(calls: &Arc<AtomicUsize>, delay: Duration) -> Arc<dyn ResourceFactory<Handle>> {
        let calls = Arc::clone(calls);
        Arc::new(factory_fn(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(Loaded::new(Arc::new("slow".to_string())))
            }
        }))
    }

    fn cache() -> ResourceCache<Handle> {
        ResourceCache::new(CacheConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_returns_same_instance() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.acquire("translation", counting_factory(&calls, "a", None)).await.unwrap();
        let second =
            cache.acquire("translation", counting_factory(&calls, "a", None)).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_reloaded() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = counting_factory(&calls, "a", None);

        let first = cache.acquire("grammar", Arc::clone(&factory)).await.unwrap();
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        let second = cache.acquire("grammar", factory).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().misses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction_when_cache_full() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.acquire("one", counting_factory(&calls, "1", None)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        let two = cache.acquire("two", counting_factory(&calls, "2", None)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        // Touch "one" so "two" becomes the least recently used entry.
        cache.acquire("one", counting_factory(&calls, "1", None)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        cache.acquire("three", counting_factory(&calls, "3", None)).await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.evictions, 1);

        let keys: Vec<String> = cache.entries().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["one".to_string(), "three".to_string()]);

        let two_again = cache.acquire("two", counting_factory(&calls, "2", None)).await.unwrap();
        assert!(!Arc::ptr_eq(&two, &two_again));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_enters_cooldown_then_retries() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = counting_factory(&calls, "a", Some("out of memory"));

        let err = cache.acquire("translation", Arc::clone(&failing)).await.unwrap_err();
        assert!(matches!(err, AcquireError::Load { .. }));
        assert!(err.to_string().contains("out of memory"));

        tokio::time::advance(Duration::from_secs(10)).await;
        let err = cache.acquire("translation", Arc::clone(&failing)).await.unwrap_err();
        match err {
            AcquireError::Cooldown { message, retry_after, .. } => {
                assert!(message.contains("out of memory"));
                assert_eq!(retry_after, Duration::from_secs(50));
            }
            other => panic!("Expected Cooldown, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(51)).await;
        let handle = cache
            .acquire("translation", counting_factory(&calls, "recovered", None))
            .await
            .unwrap();
        assert_eq!(handle.as_str(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_share_one_load() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = slow_factory(&calls, Duration::from_secs(5));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let cache = Arc::clone(&cache);
            let factory = Arc::clone(&factory);
            tasks.push(tokio::spawn(async move { cache.acquire("translation", factory).await }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 4);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_share_failure() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = Arc::clone(&calls);
        let factory: Arc<dyn ResourceFactory<Handle>> = Arc::new(factory_fn(move || {
            let calls = Arc::clone(&calls_in);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(2)).await;
                Err::<Loaded<Handle>, _>(LoadError::Aborted("backend crashed".to_string()))
            }
        }));

        let first = {
            let cache = Arc::clone(&cache);
            let factory = Arc::clone(&factory);
            tokio::spawn(async move { cache.acquire("grammar", factory).await })
        };
        let second = {
            let cache = Arc::clone(&cache);
            let factory = Arc::clone(&factory);
            tokio::spawn(async move { cache.acquire("grammar", factory).await })
        };

        let first = first.await.unwrap().unwrap_err();
        let second = second.await.unwrap().unwrap_err();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_stores_error() {
        let config = CacheConfig { load_timeout_secs: 1, ..CacheConfig::default() };
        let cache: ResourceCache<Handle> = ResourceCache::new(config).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let err = cache
            .acquire("translation", slow_factory(&calls, Duration::from_secs(30)))
            .await
            .unwrap_err();

        let load = err.load_error().unwrap();
        assert!(load.is_timeout());
        assert!(err.to_string().contains("timeout"));

        let entries = cache.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_caller_does_not_cancel_load() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = slow_factory(&calls, Duration::from_secs(10));

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            cache.acquire("translation", Arc::clone(&factory)),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(20)).await;

        let handle = cache.acquire("translation", factory).await.unwrap();
        assert_eq!(handle.as_str(), "slow");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_errors_keeps_ready_entries() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.acquire("grammar", counting_factory(&calls, "ok", None)).await.unwrap();
        cache.acquire("grammar", counting_factory(&calls, "ok", None)).await.unwrap();
        let _ = cache.acquire("translation", counting_factory(&calls, "x", Some("boom"))).await;

        assert_eq!(cache.stats().size, 2);
        assert_eq!(cache.clear_errors(), 1);

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);

        // The key can be retried right away.
        let handle =
            cache.acquire("translation", counting_factory(&calls, "fixed", None)).await.unwrap();
        assert_eq!(handle.as_str(), "fixed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_resets_everything() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.acquire("grammar", counting_factory(&calls, "ok", None)).await.unwrap();
        cache.acquire("grammar", counting_factory(&calls, "ok", None)).await.unwrap();
        cache.clear_cache();

        let stats = cache.stats();
        assert_eq!(stats, CacheStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_does_not_cancel_in_flight_load() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = slow_factory(&calls, Duration::from_secs(5));

        let waiter = {
            let cache = Arc::clone(&cache);
            let factory = Arc::clone(&factory);
            tokio::spawn(async move { cache.acquire("translation", factory).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cache.clear_cache();

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(cache.stats().size, 1);
        assert!(cache.acquire("translation", factory).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_stats() {
        let stats = cache().stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert!((stats.hit_rate - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_candidate_metadata_recorded() {
        let cache = cache();
        let factory: Arc<dyn ResourceFactory<Handle>> = Arc::new(factory_fn(|| async {
            Ok(Loaded::new(Arc::new("b".to_string()))
                .with_candidate(Candidate::new("test/m2m100-b").with_languages("en", "ne")))
        }));

        assert!(cache.candidate("translation").is_none());
        cache.acquire("translation", factory).await.unwrap();

        let candidate = cache.candidate("translation").unwrap();
        assert_eq!(candidate.name, "test/m2m100-b");
        assert_eq!(candidate.tgt_lang.as_deref(), Some("ne"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_never_removes_loading_entries() {
        let config = CacheConfig { max_cache_size: 1, ..CacheConfig::default() };
        let cache = Arc::new(ResourceCache::<Handle>::new(config).unwrap());
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = {
            let cache = Arc::clone(&cache);
            let factory = slow_factory(&calls, Duration::from_secs(10));
            tokio::spawn(async move { cache.acquire("slow", factory).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        cache.acquire("fast", counting_factory(&calls, "fast", None)).await.unwrap();
        // Over capacity, but the only other entry is still loading.
        assert_eq!(cache.stats().size, 2);

        slow.await.unwrap().unwrap();
        // The slow load finished last, so "fast" is the older entry.
        let keys: Vec<String> = cache.entries().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["slow".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweeper_removes_expired_entries() {
        let config = CacheConfig {
            cache_duration_secs: 60,
            cleanup_interval_secs: 30,
            ..CacheConfig::default()
        };
        let cache = ResourceCache::<Handle>::new(config).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.start_sweeper();

        cache.acquire("grammar", counting_factory(&calls, "ok", None)).await.unwrap();
        assert_eq!(cache.stats().size, 1);

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_waiters_and_rejects_calls() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let cache = Arc::clone(&cache);
            let factory = slow_factory(&calls, Duration::from_secs(60));
            tokio::spawn(async move { cache.acquire("translation", factory).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        cache.shutdown();
        assert!(cache.is_shut_down());

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err.load_error(), Some(LoadError::Aborted(_))));

        let err = cache
            .acquire("translation", counting_factory(&calls, "late", None))
            .await
            .unwrap_err();
        assert_eq!(err, AcquireError::ShutDown);
        assert_eq!(cache.stats().size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_factory_leaves_recoverable_error() {
        let cache = cache();
        let attempts = Arc::new(AtomicUsize::new(0));
        let panicking: Arc<dyn ResourceFactory<Handle>> = {
            let attempts = Arc::clone(&attempts);
            Arc::new(factory_fn(move || {
                let attempts = Arc::clone(&attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("factory bug");
                    }
                    Ok::<_, LoadError>(Loaded::new(Arc::new("never".to_string())))
                }
            }))
        };

        let err = cache.acquire("translation", panicking).await.unwrap_err();
        match err.load_error() {
            Some(LoadError::Aborted(message)) => assert!(message.contains("factory bug")),
            other => panic!("expected aborted load, got {other:?}"),
        }

        let entries = cache.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Errored);

        assert_eq!(cache.clear_errors(), 1);

        let calls = Arc::new(AtomicUsize::new(0));
        let handle =
            cache.acquire("translation", counting_factory(&calls, "healthy", None)).await.unwrap();
        assert_eq!(handle.as_str(), "healthy");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_loads() {
        let config = CacheConfig { enabled: false, ..CacheConfig::default() };
        let cache = ResourceCache::<Handle>::new(config).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.acquire("grammar", counting_factory(&calls, "a", None)).await.unwrap();
        cache.acquire("grammar", counting_factory(&calls, "a", None)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CacheConfig { max_cache_size: 0, ..CacheConfig::default() };
        assert!(ResourceCache::<Handle>::new(config).is_err());
    }
}
