//! Integration tests for the resource cache with candidate factories.

use bhasha_abstraction::Task;
use bhasha_pipelines::{
    AcquireError, CacheConfig, Candidate, CandidateFactory, EntryStatus, LoadError, MockLoader,
    PipelineHandle, ResourceCache, ResourceFactory,
};
use std::sync::Arc;
use std::time::Duration;

fn two_candidates() -> Vec<Candidate> {
    vec![
        Candidate::new("test/nllb-a").with_languages("eng_Latn", "npi_Deva"),
        Candidate::new("test/m2m100-b").with_languages("en", "ne"),
    ]
}

fn factory(loader: Arc<MockLoader>) -> Arc<dyn ResourceFactory<PipelineHandle>> {
    Arc::new(CandidateFactory::new(Task::Translation, loader).with_candidates(two_candidates()))
}

#[tokio::test]
async fn test_cascade_records_winning_candidate() {
    let cache: ResourceCache<PipelineHandle> = ResourceCache::new(CacheConfig::default()).unwrap();
    let loader = Arc::new(MockLoader::new().fail_on("test/nllb-a", "timeout"));

    let handle = cache.acquire("translation", factory(loader.clone())).await.unwrap();
    assert_eq!(handle.model_id(), "test/m2m100-b");

    let winner = cache.candidate("translation").unwrap();
    assert_eq!(winner.name, "test/m2m100-b");
    assert_eq!(winner.tgt_lang.as_deref(), Some("ne"));

    let stats = cache.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(loader.load_count(), 2);
}

#[tokio::test]
async fn test_exhausted_cascade_reports_last_failure_then_cools_down() {
    let cache: ResourceCache<PipelineHandle> = ResourceCache::new(CacheConfig::default()).unwrap();
    let loader = Arc::new(
        MockLoader::new()
            .fail_on("test/nllb-a", "out of memory")
            .fail_on("test/m2m100-b", "tokenizer missing"),
    );

    let err = cache.acquire("translation", factory(loader.clone())).await.err().unwrap();
    match err.load_error() {
        Some(LoadError::Exhausted { resource, last_error }) => {
            assert_eq!(resource, "translation");
            assert!(last_error.contains("tokenizer missing"));
        }
        other => panic!("Expected Exhausted, got {other:?}"),
    }
    assert!(err.to_string().contains("tokenizer missing"));

    let entries = cache.entries();
    assert_eq!(entries[0].status, EntryStatus::Errored);

    let err = cache.acquire("translation", factory(loader.clone())).await.err().unwrap();
    assert!(matches!(err, AcquireError::Cooldown { .. }));
    assert_eq!(loader.load_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquires_share_one_load() {
    let cache: Arc<ResourceCache<PipelineHandle>> =
        Arc::new(ResourceCache::new(CacheConfig::default()).unwrap());
    let loader =
        Arc::new(MockLoader::new().with_latency_for("test/nllb-a", Duration::from_millis(50)));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        let factory = factory(loader.clone());
        tasks.push(tokio::spawn(async move { cache.acquire("translation", factory).await }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(loader.load_count(), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));

    let stats = cache.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.misses + stats.hits + stats.coalesced, 16);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_size_bound_evicts_least_recently_used() {
    let config = CacheConfig { max_cache_size: 2, ..CacheConfig::default() };
    let cache: ResourceCache<PipelineHandle> = ResourceCache::new(config).unwrap();
    let loader = Arc::new(MockLoader::new());

    for key in ["first", "second"] {
        cache.acquire(key, factory(loader.clone())).await.unwrap();
    }
    // Touch "first" so "second" becomes the least recently used.
    cache.acquire("first", factory(loader.clone())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    cache.acquire("third", factory(loader.clone())).await.unwrap();

    let keys: Vec<String> = cache.entries().into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec!["first".to_string(), "third".to_string()]);
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn test_clear_errors_then_retry_recovers() {
    let cache: ResourceCache<PipelineHandle> = ResourceCache::new(CacheConfig::default()).unwrap();
    let failing = Arc::new(
        MockLoader::new().fail_on("test/nllb-a", "boom").fail_on("test/m2m100-b", "boom"),
    );
    let working = Arc::new(MockLoader::new());

    cache.acquire("ready", factory(working.clone())).await.unwrap();
    cache.acquire("ready", factory(working.clone())).await.unwrap();
    assert!(cache.acquire("broken", factory(failing)).await.is_err());

    assert_eq!(cache.clear_errors(), 1);
    let entries = cache.entries();
    let ready = &entries[0];
    assert_eq!(ready.key, "ready");
    assert_eq!(ready.access_count, 2);

    let handle = cache.acquire("broken", factory(working)).await.unwrap();
    assert_eq!(handle.model_id(), "test/nllb-a");
}
