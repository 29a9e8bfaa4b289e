use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::{SharedString, Unit};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use metrics_util::CompositeKey;

use ragops_cache::{embedding_key, response_key, MemoryCacheBackend, SemanticCache, CACHE_REQUESTS_METRIC};
use ragops_core::config::CacheSettings;
use ragops_core::domain::Domain;
use ragops_core::error::{Error, Result};
use ragops_core::traits::{CacheBackend, Clock};

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn at(t: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(t)))
    }

    fn advance(&self, by: chrono::Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn hr() -> Domain {
    Domain::parse("hr").unwrap()
}

fn cache(backend: Arc<dyn CacheBackend>) -> SemanticCache {
    SemanticCache::new(backend, CacheSettings::default(), 3)
}

#[tokio::test]
async fn identical_embedding_hits_and_orthogonal_misses() {
    let cache = cache(Arc::new(MemoryCacheBackend::new()));
    cache.store("how many vacation days?", &[1.0, 0.0, 0.0], "Twenty.", &hr()).await;

    let hit = cache.lookup("vacation days?", &[1.0, 0.0, 0.0], &hr()).await.expect("hit");
    assert_eq!(hit.response, "Twenty.");
    assert!(hit.similarity >= 0.95);
    assert_eq!(hit.query, "how many vacation days?");

    assert!(cache.lookup("parking", &[0.0, 1.0, 0.0], &hr()).await.is_none());
}

#[tokio::test]
async fn most_similar_entry_wins() {
    let settings = CacheSettings { similarity_threshold: 0.9, ..CacheSettings::default() };
    let cache = SemanticCache::new(Arc::new(MemoryCacheBackend::new()), settings, 2);
    cache.store("a", &[1.0, 0.0], "exact", &hr()).await;
    cache.store("b", &[0.9, (1.0f32 - 0.81).sqrt()], "close", &hr()).await;

    let hit = cache.lookup("q", &[1.0, 0.0], &hr()).await.expect("hit");
    assert_eq!(hit.response, "exact");

    let hit = cache.lookup("q", &[0.9, (1.0f32 - 0.81).sqrt()], &hr()).await.expect("hit");
    assert_eq!(hit.response, "close");
}

#[tokio::test]
async fn domains_do_not_share_entries() {
    let cache = cache(Arc::new(MemoryCacheBackend::new()));
    cache.store("q", &[0.0, 0.0, 1.0], "hr answer", &hr()).await;
    assert!(cache.lookup("q", &[0.0, 0.0, 1.0], &Domain::general()).await.is_none());
}

#[tokio::test]
async fn expired_entries_are_ignored() {
    let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap());
    let cache = cache(Arc::new(MemoryCacheBackend::new())).with_clock(clock.clone());
    cache.store("q", &[1.0, 1.0, 0.0], "fresh", &hr()).await;
    assert!(cache.lookup("q", &[1.0, 1.0, 0.0], &hr()).await.is_some());

    clock.advance(chrono::Duration::seconds(3_600));
    assert!(cache.lookup("q", &[1.0, 1.0, 0.0], &hr()).await.is_none());
}

#[tokio::test]
async fn scan_is_bounded_to_newest_entries() {
    let cache = cache(Arc::new(MemoryCacheBackend::new()));
    cache.store("oldest", &[1.0, 0.0, 0.0], "too old to see", &hr()).await;
    for i in 0..100 {
        cache.store(&format!("filler {i}"), &[0.0, 1.0, 0.0], "filler", &hr()).await;
    }
    assert!(cache.lookup("oldest", &[1.0, 0.0, 0.0], &hr()).await.is_none());

    cache.store("newest", &[1.0, 0.0, 0.0], "visible", &hr()).await;
    assert_eq!(cache.lookup("x", &[1.0, 0.0, 0.0], &hr()).await.unwrap().response, "visible");
}

#[tokio::test]
async fn store_also_fills_embedding_namespace() {
    let backend = Arc::new(MemoryCacheBackend::new());
    let cache = cache(backend.clone());
    assert!(cache.get_embedding("q").await.is_none());

    cache.store("q", &[0.5, 0.5, 0.0], "r", &hr()).await;
    assert_eq!(cache.get_embedding("q").await, Some(vec![0.5, 0.5, 0.0]));
    assert!(backend.get(&embedding_key("q")).await.unwrap().is_some());
    assert!(backend.get(&response_key(&hr(), "q")).await.unwrap().is_some());

    cache.set_embedding("other", &[0.0, 0.0, 1.0]).await;
    assert_eq!(cache.get_embedding("other").await, Some(vec![0.0, 0.0, 1.0]));
}

#[tokio::test]
async fn wrong_dimension_is_not_stored() {
    let backend = Arc::new(MemoryCacheBackend::new());
    let cache = cache(backend.clone());
    cache.store("q", &[1.0, 0.0], "r", &hr()).await;
    assert!(backend.is_empty());
}

#[tokio::test]
async fn invalidate_removes_only_that_domain() {
    let cache = cache(Arc::new(MemoryCacheBackend::new()));
    cache.store("a", &[1.0, 0.0, 0.0], "1", &hr()).await;
    cache.store("b", &[0.0, 1.0, 0.0], "2", &hr()).await;
    cache.store("c", &[1.0, 0.0, 0.0], "3", &Domain::general()).await;

    assert_eq!(cache.invalidate(&hr()).await, 2);
    assert!(cache.lookup("a", &[1.0, 0.0, 0.0], &hr()).await.is_none());
    assert!(cache.lookup("c", &[1.0, 0.0, 0.0], &Domain::general()).await.is_some());
    assert_eq!(cache.invalidate(&hr()).await, 0);
}

#[tokio::test]
async fn backend_ttl_expires_keys() {
    let backend = MemoryCacheBackend::new();
    backend.set("k", "v".into(), Duration::from_millis(20)).await.unwrap();
    assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(backend.get("k").await.unwrap().is_none());
    assert!(backend.scan_prefix("", None).await.unwrap().is_empty());
}

struct BrokenBackend {
    hang: bool,
}

#[async_trait]
impl CacheBackend for BrokenBackend {
    async fn set(&self, _: &str, _: String, _: Duration) -> Result<()> {
        Err(Error::connectivity("test-cache", "connection reset"))
    }

    async fn get(&self, _: &str) -> Result<Option<String>> {
        Err(Error::connectivity("test-cache", "connection reset"))
    }

    async fn scan_prefix(&self, _: &str, _: Option<usize>) -> Result<Vec<String>> {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Err(Error::connectivity("test-cache", "connection reset"))
    }

    async fn delete(&self, _: &[String]) -> Result<usize> {
        Err(Error::connectivity("test-cache", "connection reset"))
    }
}

#[tokio::test]
async fn unavailable_backend_degrades_to_miss() {
    for hang in [false, true] {
        let settings = CacheSettings { timeout_ms: 50, ..CacheSettings::default() };
        let cache = SemanticCache::new(Arc::new(BrokenBackend { hang }), settings, 3);
        cache.store("q", &[1.0, 0.0, 0.0], "r", &hr()).await;
        assert!(cache.lookup("q", &[1.0, 0.0, 0.0], &hr()).await.is_none());
        assert!(cache.get_embedding("q").await.is_none());
        assert_eq!(cache.invalidate(&hr()).await, 0);
    }
}

fn request_count(snapshot: &[(CompositeKey, Option<Unit>, Option<SharedString>, DebugValue)], kind: &str, hit: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, ..)| {
            let labels: Vec<(&str, &str)> = key.key().labels().map(|l| (l.key(), l.value())).collect();
            key.key().name() == CACHE_REQUESTS_METRIC && labels.contains(&("type", kind)) && labels.contains(&("hit", hit))
        })
        .map(|(.., value)| match value {
            DebugValue::Counter(n) => *n,
            _ => 0,
        })
        .sum()
}

#[test]
fn hits_and_misses_are_counted_per_namespace() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let cache = cache(Arc::new(MemoryCacheBackend::new()));
            assert!(cache.get_embedding("vacation").await.is_none());
            cache.store("vacation", &[1.0, 0.0, 0.0], "Twenty.", &hr()).await;
            assert!(cache.get_embedding("vacation").await.is_some());
            assert!(cache.lookup("vacation", &[1.0, 0.0, 0.0], &hr()).await.is_some());
            assert!(cache.lookup("parking", &[0.0, 1.0, 0.0], &hr()).await.is_none());
            assert!(cache.lookup("parking", &[0.0, 0.0, 1.0], &hr()).await.is_none());
        });
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(request_count(&snapshot, "embedding", "true"), 1);
    assert_eq!(request_count(&snapshot, "embedding", "false"), 1);
    assert_eq!(request_count(&snapshot, "response", "true"), 1);
    assert_eq!(request_count(&snapshot, "response", "false"), 2);
}
