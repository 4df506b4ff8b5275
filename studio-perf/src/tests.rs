use crate::batch::{BatchConfig, BatchExecutor};
use crate::cache::{cache_key, LruCache};
use crate::deduplication::RequestDeduplicator;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[test]
fn test_cache_scenario() {
    let cache = LruCache::with_capacity(2, Duration::from_secs(300));
    cache.set("a", 1);
    cache.set("b", 2);
    cache.get("a");
    cache.set("c", 3);

    assert!(!cache.has("b"));
    assert!(cache.has("a"));
    assert!(cache.has("c"));
}

#[tokio::test(start_paused = true)]
async fn test_deduplication_scenario() {
    let deduplicator = RequestDeduplicator::default();
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = |calls: Arc<AtomicUsize>| {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                sleep(Duration::from_millis(200)).await;
                Ok::<&'static str, String>("dataset-42")
            }
        }
    };

    let first = deduplicator.execute("x", slow(calls.clone()));
    let second = deduplicator.execute("x", slow(calls.clone()));
    let (a, b) = tokio::join!(first, second);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a, Ok("dataset-42"));
    assert_eq!(b, Ok("dataset-42"));
}

#[tokio::test(start_paused = true)]
async fn test_batch_scenario() {
    let executor = BatchExecutor::new(BatchConfig {
        max_batch_size: 3,
        ..BatchConfig::default()
    });
    let order = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let order = order.clone();
            executor.add(format!("probe-{}", i), move || async move {
                order.lock().push(format!("start {}", i));
                sleep(Duration::from_millis(10 * (i + 1))).await;
                order.lock().push(format!("end {}", i));
            })
        })
        .collect();
    join_all(handles).await;

    let order = order.lock().clone();
    assert_eq!(
        order,
        vec!["start 0", "start 1", "start 2", "end 0", "end 1", "end 2"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cached_and_deduplicated_fetch() {
    let cache: Arc<LruCache<String, Vec<String>>> = Arc::new(LruCache::with_capacity(10, Duration::from_secs(60)));
    let deduplicator = Arc::new(RequestDeduplicator::default());
    let backend_calls = Arc::new(AtomicUsize::new(0));

    let fetch_wallet = |user: &'static str| {
        let cache = cache.clone();
        let deduplicator = deduplicator.clone();
        let backend_calls = backend_calls.clone();
        async move {
            let key = cache_key(["wallet", user]);
            if let Some(files) = cache.get(&key) {
                return files;
            }

            let files = deduplicator
                .execute(&key, move || {
                    backend_calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>(vec![format!("{}/readme.md", user)])
                    }
                })
                .await
                .unwrap();
            cache.set(key, files.clone());
            files
        }
    };

    let results = join_all([fetch_wallet("ada"), fetch_wallet("ada"), fetch_wallet("grace")]).await;
    assert_eq!(results[0], vec!["ada/readme.md".to_string()]);
    assert_eq!(results[0], results[1]);
    assert_eq!(backend_calls.load(Ordering::SeqCst), 2);

    // Served from cache without touching the backend
    assert_eq!(fetch_wallet("grace").await, vec!["grace/readme.md".to_string()]);
    assert_eq!(backend_calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().hits, 1);
}
