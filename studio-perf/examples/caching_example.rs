use std::sync::Arc;
use std::time::{Duration, Instant};
use studio_perf::{cache_key, LruCache, PerformanceConfig, PerformanceContext};

/// Stand-in for a slow wallet lookup against the backing store
async fn load_wallet_files(user: &str) -> Result<Vec<String>, String> {
    tokio::time::sleep(Duration::from_millis(250)).await;
    Ok(vec![
        format!("{}/github-export.json", user),
        format!("{}/notes.md", user),
    ])
}

async fn wallet_files(context: &PerformanceContext, cache: &LruCache<String, Vec<String>>, user: &str) -> Vec<String> {
    let key = cache_key(["wallet", user]);
    if let Some(files) = cache.get(&key) {
        return files;
    }

    let owned_user = user.to_string();
    let files = context
        .deduplicator()
        .execute(&key, move || async move { load_wallet_files(&owned_user).await })
        .await
        .unwrap_or_default();
    cache.set(key, files.clone());
    files
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => PerformanceConfig::load(path)?,
        None => PerformanceConfig::default(),
    };
    let context = Arc::new(PerformanceContext::new(config));
    let cache = context.cache::<String, Vec<String>>();

    // Example 1: concurrent identical lookups share one backend call
    println!("=== Deduplicated lookups ===");
    let start = Instant::now();
    let (first, second) = tokio::join!(
        wallet_files(&context, &cache, "ada"),
        wallet_files(&context, &cache, "ada")
    );
    println!("Two concurrent lookups took: {:?}", start.elapsed());
    println!("Found {} and {} files", first.len(), second.len());

    // Example 2: a repeated lookup is served from cache
    println!("\n=== Cached lookup ===");
    let start = Instant::now();
    let files = wallet_files(&context, &cache, "ada").await;
    println!("Cached lookup took: {:?} ({} files)", start.elapsed(), files.len());
    println!("Cache stats: {:?}", cache.stats());

    // Example 3: many small requests coalesced into batches
    println!("\n=== Batched requests ===");
    let handles: Vec<_> = (0..25)
        .map(|i| {
            context.batch_executor().add(format!("access-request-{}", i), move || async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                i * 2
            })
        })
        .collect();
    let start = Instant::now();
    let results = futures::future::join_all(handles).await;
    let completed = results.iter().filter(|result| result.is_ok()).count();
    println!("{} batched requests completed in {:?}", completed, start.elapsed());

    Ok(())
}
