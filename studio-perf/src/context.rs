use crate::batch::{BatchExecutor, SharedBatchExecutor};
use crate::cache::LruCache;
use crate::config::PerformanceConfig;
use crate::deduplication::{RequestDeduplicator, SharedRequestDeduplicator};
use crate::progressive::{progressive_load, PageSource, ProgressCallback, ProgressiveLoad};
use getset::Getters;
use lazy_static::lazy_static;
use log::info;
use std::hash::Hash;
use std::sync::Arc;

lazy_static! {
    static ref GLOBAL_CONTEXT: PerformanceContext = PerformanceContext::new(PerformanceConfig::default());
}

/// Shared performance helpers for one application.
///
/// Data-fetching code takes a reference to this (or to the pieces it needs)
/// so that deduplication and batching span every caller holding it.
#[derive(Getters)]
#[get = "pub"]
pub struct PerformanceContext {
    deduplicator: SharedRequestDeduplicator,
    batch_executor: SharedBatchExecutor,
    config: PerformanceConfig,
}

impl PerformanceContext {
    pub fn new(config: PerformanceConfig) -> Self {
        let deduplicator = Arc::new(RequestDeduplicator::new(config.deduplication.clone()));
        let batch_executor = Arc::new(BatchExecutor::new(config.batch.clone()));

        info!(
            "Initialized performance context (dedup timeout: {:?}, batch size: {}, batch delay: {:?})",
            config.deduplication.request_timeout, config.batch.max_batch_size, config.batch.batch_delay
        );

        Self {
            deduplicator,
            batch_executor,
            config,
        }
    }

    /// Process-wide default context built from [`PerformanceConfig::default`]
    pub fn global() -> &'static PerformanceContext {
        &GLOBAL_CONTEXT
    }

    /// New cache sized and timed by this context's cache settings
    pub fn cache<K, V>(&self) -> LruCache<K, V>
    where
        K: Hash + Eq,
        V: Clone,
    {
        LruCache::new(self.config.cache.clone())
    }

    /// [`progressive_load`] with this context's page limits
    pub async fn load_progressively<T, S>(
        &self,
        source: Arc<S>,
        on_progress: Option<ProgressCallback<T>>,
    ) -> Result<ProgressiveLoad<T>, S::Error>
    where
        T: Send + Sync + 'static,
        S: PageSource<T> + 'static,
    {
        progressive_load(source, &self.config.progressive, on_progress).await
    }
}

impl Default for PerformanceContext {
    fn default() -> Self {
        Self::new(PerformanceConfig::default())
    }
}

pub type ContextPointer = Arc<PerformanceContext>;
