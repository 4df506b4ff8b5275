// Caching, deduplication and batching for Datta Studio data fetching

pub mod batch;
pub mod cache;
pub mod config;
pub mod context;
pub mod deduplication;
mod error;
pub mod progressive;
pub mod timing;

#[cfg(test)]
mod tests;

// Re-export for convenience
pub use batch::{BatchConfig, BatchExecutor, BatchHandle, SharedBatchExecutor};
pub use cache::{cache_key, CacheConfig, CacheStats, LruCache, SharedLruCache};
pub use config::PerformanceConfig;
pub use context::{ContextPointer, PerformanceContext};
pub use deduplication::{
    DeduplicationConfig, DeduplicationStats, ExecuteOptions, RequestDeduplicator, SharedRequestDeduplicator,
    SharedResult,
};
pub use error::{BatchError, Error, Result};
pub use progressive::{progressive_load, LoadPhase, PageSource, ProgressCallback, ProgressiveLoad, ProgressiveOptions};
pub use timing::{debounce, throttle, Debouncer, Throttle};
