use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

/// Configuration for request deduplication
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicationConfig {
    /// How long a pending request may be joined before a new call runs again
    #[serde(rename = "request_timeout_ms", with = "crate::config::duration_ms")]
    pub request_timeout: Duration,
    /// Whether deduplication is enabled
    pub enabled: bool,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            enabled: true,
        }
    }
}

/// Per-call overrides for [`RequestDeduplicator::execute_with`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Pending result handed to every caller that joins the same request
pub type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Represents a pending request
struct InFlight {
    id: u64,
    started_at: Instant,
    timeout: Duration,
    /// Always a `SharedResult<T, E>` for the types of the call that created it
    result: Box<dyn Any + Send + Sync>,
}

impl InFlight {
    fn is_expired(&self, timeout: Duration) -> bool {
        self.started_at.elapsed() > timeout
    }
}

/// Request deduplication system
/// When multiple identical requests come in, only the first one is executed
/// and its pending result is shared with every caller that arrives before it
/// completes.
///
/// Entries are type-erased so one deduplicator can front operations with
/// different result types; the key alone identifies the request.
pub struct RequestDeduplicator {
    /// Map of request keys to pending requests
    in_flight: Arc<DashMap<String, InFlight>>,
    /// Serializes starting new requests
    starting: ReentrantMutex<()>,
    next_id: AtomicU64,
    config: DeduplicationConfig,
}

impl RequestDeduplicator {
    pub fn new(config: DeduplicationConfig) -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            starting: ReentrantMutex::new(()),
            next_id: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &DeduplicationConfig {
        &self.config
    }

    /// Execute an operation with deduplication, using the configured timeout
    pub fn execute<T, E, F, Fut>(&self, key: &str, operation: F) -> SharedResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        self.execute_with(key, operation, ExecuteOptions::default())
    }

    /// Execute an operation with deduplication.
    /// If the same request is already pending and younger than the timeout,
    /// return its result; otherwise invoke `operation` and record it.
    pub fn execute_with<T, E, F, Fut>(
        &self,
        key: &str,
        operation: F,
        options: ExecuteOptions,
    ) -> SharedResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        if !self.config.enabled {
            return operation().boxed().shared();
        }

        let timeout = options.timeout.unwrap_or(self.config.request_timeout);

        // Clean up other expired requests first; this key is judged below
        // against the caller's own timeout.
        self.in_flight
            .retain(|pending_key, pending| pending_key == key || !pending.is_expired(pending.timeout));

        // Held while the operation builds its future. No map lock is held
        // then, so the operation may call back into this deduplicator.
        let _starting = self.starting.lock();
        if let Some(shared) = self.joinable::<T, E>(key, timeout) {
            return shared;
        }

        let (pending, shared) = self.start(key, timeout, operation());
        self.in_flight.insert(key.to_string(), pending);
        shared
    }

    /// The pending result for `key`, if one exists that is still fresh and
    /// was created for the same result type
    fn joinable<T, E>(&self, key: &str, timeout: Duration) -> Option<SharedResult<T, E>>
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let Some(pending) = self.in_flight.get(key) else {
            log::debug!("Executing new request for key: {}", key);
            return None;
        };

        if pending.is_expired(timeout) {
            log::debug!("Pending request expired for key: {}", key);
            return None;
        }
        match pending.result.downcast_ref::<SharedResult<T, E>>() {
            Some(shared) => {
                log::debug!("Request already pending for key: {}", key);
                Some(shared.clone())
            }
            None => {
                log::warn!(
                    "Pending request for key {} has a different result type, replacing it",
                    key
                );
                None
            }
        }
    }

    fn start<T, E, Fut>(&self, key: &str, timeout: Duration, future: Fut) -> (InFlight, SharedResult<T, E>)
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // The map holds this future, so it must not keep the map alive
        let in_flight = Arc::downgrade(&self.in_flight);
        let key = key.to_string();

        let shared = async move {
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            // Only drop our own entry; an expired one may have been replaced.
            if let Some(in_flight) = in_flight.upgrade() {
                in_flight.remove_if(&key, |_, pending| pending.id == id);
            }

            match outcome {
                Ok(result) => {
                    if result.is_err() {
                        log::debug!("Request failed for key: {}, clearing so the next call retries", key);
                    }
                    result
                }
                Err(panic) => {
                    log::warn!("Request panicked for key: {}, clearing so the next call retries", key);
                    std::panic::resume_unwind(panic)
                }
            }
        }
        .boxed()
        .shared();

        let pending = InFlight {
            id,
            started_at: Instant::now(),
            timeout,
            result: Box::new(shared.clone()),
        };
        (pending, shared)
    }

    /// Drop pending requests older than the timeout they were recorded with
    pub fn purge_expired(&self) -> usize {
        let before = self.in_flight.len();
        self.in_flight.retain(|_, pending| !pending.is_expired(pending.timeout));
        let purged = before.saturating_sub(self.in_flight.len());
        if purged > 0 {
            log::debug!("Purged {} expired pending requests", purged);
        }
        purged
    }

    /// Stop tracking a key; callers already holding its result are unaffected
    pub fn clear(&self, key: &str) -> bool {
        self.in_flight.remove(key).is_some()
    }

    /// Clear all pending requests
    pub fn clear_all(&self) {
        self.in_flight.clear();
        log::info!("Request deduplicator cleared");
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Get statistics about pending requests
    pub fn stats(&self) -> DeduplicationStats {
        let expired_requests = self
            .in_flight
            .iter()
            .filter(|entry| entry.value().is_expired(entry.value().timeout))
            .count();

        DeduplicationStats {
            pending_requests: self.in_flight.len(),
            expired_requests,
        }
    }
}

impl Default for RequestDeduplicator {
    fn default() -> Self {
        Self::new(DeduplicationConfig::default())
    }
}

/// Statistics for request deduplication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct DeduplicationStats {
    pub pending_requests: usize,
    pub expired_requests: usize,
}

/// Thread-safe wrapper for the deduplicator
pub type SharedRequestDeduplicator = Arc<RequestDeduplicator>;
