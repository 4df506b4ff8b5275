use crate::error::BatchError;
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Configuration for batched execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Queue length that triggers an immediate flush
    pub max_batch_size: usize,
    /// How long the first queued item waits for company before flushing
    #[serde(rename = "batch_delay_ms", with = "crate::config::duration_ms")]
    pub batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            batch_delay: Duration::from_millis(10),
        }
    }
}

struct BatchItem {
    key: String,
    task: BoxFuture<'static, ()>,
}

#[derive(Default)]
struct BatchState {
    queue: Vec<BatchItem>,
    processing: bool,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever a timer is armed or cancelled; a timer that wakes up
    /// with a stale generation does nothing.
    timer_generation: u64,
}

impl BatchState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.timer_generation += 1;
    }
}

struct BatchInner {
    config: BatchConfig,
    state: Mutex<BatchState>,
}

impl BatchInner {
    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size.max(1)
    }

    fn arm_timer(inner: &Arc<Self>, state: &mut BatchState) {
        state.timer_generation += 1;
        let generation = state.timer_generation;
        let delay = inner.config.batch_delay;
        let timer_inner = Arc::clone(inner);

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = timer_inner.state.lock();
            if state.timer_generation != generation {
                return;
            }
            state.timer = None;
            Self::flush_locked(&timer_inner, &mut state);
        }));
    }

    fn flush_locked(inner: &Arc<Self>, state: &mut BatchState) {
        if state.processing || state.queue.is_empty() {
            return;
        }

        state.cancel_timer();
        let take = state.queue.len().min(inner.max_batch_size());
        let batch: Vec<BatchItem> = state.queue.drain(..take).collect();
        state.processing = true;

        log::debug!("Flushing batch of {} operations", batch.len());
        tokio::spawn(Arc::clone(inner).run(batch));
    }

    async fn run(self: Arc<Self>, batch: Vec<BatchItem>) {
        let size = batch.len();
        join_all(batch.into_iter().map(|BatchItem { key, task }| async move {
            if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                log::warn!("Batched operation {} panicked", key);
            }
        }))
        .await;
        log::debug!("Batch of {} operations settled", size);

        let mut state = self.state.lock();
        state.processing = false;
        if state.queue.len() >= self.max_batch_size() {
            Self::flush_locked(&self, &mut state);
        } else if !state.queue.is_empty() && state.timer.is_none() {
            Self::arm_timer(&self, &mut state);
        }
    }
}

/// Coalesces small asynchronous operations issued close together into
/// batches that run concurrently.
///
/// A batch flushes when the queue reaches `max_batch_size` or when
/// `batch_delay` has passed since the first item was queued. Only one batch
/// runs at a time; items added meanwhile wait for the next flush.
///
/// Flushes are spawned onto the current tokio runtime, so [`add`] must be
/// called from within one.
///
/// [`add`]: BatchExecutor::add
#[derive(Clone)]
pub struct BatchExecutor {
    inner: Arc<BatchInner>,
}

impl BatchExecutor {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            inner: Arc::new(BatchInner {
                config,
                state: Mutex::new(BatchState::default()),
            }),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Queue an operation. It is not invoked until its batch flushes, and the
    /// returned handle yields exactly what the operation produced.
    pub fn add<R, F, Fut>(&self, key: impl Into<String>, operation: F) -> BatchHandle<R>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let task = async move {
            // The caller may have stopped waiting
            let _ = sender.send(operation().await);
        }
        .boxed();

        let mut state = self.inner.state.lock();
        state.queue.push(BatchItem {
            key: key.into(),
            task,
        });

        if state.queue.len() >= self.inner.max_batch_size() {
            BatchInner::flush_locked(&self.inner, &mut state);
        } else if state.timer.is_none() && !state.processing {
            BatchInner::arm_timer(&self.inner, &mut state);
        }

        BatchHandle { receiver }
    }

    /// Flush the queue now instead of waiting for the delay.
    /// Does nothing while a batch is already running.
    pub fn flush(&self) {
        let mut state = self.inner.state.lock();
        BatchInner::flush_locked(&self.inner, &mut state);
    }

    /// Number of operations waiting for a flush
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().processing
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

/// Pending outcome of a batched operation
pub struct BatchHandle<R> {
    receiver: oneshot::Receiver<R>,
}

impl<R> Future for BatchHandle<R> {
    type Output = Result<R, BatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| BatchError::Dropped))
    }
}

/// Thread-safe wrapper for the batch executor
pub type SharedBatchExecutor = Arc<BatchExecutor>;
