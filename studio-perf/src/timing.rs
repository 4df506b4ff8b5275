//! Call-rate helpers: debounce and throttle.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Callback<A> = Box<dyn Fn(A) + Send + Sync>;

#[derive(Default)]
struct DebounceState {
    timer: Option<JoinHandle<()>>,
    /// Identifies the armed timer; a timer that wakes up with an older value
    /// was superseded and must not fire.
    generation: u64,
}

struct DebounceInner<A> {
    callback: Callback<A>,
    delay: Duration,
    state: Mutex<DebounceState>,
}

/// Defers a callback until `delay` has passed without another call.
///
/// Every [`call`](Debouncer::call) restarts the timer and replaces the
/// arguments, so the callback runs once with the most recent ones. Timers are
/// tokio tasks; calls must happen inside a runtime.
pub struct Debouncer<A> {
    inner: Arc<DebounceInner<A>>,
}

impl<A> Clone for Debouncer<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> Debouncer<A> {
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DebounceInner {
                callback: Box::new(callback),
                delay,
                state: Mutex::new(DebounceState::default()),
            }),
        }
    }

    pub fn call(&self, args: A) {
        let mut state = self.inner.state.lock();
        if let Some(previous) = state.timer.take() {
            previous.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        let inner = Arc::clone(&self.inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            {
                let mut state = inner.state.lock();
                if state.generation != generation {
                    return;
                }
                state.timer = None;
            }
            (inner.callback)(args);
        }));
    }

    /// Drop the pending call, if any
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(previous) = state.timer.take() {
            previous.abort();
            log::debug!("Cancelled debounced call");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }
}

/// Build a [`Debouncer`] around `callback`
pub fn debounce<A, F>(callback: F, delay: Duration) -> Debouncer<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    Debouncer::new(delay, callback)
}

/// Runs a callback at most once per `limit`.
///
/// The first call goes through immediately; calls within `limit` of the last
/// one that went through are dropped.
pub struct Throttle<A> {
    callback: Callback<A>,
    limit: Duration,
    last_run: Mutex<Option<Instant>>,
}

impl<A> Throttle<A> {
    pub fn new<F>(limit: Duration, callback: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
            limit,
            last_run: Mutex::new(None),
        }
    }

    /// Returns whether the callback ran
    pub fn call(&self, args: A) -> bool {
        let now = Instant::now();
        {
            let mut last_run = self.last_run.lock();
            if let Some(at) = *last_run {
                if now.duration_since(at) < self.limit {
                    return false;
                }
            }
            *last_run = Some(now);
        }

        (self.callback)(args);
        true
    }
}

/// Build a [`Throttle`] around `callback`
pub fn throttle<A, F>(callback: F, limit: Duration) -> Throttle<A>
where
    F: Fn(A) + Send + Sync + 'static,
{
    Throttle::new(limit, callback)
}
