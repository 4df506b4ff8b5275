//! Progressive page loading: a small page now, a larger one in the background.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Something that can fetch up to `limit` items
#[async_trait]
pub trait PageSource<T: Send>: Send + Sync {
    type Error: Display + Send;

    async fn fetch(&self, limit: usize) -> Result<Vec<T>, Self::Error>;
}

#[async_trait]
impl<T, E, F, Fut> PageSource<T> for F
where
    F: Fn(usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<T>, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    type Error = E;

    async fn fetch(&self, limit: usize) -> Result<Vec<T>, E> {
        (self)(limit).await
    }
}

/// Which fetch a progress callback is reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Initial,
    Complete,
}

pub type ProgressCallback<T> = Arc<dyn Fn(&[T], LoadPhase) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressiveOptions {
    pub initial_limit: usize,
    pub full_limit: usize,
    /// Pause before the background fetch starts
    #[serde(rename = "background_delay_ms", with = "crate::config::duration_ms")]
    pub background_delay: Duration,
}

impl Default for ProgressiveOptions {
    fn default() -> Self {
        Self {
            initial_limit: 20,
            full_limit: 100,
            background_delay: Duration::from_millis(100),
        }
    }
}

/// Result of [`progressive_load`]
#[derive(Debug)]
pub struct ProgressiveLoad<T> {
    pub initial: Vec<T>,
    /// Set when the initial page was full and a larger fetch was scheduled
    pub background: Option<JoinHandle<()>>,
}

impl<T> ProgressiveLoad<T> {
    pub fn has_more(&self) -> bool {
        self.background.is_some()
    }
}

/// Fetch `initial_limit` items and return them. If the page came back full,
/// a background task fetches `full_limit` items after `background_delay`.
///
/// `on_progress` sees the initial page with [`LoadPhase::Initial`] and the
/// background page with [`LoadPhase::Complete`]. An initial failure is
/// returned; a background failure is only logged.
pub async fn progressive_load<T, S>(
    source: Arc<S>,
    options: &ProgressiveOptions,
    on_progress: Option<ProgressCallback<T>>,
) -> Result<ProgressiveLoad<T>, S::Error>
where
    T: Send + Sync + 'static,
    S: PageSource<T> + 'static,
{
    let initial = source.fetch(options.initial_limit).await?;
    if let Some(callback) = &on_progress {
        callback(&initial, LoadPhase::Initial);
    }

    if initial.len() < options.initial_limit {
        log::debug!("Initial page of {} items is complete", initial.len());
        return Ok(ProgressiveLoad {
            initial,
            background: None,
        });
    }

    let full_limit = options.full_limit;
    let delay = options.background_delay;
    let background = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match source.fetch(full_limit).await {
            Ok(full) => {
                log::debug!("Background page loaded {} items", full.len());
                if let Some(callback) = &on_progress {
                    callback(&full, LoadPhase::Complete);
                }
            }
            Err(error) => log::warn!("Background load of {} items failed: {}", full_limit, error),
        }
    });

    Ok(ProgressiveLoad {
        initial,
        background: Some(background),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    type Events = Arc<Mutex<Vec<(usize, LoadPhase)>>>;

    fn progress(events: &Events) -> Option<ProgressCallback<u32>> {
        let events = events.clone();
        Some(Arc::new(move |items: &[u32], phase: LoadPhase| events.lock().push((items.len(), phase))))
    }

    /// Serves `available` items and optionally fails requests above a size
    struct DatasetPages {
        available: u32,
        fail_above: Option<usize>,
        requested: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl PageSource<u32> for DatasetPages {
        type Error = String;

        async fn fetch(&self, limit: usize) -> Result<Vec<u32>, String> {
            self.requested.lock().push(limit);
            if self.fail_above.is_some_and(|max| limit > max) {
                return Err(format!("limit {} rejected", limit));
            }
            Ok((0..self.available).take(limit).collect())
        }
    }

    fn pages(available: u32, fail_above: Option<usize>) -> Arc<DatasetPages> {
        Arc::new(DatasetPages {
            available,
            fail_above,
            requested: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_initial_page_loads_more_in_background() {
        let source = pages(500, None);
        let events = Events::default();

        let load = progressive_load(source.clone(), &ProgressiveOptions::default(), progress(&events))
            .await
            .unwrap();
        assert_eq!(load.initial.len(), 20);
        assert!(load.has_more());
        assert_eq!(*events.lock(), vec![(20, LoadPhase::Initial)]);

        load.background.unwrap().await.unwrap();
        assert_eq!(
            *events.lock(),
            vec![(20, LoadPhase::Initial), (100, LoadPhase::Complete)]
        );
        assert_eq!(*source.requested.lock(), vec![20, 100]);
    }

    #[tokio::test]
    async fn test_short_initial_page_stops_there() {
        let source = pages(5, None);
        let events = Events::default();

        let load = progressive_load(source.clone(), &ProgressiveOptions::default(), progress(&events))
            .await
            .unwrap();

        assert_eq!(load.initial, vec![0, 1, 2, 3, 4]);
        assert!(!load.has_more());
        assert_eq!(*events.lock(), vec![(5, LoadPhase::Initial)]);
        assert_eq!(*source.requested.lock(), vec![20]);
    }

    #[tokio::test]
    async fn test_initial_failure_is_returned() {
        let options = ProgressiveOptions {
            initial_limit: 50,
            full_limit: 200,
            ..ProgressiveOptions::default()
        };
        let result = progressive_load(pages(500, Some(10)), &options, None).await;

        assert_eq!(result.unwrap_err(), "limit 50 rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_failure_is_swallowed() {
        let source = pages(500, Some(20));
        let events = Events::default();

        let load = progressive_load(source.clone(), &ProgressiveOptions::default(), progress(&events))
            .await
            .unwrap();
        assert!(load.background.unwrap().await.is_ok());

        assert_eq!(*events.lock(), vec![(20, LoadPhase::Initial)]);
        assert_eq!(*source.requested.lock(), vec![20, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closure_source() {
        let options = ProgressiveOptions {
            initial_limit: 2,
            full_limit: 4,
            background_delay: Duration::from_millis(1),
        };
        let source = Arc::new(|limit: usize| async move { Ok::<_, String>(vec!["row"; limit]) });

        let load = progressive_load(source, &options, None).await.unwrap();
        assert_eq!(load.initial, vec!["row", "row"]);
        load.background.unwrap().await.unwrap();
    }
}
