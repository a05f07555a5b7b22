//! Work dispatcher
//!
//! Runs one task per unit of work. At most `max_concurrency` tasks run at
//! once and a randomized pause follows every `batch_size` launches. All
//! dispatched tasks are joined before results are reported; nothing is
//! cancelled when a sibling fails.

use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{self, Duration};
use tracing::{debug, error, info};

use strata_core::{EngineError, Result};

use crate::config::EngineConfig;

/// Outcomes of a dispatch, in dispatch order
#[derive(Debug)]
pub struct DispatchReport<T> {
    pub outcomes: Vec<(String, Result<T>)>,
}

impl<T> DispatchReport<T> {
    /// Number of failed units
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_err()).count()
    }

    /// All values, or the failure of the earliest dispatched unit that failed
    pub fn into_result(self) -> Result<Vec<T>> {
        self.outcomes.into_iter().map(|(_, result)| result).collect()
    }
}

/// Bounded, batched task launcher
pub struct Dispatcher {
    semaphore: Arc<Semaphore>,
    batch_size: usize,
    delay_min: Duration,
    delay_max: Duration,
}

impl Dispatcher {
    /// Creates a new dispatcher
    ///
    /// # Arguments
    /// * `max_concurrency` - Tasks allowed to run at the same time
    /// * `batch_size` - Launches between two pauses
    /// * `delay_min` / `delay_max` - Bounds of the randomized pause
    pub fn new(
        max_concurrency: usize,
        batch_size: usize,
        delay_min: Duration,
        delay_max: Duration,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            batch_size: batch_size.max(1),
            delay_min,
            delay_max,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.max_concurrency,
            config.batch_size,
            config.batch_delay_min,
            config.batch_delay_max,
        )
    }

    /// Runs every unit and waits for all of them
    pub async fn dispatch<T, F>(&self, units: Vec<(String, F)>) -> DispatchReport<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let mut handles = Vec::with_capacity(units.len());

        for (index, (name, unit)) in units.into_iter().enumerate() {
            if index > 0 && index % self.batch_size == 0 {
                let delay = self.batch_delay();
                debug!("Launched {} task(s), pausing for {:?}", index, delay);
                time::sleep(delay).await;
            }

            // The semaphore is never closed
            let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok();

            info!("Dispatching {}", name);
            let handle = tokio::spawn(async move {
                let _permit = permit;
                unit.await
            });
            handles.push((name, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(EngineError::WorkerPanicked(format!("{}: {}", name, e))),
            };
            match &result {
                Ok(_) => info!("Finished {}", name),
                Err(e) => error!("{} failed: {}", name, e),
            }
            outcomes.push((name, result));
        }

        DispatchReport { outcomes }
    }

    fn batch_delay(&self) -> Duration {
        let min = self.delay_min.as_millis() as u64;
        let max = self.delay_max.as_millis() as u64;
        if max <= min {
            return self.delay_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Unit = Pin<Box<dyn Future<Output = Result<usize>> + Send>>;

    #[tokio::test]
    async fn test_drains_all_then_reports_first_failure() {
        let completed = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(4, 10, Duration::ZERO, Duration::ZERO);

        let units: Vec<(String, Unit)> = (0..10)
            .map(|i| {
                let completed = Arc::clone(&completed);
                let unit: Unit = Box::pin(async move {
                    // Earlier units finish last
                    time::sleep(Duration::from_millis(5 * (10 - i) as u64)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    if [2, 5, 7].contains(&i) {
                        Err(EngineError::NoAccountsFound(format!("unit-{}", i)))
                    } else {
                        Ok(i)
                    }
                });
                (format!("unit-{}", i), unit)
            })
            .collect();

        let report = dispatcher.dispatch(units).await;

        assert_eq!(completed.load(Ordering::SeqCst), 10);
        assert_eq!(report.outcomes.len(), 10);
        assert_eq!(report.failures(), 3);
        match report.into_result() {
            Err(EngineError::NoAccountsFound(name)) => assert_eq!(name, "unit-2"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(2, 10, Duration::ZERO, Duration::ZERO);

        let units: Vec<(String, Unit)> = (0..6)
            .map(|i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                let unit: Unit = Box::pin(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                });
                (format!("unit-{}", i), unit)
            })
            .collect();

        let values = dispatcher.dispatch(units).await.into_result().unwrap();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_pauses_between_batches() {
        let dispatcher = Dispatcher::new(10, 2, Duration::from_millis(20), Duration::from_millis(20));
        let units: Vec<(String, Unit)> = (0..5)
            .map(|i| {
                let unit: Unit = Box::pin(async move { Ok(i) });
                (format!("unit-{}", i), unit)
            })
            .collect();

        let started = time::Instant::now();
        dispatcher.dispatch(units).await.into_result().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
