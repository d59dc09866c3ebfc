//! Concurrency limiter for fetch operations
//!
//! Bounds how many tasks run at once. Tasks beyond the bound wait in a
//! queue and are admitted in submission order as permits are released.
//!
//! The queue is tokio's [`Semaphore`], which is fair: waiters are served
//! strictly in the order they started waiting, and a released permit goes
//! to exactly one waiter.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::debug;

use crate::retrieval::core::{Result, RetrievalError};

/// Bounded admission of asynchronous tasks
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Semaphore,
    permits: usize,
    /// Tasks currently holding a permit
    in_flight: AtomicUsize,
    /// Highest `in_flight` value observed since construction
    peak_in_flight: AtomicUsize,
}

impl ConcurrencyLimiter {
    /// Create a limiter allowing `permits` concurrent tasks (at least 1)
    pub fn new(permits: usize) -> Result<Self> {
        if permits == 0 {
            return Err(RetrievalError::configuration("concurrency", "limiter needs at least one permit"));
        }

        Ok(Self {
            semaphore: Semaphore::new(permits),
            permits,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    /// Run `task` once a permit is available
    ///
    /// The permit is released when the task finishes, whether it succeeded,
    /// failed or was dropped. Returns `None` without running the task if the
    /// limiter was closed before a permit could be acquired.
    pub async fn admit<F, T>(&self, task: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self.semaphore.acquire().await.ok()?;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _slot = InFlightSlot(&self.in_flight);
        debug!("Admitted task ({}/{} permits in use)", running, self.permits);

        Some(task.await)
    }

    /// Stop admitting: every queued and future `admit` call returns `None`
    ///
    /// Tasks already running are unaffected.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter when the admitted task ends
struct InFlightSlot<'a>(&'a AtomicUsize);

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn zero_permits_is_a_configuration_error() {
        assert!(matches!(
            ConcurrencyLimiter::new(0),
            Err(RetrievalError::Configuration { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_permits() {
        let limiter = ConcurrencyLimiter::new(3).unwrap();
        let observed_max = AtomicUsize::new(0);

        let tasks = (0..10).map(|_| {
            let limiter = &limiter;
            let observed_max = &observed_max;
            limiter.admit(async move {
                observed_max.fetch_max(limiter.in_flight(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
            })
        });
        let results = join_all(tasks).await;

        assert!(results.iter().all(Option::is_some));
        assert_eq!(observed_max.load(Ordering::SeqCst), 3);
        assert_eq!(limiter.peak_in_flight(), 3);
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.available_permits(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_tasks_start_in_submission_order() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        let started = Mutex::new(Vec::new());

        let tasks = (0..5).map(|i| {
            let limiter = &limiter;
            let started = &started;
            async move {
                limiter
                    .admit(async move {
                        started.lock().unwrap().push(i);
                        tokio::time::sleep(Duration::from_millis(10 * (5 - i as u64))).await;
                    })
                    .await
            }
        });
        join_all(tasks).await;

        assert_eq!(*started.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failing_task_releases_its_permit() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();

        let first: Option<std::result::Result<(), &str>> = limiter.admit(async { Err("boom") }).await;
        assert_eq!(first, Some(Err("boom")));

        let second = limiter.admit(async { 7 }).await;
        assert_eq!(second, Some(7));
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_rejects_queued_tasks_but_lets_running_finish() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        let ran = AtomicUsize::new(0);

        let ran = &ran;
        let running = limiter.admit(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ran.fetch_add(1, Ordering::SeqCst);
        });
        let queued = limiter.admit(async move {
            ran.fetch_add(1, Ordering::SeqCst);
        });
        let closer = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            limiter.close();
        };

        let (running, queued, ()) = tokio::join!(running, queued, closer);

        assert!(running.is_some());
        assert!(queued.is_none());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(limiter.is_closed());
    }
}
