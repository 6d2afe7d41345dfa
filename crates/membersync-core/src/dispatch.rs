//! Bounded-concurrency dispatch of remote operations.
//!
//! A [`BoundedDispatcher`] caps how many operations of one class (invites,
//! membership changes) are in flight at once. The cap is independent of the
//! runtime's worker pool. Each dispatched unit runs on its own task, so a
//! per-operation timeout only abandons the wait for its result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Holds one admission slot; the slot is released on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

/// Runs async units under a counting admission limiter.
#[derive(Debug, Clone)]
pub struct BoundedDispatcher {
    name: Arc<str>,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl BoundedDispatcher {
    /// Creates a dispatcher admitting at most `capacity` concurrent units,
    /// each abandoned after `timeout`. A zero capacity is raised to one.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, capacity: usize, timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            timeout,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of units that could be admitted right now.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for an admission slot.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Interrupted`] if the limiter was closed while
    /// waiting.
    pub async fn acquire(&self) -> SyncResult<AdmissionPermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SyncError::Interrupted {
                limiter: self.name.to_string(),
            })?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Closes the limiter. Waiting and future acquisitions fail with
    /// [`SyncError::Interrupted`]; units already admitted keep running.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Dispatches `unit` and waits at most the configured timeout for it.
    ///
    /// The slot is held only while `unit` runs. On timeout the unit keeps
    /// running detached and its result is dropped.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Timeout`] if the unit did not finish in time
    /// - [`SyncError::Interrupted`] if admission was interrupted
    /// - [`SyncError::TaskFailed`] if the unit panicked
    /// - any error returned by the unit itself
    pub async fn run<F, Fut, T>(&self, unit: F) -> SyncResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let dispatcher = self.clone();
        let handle = tokio::spawn(async move {
            let _permit = dispatcher.acquire().await?;
            unit().await
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(SyncError::TaskFailed(join_error.to_string())),
            Err(_) => {
                debug!(limiter = %self.name, timeout = ?self.timeout, "Abandoning wait for unit");
                Err(SyncError::Timeout {
                    operation: self.name.to_string(),
                    after: self.timeout,
                })
            }
        }
    }
}

/// How a phase's task set finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseOutcome {
    /// Tasks whose result was collected.
    pub completed: usize,
    /// Tasks that panicked.
    pub panicked: usize,
    /// Tasks still running when the deadline passed.
    pub detached: usize,
}

impl PhaseOutcome {
    /// Whether the deadline cut the phase short.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.detached > 0
    }
}

/// Collects every result of `tasks`, giving up at `deadline`.
///
/// Results are handed to `on_result` as they arrive. Tasks still running at
/// the deadline are detached: they keep going, but nothing waits for them and
/// nothing they already committed is undone.
pub async fn drain_phase<T, C>(
    phase: &str,
    tasks: &mut JoinSet<T>,
    deadline: Duration,
    mut on_result: C,
) -> PhaseOutcome
where
    T: Send + 'static,
    C: FnMut(T),
{
    let mut outcome = PhaseOutcome::default();

    let drained = tokio::time::timeout(deadline, async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(value) => {
                    outcome.completed += 1;
                    on_result(value);
                }
                Err(e) => {
                    outcome.panicked += 1;
                    warn!(phase, error = %e, "Phase task failed to complete");
                }
            }
        }
    })
    .await;

    if drained.is_err() {
        outcome.detached = tasks.len();
        tasks.detach_all();
        warn!(
            phase,
            deadline_secs = deadline.as_secs(),
            completed = outcome.completed,
            detached = outcome.detached,
            "Phase deadline exceeded, continuing with partial results"
        );
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_run_returns_unit_result() {
        let dispatcher = BoundedDispatcher::new("invite", 2, Duration::from_secs(5));

        let value = dispatcher.run(|| async { Ok(7) }).await.unwrap();

        assert_eq!(value, 7);
        assert_eq!(dispatcher.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_unit_errors_pass_through_and_release_slot() {
        let dispatcher = BoundedDispatcher::new("membership", 1, Duration::from_secs(5));

        let result: SyncResult<()> = dispatcher
            .run(|| async { Err(SyncError::Source("boom".into())) })
            .await;

        assert!(matches!(result, Err(SyncError::Source(_))));
        assert_eq!(dispatcher.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_capacity_bounds_in_flight_units() {
        let dispatcher = BoundedDispatcher::new("membership", 3, Duration::from_secs(5));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for _ in 0..20 {
            let dispatcher = dispatcher.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            tasks.spawn(async move {
                dispatcher
                    .run(move || async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(dispatcher.available_permits(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_detaches_unit() {
        let dispatcher = BoundedDispatcher::new("invite", 1, Duration::from_secs(1));
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();

        let result: SyncResult<()> = dispatcher
            .run(move || async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_timeout());
        assert_eq!(dispatcher.available_permits(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_close_interrupts_waiters() {
        let dispatcher = BoundedDispatcher::new("invite", 1, Duration::from_secs(5));
        let held = dispatcher.acquire().await.unwrap();

        let waiting = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(|| async { Ok(()) }).await })
        };
        tokio::task::yield_now().await;
        dispatcher.close();

        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(SyncError::Interrupted { ref limiter }) if limiter == "invite"));
        drop(held);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let dispatcher = BoundedDispatcher::new("invite", 0, Duration::from_secs(1));
        assert_eq!(dispatcher.capacity(), 1);
    }

    #[tokio::test]
    async fn test_drain_phase_collects_all_results() {
        let mut tasks = JoinSet::new();
        for i in 0..5 {
            tasks.spawn(async move { i });
        }
        let mut sum = 0;

        let outcome = drain_phase("test", &mut tasks, Duration::from_secs(5), |v| sum += v).await;

        assert_eq!(sum, 10);
        assert_eq!(outcome.completed, 5);
        assert!(!outcome.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_phase_deadline_detaches_stragglers() {
        let mut tasks = JoinSet::new();
        tasks.spawn(async { 1 });
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            2
        });
        let mut seen = Vec::new();

        let outcome =
            drain_phase("slow", &mut tasks, Duration::from_secs(1), |v| seen.push(v)).await;

        assert_eq!(seen, [1]);
        assert_eq!(outcome.detached, 1);
        assert!(outcome.is_degraded());
        assert!(tasks.is_empty());
    }
}
