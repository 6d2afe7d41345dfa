//! Cycle triggering.
//!
//! At most one cycle runs at a time. A trigger that finds a cycle running is
//! dropped, not queued.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cache::DirectoryCache;
use crate::engine::{CycleOutcome, ReconciliationEngine};
use crate::refresher::{CacheRefresher, RefreshOutcome};
use crate::report::SyncReport;

/// Single-slot exclusion token for sync cycles.
#[derive(Debug, Default)]
pub struct CycleGate {
    running: AtomicBool,
}

impl CycleGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot if it is free. The slot is released when the returned
    /// guard is dropped, including during unwinding.
    #[must_use]
    pub fn try_acquire(&self) -> Option<CycleGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { gate: self })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Holds the [`CycleGate`] slot.
#[derive(Debug)]
pub struct CycleGuard<'a> {
    gate: &'a CycleGate,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}

/// Timing of the periodic trigger.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay before the first cycle (default: 5s).
    pub initial_delay: Duration,
    /// Delay between the end of one cycle and the start of the next (default: 5 min).
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(300),
        }
    }
}

/// Result of a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Another cycle was running; nothing was done.
    Skipped,
    /// The cache was refreshed and a cycle ran.
    Ran {
        refresh: RefreshOutcome,
        cycle: CycleOutcome,
    },
    /// The cycle task panicked or was cancelled by runtime shutdown.
    Failed(String),
}

/// Runs refresh-then-sync cycles on demand and on a fixed delay.
pub struct SyncScheduler {
    gate: CycleGate,
    refresher: CacheRefresher,
    engine: ReconciliationEngine,
    config: SchedulerConfig,
    cycles: AtomicU64,
    last_report: RwLock<Option<SyncReport>>,
}

impl SyncScheduler {
    pub fn new(
        refresher: CacheRefresher,
        engine: ReconciliationEngine,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            gate: CycleGate::new(),
            refresher,
            engine,
            config,
            cycles: AtomicU64::new(0),
            last_report: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn gate(&self) -> &CycleGate {
        &self.gate
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<DirectoryCache> {
        self.engine.cache()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    /// Number of cycles that ran to completion or abort.
    #[must_use]
    pub fn cycles_run(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Report of the last completed cycle.
    #[must_use]
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().clone()
    }

    /// Refreshes the cache and runs one cycle, unless a cycle is already
    /// running.
    ///
    /// The cycle runs on its own task and holds the gate there. Dropping the
    /// returned future stops only the wait; the cycle finishes and the gate
    /// stays taken until it does.
    pub async fn trigger(self: &Arc<Self>, reason: &str) -> TriggerOutcome {
        let scheduler = Arc::clone(self);
        let reason = reason.to_string();
        let cycle = tokio::spawn(async move { scheduler.run_exclusive(&reason).await });

        match cycle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Sync cycle task failed");
                TriggerOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run_exclusive(&self, reason: &str) -> TriggerOutcome {
        let Some(_guard) = self.gate.try_acquire() else {
            warn!(reason, "Previous sync still running, skipping this run");
            return TriggerOutcome::Skipped;
        };

        info!(reason, "Sync cycle starting");
        let refresh = self.refresher.refresh().await;
        let cycle = self.engine.run_cycle().await;
        self.cycles.fetch_add(1, Ordering::Relaxed);

        if let CycleOutcome::Completed(report) = &cycle {
            *self.last_report.write() = Some(report.clone());
        }
        TriggerOutcome::Ran { refresh, cycle }
    }

    /// Runs cycles until `shutdown` resolves: first after the initial delay,
    /// then again each time the interval has passed since the previous cycle
    /// finished.
    pub async fn run_periodic<S>(self: Arc<Self>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let schedule = async {
            tokio::time::sleep(self.config.initial_delay).await;
            loop {
                self.trigger("scheduled").await;
                tokio::time::sleep(self.config.interval).await;
            }
        };

        tokio::select! {
            _ = schedule => {}
            () = shutdown => {
                info!("Periodic sync stopping");
                self.engine.close();
            }
        }
    }
}
