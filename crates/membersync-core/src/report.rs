//! Per-cycle counters and summaries.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic membership counters shared by the tasks of one cycle.
#[derive(Debug, Default)]
pub struct SyncCounters {
    added: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    removed: AtomicU64,
    remove_failed: AtomicU64,
}

impl SyncCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_added(&self) {
        self.added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removed(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove_failed(&self) {
        self.remove_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn added(&self) -> u64 {
        self.added.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn removed(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }

    pub fn remove_failed(&self) -> u64 {
        self.remove_failed.load(Ordering::Relaxed)
    }
}

/// Outcome of one user's membership work within a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MembershipSyncResult {
    pub groups: u32,
    pub added: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl MembershipSyncResult {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Users in the desired state.
    pub users_found: usize,
    /// Groups in scope for this cycle.
    pub groups_found: usize,
    /// Guests created during this cycle.
    pub guests_invited: u64,
    /// Users whose guest id could not be resolved.
    pub guests_failed: u64,
    pub added: u64,
    pub skipped: u64,
    pub failed: u64,
    pub removed: u64,
    pub remove_failed: u64,
    /// Phases that hit their deadline and left tasks running.
    pub degraded_phases: Vec<String>,
}

impl SyncReport {
    pub(crate) fn with_counters(mut self, counters: &SyncCounters) -> Self {
        self.added = counters.added();
        self.skipped = counters.skipped();
        self.failed = counters.failed();
        self.removed = counters.removed();
        self.remove_failed = counters.remove_failed();
        self
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.degraded_phases.is_empty()
    }
}
