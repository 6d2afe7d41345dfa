//! Group membership reconciliation engine.
//!
//! This crate keeps a directory's guest users and group memberships in line
//! with the group assignments reported by an upstream user source.
//!
//! # Components
//!
//! - [`DirectoryCache`]: in-memory view of guests, groups and memberships
//! - [`CacheRefresher`]: rebuilds the cache from the directory, swapping it atomically
//! - [`build_desired_state`]: computes which groups each eligible user belongs in
//! - [`BoundedDispatcher`]: caps in-flight remote calls per operation class
//! - [`RetryPolicy`]: exponential backoff with jitter for transient failures
//! - [`ReconciliationEngine`]: runs one sync cycle end to end
//! - [`SyncScheduler`]: single-active-cycle gate, periodic and on-demand triggers
//!
//! The directory and the user source are reached through the
//! [`DirectoryClient`] and [`UserSource`] traits so the engine can be driven
//! by any backend.

pub mod cache;
pub mod desired;
pub mod directory;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod refresher;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod source;

pub use cache::{normalize_email, normalize_group_name, CacheStats, DirectoryCache, DirectorySnapshot};
pub use desired::{build_desired_state, DesiredState, EligibilityFilter};
pub use directory::{DirectoryClient, DirectoryUser};
pub use dispatch::{drain_phase, BoundedDispatcher, PhaseOutcome};
pub use engine::{CycleOutcome, EngineConfig, ReconciliationEngine};
pub use error::{FailureKind, RemoteError, SyncError, SyncResult};
pub use mapping::{GroupResolver, PrefixGroupMapping};
pub use refresher::{CacheRefresher, RefreshOutcome};
pub use report::{MembershipSyncResult, SyncCounters, SyncReport};
pub use retry::RetryPolicy;
pub use scheduler::{CycleGate, CycleGuard, SchedulerConfig, SyncScheduler, TriggerOutcome};
pub use source::{AssignedGroup, SourceUser, UserSource};
