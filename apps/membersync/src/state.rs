//! Shared state for HTTP handlers.

use membersync_core::SyncScheduler;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<SyncScheduler>,
    pub start_time: Instant,
    pub version: String,
}

impl AppState {
    #[must_use]
    pub fn new(scheduler: Arc<SyncScheduler>) -> Self {
        Self {
            scheduler,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
