//! HTTP surface: manual sync trigger and health.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use membersync_core::{CacheStats, CycleOutcome, RefreshOutcome, SyncReport, TriggerOutcome};
use serde::Serialize;
use tracing::{info, warn};

use crate::state::AppState;

/// Body returned by the sync trigger, whatever the cycle did.
pub const SYNC_RESPONSE: &str = "Sync started/finished";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub sync_running: bool,
    pub cycles_run: u64,
    pub cache: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<SyncReport>,
}

/// Overall health status.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// The last cycle hit a phase deadline or had failed operations.
    Degraded,
}

/// Create the service routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sync/qlik-users", post(trigger_sync))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Runs a cycle now, unless one is already running.
///
/// Responds once the cycle is over. A client that disconnects early does not
/// stop the cycle.
async fn trigger_sync(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.trigger("admin").await {
        TriggerOutcome::Skipped => {
            info!("Manual sync skipped, a cycle is already running");
        }
        TriggerOutcome::Ran { refresh, cycle } => {
            if let RefreshOutcome::Failed(reason) = &refresh {
                warn!(reason = %reason, "Manual sync ran on a stale cache");
            }
            match &cycle {
                CycleOutcome::Completed(report) => info!(
                    users = report.users_found,
                    added = report.added,
                    failed = report.failed,
                    removed = report.removed,
                    "Manual sync finished"
                ),
                CycleOutcome::Aborted(reason) => warn!(reason = %reason, "Manual sync aborted"),
            }
        }
        TriggerOutcome::Failed(reason) => {
            warn!(reason = %reason, "Manual sync did not finish");
        }
    }
    (StatusCode::OK, SYNC_RESPONSE)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let scheduler = &state.scheduler;
    let last_report = scheduler.last_report();

    let status = match &last_report {
        Some(report) if report.is_degraded() || report.failed > 0 || report.guests_failed > 0 => {
            HealthStatus::Degraded
        }
        _ => HealthStatus::Healthy,
    };

    Json(HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sync_running: scheduler.is_running(),
        cycles_run: scheduler.cycles_run(),
        cache: scheduler.cache().stats(),
        last_report,
    })
}
