//! Qlik to Entra ID membership sync service.
//!
//! Wires the Qlik user source and the Microsoft Graph directory into the
//! reconciliation engine, runs it on a schedule, and exposes an HTTP trigger
//! and a health endpoint.

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod routes;
pub mod state;

pub use bootstrap::{assemble, build_scheduler, StartupError};
pub use config::{AppConfig, ConfigError, SyncSettings};
pub use routes::router;
pub use state::AppState;
