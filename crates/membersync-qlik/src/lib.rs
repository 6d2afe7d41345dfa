//! Qlik Cloud user source for membersync
//!
//! Lists tenant users with their group assignments and keeps only those with
//! a session in the configured lookback window, as read from the audit log.
//! Implements [`membersync_core::UserSource`].

mod activity;
mod client;
mod config;
mod error;
mod models;

pub use activity::{ActivityWindow, LastActivity, SESSION_BEGIN_EVENT};
pub use client::QlikClient;
pub use config::{
    QlikConfig, DEFAULT_AUDIT_DAYS_BACK, DEFAULT_AUDIT_ENDPOINT, DEFAULT_USERS_ENDPOINT,
};
pub use error::{QlikError, QlikResult};
pub use models::{AuditEvent, LinkHref, Links, Page, QlikAssignedGroup, QlikUser};
