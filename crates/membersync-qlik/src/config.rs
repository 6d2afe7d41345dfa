//! Connection settings for Qlik Cloud.

use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use crate::{QlikError, QlikResult};

pub const DEFAULT_USERS_ENDPOINT: &str = "/api/v1/users";
pub const DEFAULT_AUDIT_ENDPOINT: &str = "/api/v1/audits";
pub const DEFAULT_AUDIT_DAYS_BACK: u32 = 400;

/// Tenant URL, API key and activity window.
#[derive(Debug)]
pub struct QlikConfig {
    /// Tenant root, e.g. `https://tenant.eu.qlikcloud.com`.
    pub base_url: String,
    pub api_token: SecretString,
    pub users_endpoint: String,
    pub audit_endpoint: String,
    /// Users without a session in this many days are not synced.
    pub audit_days_back: u32,
    pub request_timeout: Duration,
}

impl QlikConfig {
    pub fn new(base_url: impl Into<String>, api_token: SecretString) -> Self {
        Self {
            base_url: base_url.into(),
            api_token,
            users_endpoint: DEFAULT_USERS_ENDPOINT.to_string(),
            audit_endpoint: DEFAULT_AUDIT_ENDPOINT.to_string(),
            audit_days_back: DEFAULT_AUDIT_DAYS_BACK,
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Parses the tenant root.
    ///
    /// # Errors
    ///
    /// Returns `QlikError::Config` if the base URL is not absolute.
    pub fn base(&self) -> QlikResult<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| QlikError::Config(format!("base_url is not a valid URL: {e}")))
    }
}
