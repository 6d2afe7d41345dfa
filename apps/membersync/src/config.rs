//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: required variables must be present and every
//! value must parse, or the service refuses to start.
//!
//! # Required Variables
//!
//! - `GRAPH_TENANT_ID`, `GRAPH_CLIENT_ID`, `GRAPH_CLIENT_SECRET`
//! - `GRAPH_INVITE_REDIRECT_URL`
//! - `QLIK_BASE_URL`, `QLIK_API_TOKEN`
//!
//! # Optional Variables
//!
//! - `GRAPH_BASE_URL` (default: `https://graph.microsoft.com/v1.0`)
//! - `GRAPH_LOGIN_URL` (default: `https://login.microsoftonline.com`)
//! - `GRAPH_GROUP_MAPPINGS` - Comma-separated target group names
//! - `GRAPH_REQUEST_TIMEOUT_SECS` (default: 60)
//! - `QLIK_USERS_ENDPOINT`, `QLIK_AUDIT_ENDPOINT`, `QLIK_AUDIT_DAYS_BACK` (default: 400)
//! - `QLIK_EXCLUDED_EMAIL_DOMAINS` - Comma-separated domains
//! - `SYNC_REMOVE_MEMBERSHIPS` (default: false)
//! - `SYNC_INITIAL_DELAY_SECS` (5), `SYNC_INTERVAL_SECS` (300)
//! - `SYNC_WORKER_THREADS` (24), `SYNC_INVITE_CONCURRENCY` (6),
//!   `SYNC_MEMBERSHIP_CONCURRENCY` (16), `SYNC_OPERATION_TIMEOUT_SECS` (600)
//! - `HOST` (default: "0.0.0.0"), `PORT` (default: 8080)
//! - `RUST_LOG` (default: "info")

use membersync_core::{EngineConfig, SchedulerConfig};
use membersync_graph::{
    GraphConfig, GraphCredentials, DEFAULT_GRAPH_BASE_URL, DEFAULT_LOGIN_URL,
};
use membersync_qlik::{
    QlikConfig, DEFAULT_AUDIT_DAYS_BACK, DEFAULT_AUDIT_ENDPOINT, DEFAULT_USERS_ENDPOINT,
};
use secrecy::SecretString;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

impl ConfigError {
    fn invalid(var: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.to_string(),
            message: message.into(),
        }
    }
}

/// Cycle timing and concurrency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub remove_memberships: bool,
    pub initial_delay: Duration,
    pub interval: Duration,
    /// Size of the runtime's worker pool.
    pub worker_threads: usize,
    pub invite_concurrency: usize,
    pub membership_concurrency: usize,
    pub operation_timeout: Duration,
}

/// Service configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub graph: GraphConfig,
    pub graph_credentials: GraphCredentials,
    /// Target directory group display names, in configured order.
    pub target_groups: Vec<String>,
    pub qlik: QlikConfig,
    pub excluded_email_domains: Vec<String>,
    pub sync: SyncSettings,
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

impl AppConfig {
    /// Loads configuration from the process environment and `.env`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let mut graph = GraphConfig::new(
            vars.required("GRAPH_TENANT_ID")?,
            vars.required("GRAPH_INVITE_REDIRECT_URL")?,
        );
        graph.base_url = vars.or("GRAPH_BASE_URL", DEFAULT_GRAPH_BASE_URL);
        graph.login_url = vars.or("GRAPH_LOGIN_URL", DEFAULT_LOGIN_URL);
        graph.request_timeout = Duration::from_secs(vars.parse("GRAPH_REQUEST_TIMEOUT_SECS", 60)?);
        graph
            .validate()
            .map_err(|e| ConfigError::invalid("GRAPH_*", e.to_string()))?;

        let graph_credentials = GraphCredentials {
            client_id: vars.required("GRAPH_CLIENT_ID")?,
            client_secret: SecretString::from(vars.required("GRAPH_CLIENT_SECRET")?),
        };

        let mut qlik = QlikConfig::new(
            vars.required("QLIK_BASE_URL")?,
            SecretString::from(vars.required("QLIK_API_TOKEN")?),
        );
        qlik.base()
            .map_err(|e| ConfigError::invalid("QLIK_BASE_URL", e.to_string()))?;
        qlik.users_endpoint = vars.or("QLIK_USERS_ENDPOINT", DEFAULT_USERS_ENDPOINT);
        qlik.audit_endpoint = vars.or("QLIK_AUDIT_ENDPOINT", DEFAULT_AUDIT_ENDPOINT);
        qlik.audit_days_back = vars.parse("QLIK_AUDIT_DAYS_BACK", DEFAULT_AUDIT_DAYS_BACK)?;
        if qlik.audit_days_back == 0 {
            return Err(ConfigError::invalid("QLIK_AUDIT_DAYS_BACK", "Must be at least 1"));
        }

        let sync = SyncSettings {
            remove_memberships: vars.flag("SYNC_REMOVE_MEMBERSHIPS", false)?,
            initial_delay: Duration::from_secs(vars.parse("SYNC_INITIAL_DELAY_SECS", 5)?),
            interval: Duration::from_secs(vars.parse("SYNC_INTERVAL_SECS", 300)?),
            worker_threads: vars.positive("SYNC_WORKER_THREADS", 24)?,
            invite_concurrency: vars.positive("SYNC_INVITE_CONCURRENCY", 6)?,
            membership_concurrency: vars.positive("SYNC_MEMBERSHIP_CONCURRENCY", 16)?,
            operation_timeout: Duration::from_secs(
                vars.parse("SYNC_OPERATION_TIMEOUT_SECS", 600)?,
            ),
        };

        let port: u16 = vars.parse("PORT", 8080)?;
        if port == 0 {
            return Err(ConfigError::invalid("PORT", "Port must be between 1 and 65535"));
        }

        Ok(Self {
            graph,
            graph_credentials,
            target_groups: vars.list("GRAPH_GROUP_MAPPINGS"),
            qlik,
            excluded_email_domains: vars.list("QLIK_EXCLUDED_EMAIL_DOMAINS"),
            sync,
            host: vars.or("HOST", "0.0.0.0"),
            port,
            rust_log: vars.or("RUST_LOG", "info"),
        })
    }

    /// Returns the bind address for the HTTP server.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            target_groups: self.target_groups.clone(),
            excluded_domains: self.excluded_email_domains.clone(),
            remove_memberships: self.sync.remove_memberships,
            invite_concurrency: self.sync.invite_concurrency,
            membership_concurrency: self.sync.membership_concurrency,
            operation_timeout: self.sync.operation_timeout,
            ..EngineConfig::default()
        }
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            initial_delay: self.sync.initial_delay,
            interval: self.sync.interval,
        }
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Value with surrounding whitespace removed; blank counts as unset.
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &str) -> Result<String, ConfigError> {
        self.get(var)
            .ok_or_else(|| ConfigError::MissingVar(var.to_string()))
    }

    fn or(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, var: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(var) {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::invalid(var, format!("'{raw}': {e}"))),
            None => Ok(default),
        }
    }

    fn positive(&self, var: &str, default: usize) -> Result<usize, ConfigError> {
        let value = self.parse(var, default)?;
        if value == 0 {
            return Err(ConfigError::invalid(var, "Must be at least 1"));
        }
        Ok(value)
    }

    fn flag(&self, var: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(var).map(|v| v.to_lowercase()).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some("false" | "0" | "no" | "off") => Ok(false),
            Some(other) => Err(ConfigError::invalid(var, format!("'{other}' is not a boolean"))),
        }
    }

    /// Comma-separated list, blanks dropped.
    fn list(&self, var: &str) -> Vec<String> {
        self.get(var)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
