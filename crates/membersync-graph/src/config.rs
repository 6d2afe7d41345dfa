//! Connection settings for Microsoft Graph.

use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use crate::{GraphError, GraphResult};

/// Default Graph API root, including the API version.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default Azure AD login endpoint.
pub const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";

/// App registration credentials for the client credentials flow.
#[derive(Debug)]
pub struct GraphCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// Tenant and endpoint settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    /// API root including version, without trailing slash.
    pub base_url: String,
    pub login_url: String,
    /// Where invited guests land after redeeming an invitation.
    pub invite_redirect_url: String,
    pub request_timeout: Duration,
}

impl GraphConfig {
    /// Creates a config for the public cloud with default endpoints.
    pub fn new(tenant_id: impl Into<String>, invite_redirect_url: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            invite_redirect_url: invite_redirect_url.into(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Checks required fields and URL syntax.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Config` naming the offending field.
    pub fn validate(&self) -> GraphResult<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(GraphError::Config("tenant_id is required".into()));
        }
        if self.invite_redirect_url.trim().is_empty() {
            return Err(GraphError::Config("invite_redirect_url is required".into()));
        }
        for (field, value) in [("base_url", &self.base_url), ("login_url", &self.login_url)] {
            Url::parse(value)
                .map_err(|e| GraphError::Config(format!("{field} is not a valid URL: {e}")))?;
        }
        Ok(())
    }

    /// API root with any trailing slash removed.
    #[must_use]
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// OAuth2 token endpoint for the tenant.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_url.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Client credentials scope: the Graph origin plus `/.default`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` does not parse.
    pub fn scope(&self) -> GraphResult<String> {
        let url = Url::parse(&self.base_url)?;
        Ok(format!("{}/.default", url.origin().ascii_serialization()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::new("tenant-1", "https://apps.example.com");

        assert_eq!(config.base_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_url_and_scope() {
        let mut config = GraphConfig::new("tenant-1", "https://apps.example.com");
        config.login_url = "https://login.example.com/".into();

        assert_eq!(
            config.token_url(),
            "https://login.example.com/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(config.scope().unwrap(), "https://graph.microsoft.com/.default");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let config = GraphConfig::new(" ", "https://apps.example.com");
        assert!(matches!(config.validate(), Err(GraphError::Config(_))));

        let mut config = GraphConfig::new("tenant-1", "https://apps.example.com");
        config.base_url = "not a url".into();
        assert!(matches!(config.validate(), Err(GraphError::Config(_))));
    }
}
