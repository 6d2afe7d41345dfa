//! Common test utilities for membersync-graph integration tests.

#![allow(dead_code)]

use membersync_graph::{GraphConfig, GraphCredentials, GraphDirectory};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT_ID: &str = "test-tenant";
pub const REDIRECT_URL: &str = "https://apps.example.com";

/// Test data factory for guest users.
pub fn guest_user(id: &str, mail: &str) -> Value {
    json!({
        "id": id,
        "mail": mail,
        "userPrincipalName": format!("{}#EXT#@test.onmicrosoft.com", mail.replace('@', "_")),
        "userType": "Guest"
    })
}

/// Test data factory for directory objects that only carry an id.
pub fn object_ref(id: &str) -> Value {
    json!({ "id": id, "@odata.type": "#microsoft.graph.user" })
}

/// Wraps items in an OData response format.
pub fn odata_page(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut response = json!({ "value": items });
    if let Some(link) = next_link {
        response["@odata.nextLink"] = json!(link);
    }
    response
}

/// Creates an OData error response.
pub fn odata_error(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Creates a mock OAuth token response.
pub fn token_response(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
}

/// Mock server wrapper with common setup helpers.
pub struct MockGraphServer {
    pub server: MockServer,
}

impl MockGraphServer {
    /// Starts a server with a working token endpoint.
    pub async fn start() -> Self {
        let server = Self {
            server: MockServer::start().await,
        };
        server.mock_token_endpoint().await;
        server
    }

    /// Starts a server with no endpoints mounted.
    pub async fn bare() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Graph API root served by this mock.
    pub fn api_root(&self) -> String {
        format!("{}/v1.0", self.url())
    }

    pub async fn mock_token_endpoint(&self) {
        Mock::given(method("POST"))
            .and(path(format!("/{TENANT_ID}/oauth2/v2.0/token")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(token_response("mock-access-token", 3600)),
            )
            .mount(&self.server)
            .await;
    }

    pub fn config(&self) -> GraphConfig {
        let mut config = GraphConfig::new(TENANT_ID, REDIRECT_URL);
        config.base_url = self.api_root();
        config.login_url = self.url();
        config
    }

    /// Directory client pointed at this mock.
    pub fn directory(&self) -> GraphDirectory {
        let credentials = GraphCredentials {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string().into(),
        };
        GraphDirectory::connect(&self.config(), credentials).unwrap()
    }
}
