//! Microsoft Graph directory client for membersync
//!
//! Implements [`membersync_core::DirectoryClient`] against Microsoft Entra ID
//! through the Graph API: guest listing and invitation, group lookup, and
//! group membership changes.
//!
//! Calls are single-shot. Throttling and server errors surface as
//! [`membersync_core::RemoteError`] with the `Retry-After` hint attached, and
//! the engine's retry policy decides whether to try again.
//!
//! # Example
//!
//! ```no_run
//! use membersync_graph::{GraphConfig, GraphCredentials, GraphDirectory};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GraphConfig::new("your-tenant-id", "https://myapps.microsoft.com");
//! let credentials = GraphCredentials {
//!     client_id: "your-client-id".to_string(),
//!     client_secret: "your-client-secret".to_string().into(),
//! };
//!
//! let directory = GraphDirectory::connect(&config, credentials)?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod config;
mod directory;
mod error;
mod graph_client;

// Re-exports
pub use auth::TokenCache;
pub use config::{GraphConfig, GraphCredentials, DEFAULT_GRAPH_BASE_URL, DEFAULT_LOGIN_URL};
pub use directory::GraphDirectory;
pub use error::{parse_retry_after, GraphError, GraphResult};
pub use graph_client::{odata_quote, GraphClient, ODataError, ODataErrorBody, ODataResponse};
