//! Directory provider capability surface.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;

use crate::cache::normalize_email;
use crate::error::RemoteError;

/// User type of external accounts in the directory.
pub const GUEST_USER_TYPE: &str = "Guest";

/// A directory user as returned by the guest listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
}

impl DirectoryUser {
    /// Normalized sync email: primary mail, else principal name.
    #[must_use]
    pub fn sync_email(&self) -> Option<String> {
        self.mail
            .as_deref()
            .and_then(normalize_email)
            .or_else(|| self.user_principal_name.as_deref().and_then(normalize_email))
    }

    /// An absent user type is accepted since the listing is already
    /// filtered server-side.
    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.user_type
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case(GUEST_USER_TYPE))
    }
}

/// Low-level directory operations used by the refresher and the engine.
///
/// Implementations make a single attempt per call; retrying is the caller's
/// job. Every failure is reported as a classified [`RemoteError`].
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Lists all guest users, following pagination.
    async fn list_guest_users(&self) -> Result<Vec<DirectoryUser>, RemoteError>;

    /// Resolves a group by exact display name.
    async fn find_group_id(&self, display_name: &str) -> Result<Option<String>, RemoteError>;

    /// Lists the ids of all direct members of a group, following pagination.
    async fn list_group_members(&self, group_id: &str) -> Result<HashSet<String>, RemoteError>;

    /// Returns the id of the guest with this email, inviting them if needed.
    async fn ensure_guest_user(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<String, RemoteError>;

    /// Adds a member. An existing membership counts as success.
    async fn add_member(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError>;

    /// Removes a member. A missing membership counts as success.
    async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError>;
}
