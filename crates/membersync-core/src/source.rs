//! Upstream user source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// Provider type marking a group assignment as coming from an external
/// identity provider.
pub const FEDERATED_PROVIDER_TYPE: &str = "idp";

/// A group assignment reported by the source system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedGroup {
    pub name: Option<String>,
    pub provider_type: Option<String>,
}

impl AssignedGroup {
    #[must_use]
    pub fn new(name: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            provider_type: Some(provider_type.into()),
        }
    }

    /// Whether this assignment came from an external identity provider.
    #[must_use]
    pub fn is_federated(&self) -> bool {
        self.provider_type
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(FEDERATED_PROVIDER_TYPE))
    }
}

/// A user as reported by the source system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub assigned_groups: Vec<AssignedGroup>,
}

impl SourceUser {
    /// Whether at least one assignment is federated.
    #[must_use]
    pub fn is_federated(&self) -> bool {
        self.assigned_groups.iter().any(AssignedGroup::is_federated)
    }
}

/// Delivers the current list of source users.
///
/// An `Err` means the list could not be fetched completely and the caller
/// must not act on it. An empty `Ok` is a valid, empty result.
#[async_trait]
pub trait UserSource: Send + Sync {
    async fn fetch_users(&self) -> SyncResult<Vec<SourceUser>>;
}
