//! Qlik Cloud REST payloads.

use membersync_core::{AssignedGroup, SourceUser};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// A user from `GET /api/v1/users`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QlikUser {
    pub id: Option<String>,
    pub tenant_id: Option<String>,
    pub status: Option<String>,
    pub subject: Option<String>,
    /// Display name.
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub assigned_groups: Vec<QlikAssignedGroup>,
}

/// A group assignment on a Qlik user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QlikAssignedGroup {
    pub id: Option<String>,
    pub name: Option<String>,
    /// `idp` for groups pushed by the identity provider.
    pub provider_type: Option<String>,
}

impl QlikUser {
    /// The user as the engine sees it, or `None` without an id.
    #[must_use]
    pub fn into_source_user(self) -> Option<SourceUser> {
        let id = self.id.filter(|id| !id.trim().is_empty())?;
        Some(SourceUser {
            id,
            email: self.email,
            display_name: self.name,
            assigned_groups: self
                .assigned_groups
                .into_iter()
                .map(|g| AssignedGroup {
                    name: g.name,
                    provider_type: g.provider_type,
                })
                .collect(),
        })
    }
}

/// An entry from `GET /api/v1/audits`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Option<String>,
    pub event_type: Option<String>,
    /// RFC 3339 timestamp.
    pub event_time: Option<String>,
    pub user_id: Option<String>,
}

/// Cursor links on a list response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    pub next: Option<LinkHref>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkHref {
    pub href: Option<String>,
}

/// One page of a Qlik list endpoint.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub next_href: Option<String>,
}

#[derive(Deserialize)]
struct RawPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    links: Option<Links>,
}

impl<T: DeserializeOwned> Page<T> {
    /// Parses a list response.
    ///
    /// A body without a `data` array is read as a single item with no next
    /// page, which is what the users endpoint returns when it resolves to
    /// one user.
    ///
    /// # Errors
    ///
    /// Returns an error if the body matches neither shape.
    pub fn from_value(mut root: Value) -> serde_json::Result<Self> {
        if root.get("data").is_some_and(Value::is_array) {
            let raw: RawPage<T> = serde_json::from_value(root)?;
            let next_href = raw
                .links
                .and_then(|l| l.next)
                .and_then(|n| n.href)
                .filter(|h| !h.trim().is_empty());
            return Ok(Self {
                data: raw.data,
                next_href,
            });
        }

        if let Some(object) = root.as_object_mut() {
            object.remove("links");
        }
        Ok(Self {
            data: vec![serde_json::from_value(root)?],
            next_href: None,
        })
    }
}
