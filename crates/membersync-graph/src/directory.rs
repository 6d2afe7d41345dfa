//! `DirectoryClient` implementation backed by Microsoft Graph.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use membersync_core::{normalize_email, DirectoryClient, DirectoryUser, RemoteError};

use crate::graph_client::{odata_quote, ODataResponse};
use crate::{GraphClient, GraphConfig, GraphCredentials, GraphError, GraphResult, TokenCache};

const PAGE_SIZE: &str = "999";
const ALREADY_MEMBER: &str = "object references already exist";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvitationRequest<'a> {
    invited_user_email_address: &'a str,
    invited_user_display_name: &'a str,
    invite_redirect_url: &'a str,
    send_invitation_message: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvitationResponse {
    invited_user: Option<ObjectRef>,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct MemberRef {
    #[serde(rename = "@odata.id")]
    odata_id: String,
}

/// Guest, group and membership operations against one Entra tenant.
#[derive(Debug, Clone)]
pub struct GraphDirectory {
    client: GraphClient,
    invite_redirect_url: String,
}

impl GraphDirectory {
    pub fn new(client: GraphClient, invite_redirect_url: impl Into<String>) -> Self {
        Self {
            client,
            invite_redirect_url: invite_redirect_url.into(),
        }
    }

    /// Builds the HTTP client, token cache and Graph client from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the HTTP client cannot
    /// be created.
    pub fn connect(config: &GraphConfig, credentials: GraphCredentials) -> GraphResult<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GraphError::Config(format!("Failed to create HTTP client: {e}")))?;
        let token_cache = Arc::new(TokenCache::new(config, credentials, http_client.clone())?);
        let client = GraphClient::new(http_client, token_cache, config);

        Ok(Self::new(client, config.invite_redirect_url.clone()))
    }

    /// Builds `base + path` with `OData` query options, percent-encoding values.
    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> String {
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}{path}?{query}", self.client.base_url())
    }

    fn group_path(group_id: &str) -> String {
        format!("/groups/{}", urlencoding::encode(group_id))
    }

    #[instrument(skip(self))]
    async fn list_guests(&self) -> GraphResult<Vec<DirectoryUser>> {
        let url = self.endpoint(
            "/users",
            &[
                ("$filter", "userType eq 'Guest'"),
                ("$select", "id,mail,userPrincipalName,userType"),
                ("$top", PAGE_SIZE),
            ],
        );

        let mut guests = Vec::new();
        self.client
            .get_paginated(&url, |page: Vec<DirectoryUser>| guests.extend(page))
            .await?;
        info!(count = guests.len(), "Listed guest users");
        Ok(guests)
    }

    #[instrument(skip(self))]
    async fn find_group(&self, display_name: &str) -> GraphResult<Option<String>> {
        let filter = format!("displayName eq '{}'", odata_quote(display_name));
        let url = self.endpoint(
            "/groups",
            &[
                ("$filter", filter.as_str()),
                ("$select", "id,displayName"),
                ("$top", "1"),
            ],
        );

        let page: ODataResponse<ObjectRef> = self.client.get(&url).await?;
        Ok(page.value.into_iter().find_map(|g| g.id))
    }

    #[instrument(skip(self))]
    async fn list_members(&self, group_id: &str) -> GraphResult<HashSet<String>> {
        let url = self.endpoint(
            &format!("{}/members", Self::group_path(group_id)),
            &[("$select", "id"), ("$top", PAGE_SIZE)],
        );

        let mut members = HashSet::new();
        self.client
            .get_paginated(&url, |page: Vec<ObjectRef>| {
                members.extend(page.into_iter().filter_map(|m| m.id));
            })
            .await?;
        debug!(count = members.len(), "Listed group members");
        Ok(members)
    }

    /// Looks up an existing guest by mail address.
    #[instrument(skip(self))]
    pub async fn find_guest_by_email(&self, email: &str) -> GraphResult<Option<String>> {
        let filter = format!("userType eq 'Guest' and mail eq '{}'", odata_quote(email));
        let url = self.endpoint("/users", &[("$filter", filter.as_str()), ("$top", "1")]);

        let page: ODataResponse<ObjectRef> = self.client.get(&url).await?;
        Ok(page.value.into_iter().find_map(|u| u.id))
    }

    #[instrument(skip(self, display_name))]
    async fn invite_guest(&self, email: &str, display_name: &str) -> GraphResult<String> {
        info!("Inviting guest user (no invitation email is sent)");
        let url = format!("{}/invitations", self.client.base_url());
        let request = InvitationRequest {
            invited_user_email_address: email,
            invited_user_display_name: display_name,
            invite_redirect_url: &self.invite_redirect_url,
            send_invitation_message: false,
        };

        let response: InvitationResponse = self.client.post(&url, &request).await?;
        let invited_id = response
            .invited_user
            .and_then(|u| u.id)
            .filter(|id| !id.trim().is_empty());
        if let Some(id) = invited_id {
            return Ok(id);
        }

        debug!("Invitation response carried no user id, looking the guest up");
        self.find_guest_by_email(email).await?.ok_or_else(|| {
            GraphError::InvalidResponse(format!(
                "Could not resolve user id for invited guest {email}"
            ))
        })
    }

    #[instrument(skip(self))]
    async fn add_group_member(&self, group_id: &str, user_id: &str) -> GraphResult<()> {
        let url = format!(
            "{}{}/members/$ref",
            self.client.base_url(),
            Self::group_path(group_id)
        );
        let body = MemberRef {
            odata_id: format!(
                "{}/directoryObjects/{}",
                self.client.base_url(),
                urlencoding::encode(user_id)
            ),
        };

        match self.client.post_no_content(&url, &body).await {
            Err(e) if e.is_api_error(400, ALREADY_MEMBER) => {
                debug!("User is already a member");
                Ok(())
            }
            other => other,
        }
    }

    #[instrument(skip(self))]
    async fn remove_group_member(&self, group_id: &str, user_id: &str) -> GraphResult<()> {
        let url = format!(
            "{}{}/members/{}/$ref",
            self.client.base_url(),
            Self::group_path(group_id),
            urlencoding::encode(user_id)
        );

        match self.client.delete(&url).await {
            Err(e) if e.status() == Some(404) => {
                debug!("User was not a member");
                Ok(())
            }
            other => other,
        }
    }
}

#[async_trait]
impl DirectoryClient for GraphDirectory {
    async fn list_guest_users(&self) -> Result<Vec<DirectoryUser>, RemoteError> {
        Ok(self.list_guests().await?)
    }

    async fn find_group_id(&self, display_name: &str) -> Result<Option<String>, RemoteError> {
        Ok(self.find_group(display_name).await?)
    }

    async fn list_group_members(&self, group_id: &str) -> Result<HashSet<String>, RemoteError> {
        Ok(self.list_members(group_id).await?)
    }

    async fn ensure_guest_user(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<String, RemoteError> {
        let email = normalize_email(email)
            .ok_or_else(|| RemoteError::invalid_response("email is blank"))?;
        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(email.as_str());
        Ok(self.invite_guest(&email, display_name).await?)
    }

    async fn add_member(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError> {
        Ok(self.add_group_member(group_id, user_id).await?)
    }

    async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError> {
        Ok(self.remove_group_member(group_id, user_id).await?)
    }
}
