//! Qlik Cloud REST client (reqwest-based).

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::ACCEPT;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use membersync_core::{SourceUser, SyncResult, UserSource};

use crate::activity::{ActivityWindow, LastActivity, SESSION_BEGIN_EVENT};
use crate::models::{AuditEvent, Page, QlikUser};
use crate::{QlikConfig, QlikError, QlikResult};

const USERS_PAGE_LIMIT: &str = "100";
const AUDIT_PAGE_LIMIT: &str = "100";
const LOG_BODY_LIMIT: usize = 800;

/// Reads users and session audits from one Qlik Cloud tenant.
#[derive(Debug)]
pub struct QlikClient {
    config: QlikConfig,
    base: Url,
    http_client: Client,
}

impl QlikClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: QlikConfig) -> QlikResult<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| QlikError::Config(format!("Failed to build HTTP client: {e}")))?;
        Self::with_http_client(config, http_client)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn with_http_client(config: QlikConfig, http_client: Client) -> QlikResult<Self> {
        let base = config.base()?;
        Ok(Self {
            config,
            base,
            http_client,
        })
    }

    /// Resolves an endpoint or a `links.next.href` against the tenant root.
    ///
    /// Only the path and query of `href` are used, so absolute links that
    /// name another host still go to the configured tenant.
    fn resolve(&self, href: &str) -> QlikResult<Url> {
        let parsed = match Url::parse(href) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self.base.join(href)?,
            Err(e) => return Err(e.into()),
        };

        let mut url = self.base.clone();
        url.set_path(parsed.path());
        url.set_query(parsed.query());
        Ok(url)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        url: Url,
    ) -> QlikResult<Page<T>> {
        debug!(resource, %url, "Fetching page");
        let response = self
            .http_client
            .get(url.clone())
            .bearer_auth(self.config.api_token.expose_secret())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(resource, %url, error = %e, "Request failed");
                QlikError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                resource,
                %url,
                status = status.as_u16(),
                body = %truncate(&body),
                "API returned an error"
            );
            return Err(QlikError::Api {
                resource,
                status: status.as_u16(),
            });
        }

        let root: Value = response.json().await?;
        Page::from_value(root).map_err(|e| {
            warn!(resource, %url, error = %e, "Failed to parse response");
            QlikError::from(e)
        })
    }

    /// Fetches every user, following `links.next.href`.
    ///
    /// # Errors
    ///
    /// Any page failure fails the whole listing.
    #[instrument(skip(self))]
    pub async fn fetch_all_users(&self) -> QlikResult<Vec<QlikUser>> {
        let mut url = self.resolve(&self.config.users_endpoint)?;
        url.query_pairs_mut().append_pair("limit", USERS_PAGE_LIMIT);

        let mut users = Vec::new();
        loop {
            let page: Page<QlikUser> = self.get_page("USERS", url).await?;
            if page.data.is_empty() {
                warn!("Users page was empty");
            }
            users.extend(page.data);
            debug!(total = users.len(), "Fetched users page");

            match page.next_href {
                Some(next) => url = self.resolve(&next)?,
                None => break,
            }
        }
        Ok(users)
    }

    /// Collects the latest session day per user within `window`.
    ///
    /// A page that cannot be read ends the scan with what was collected so
    /// far, so a failure on the first page yields no activity at all.
    ///
    /// # Errors
    ///
    /// Fails only if the audit URL cannot be built.
    #[instrument(skip(self), fields(from = %window.from, to = %window.to))]
    pub async fn fetch_last_activity(&self, window: ActivityWindow) -> QlikResult<LastActivity> {
        let mut url = self.resolve(&self.config.audit_endpoint)?;
        url.query_pairs_mut()
            .append_pair("eventType", SESSION_BEGIN_EVENT)
            .append_pair("eventTime", &window.event_time_range())
            .append_pair("limit", AUDIT_PAGE_LIMIT)
            .append_pair("sort", "-eventTime");

        let mut activity = LastActivity::new(window);
        let mut pages = 0usize;
        loop {
            let page: Page<AuditEvent> = match self.get_page("AUDIT", url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        pages,
                        users = activity.user_count(),
                        error = %e,
                        "Audit fetch failed, keeping activity collected so far"
                    );
                    break;
                }
            };
            pages += 1;

            for event in &page.data {
                activity.record(event.user_id.as_deref(), event.event_time.as_deref());
            }
            if pages % 10 == 0 {
                debug!(pages, events = activity.event_count(), "Audit progress");
            }

            match page.next_href {
                Some(next) => url = self.resolve(&next)?,
                None => break,
            }
        }

        info!(
            pages,
            events = activity.event_count(),
            users = activity.user_count(),
            "Audit scan done"
        );
        Ok(activity)
    }

    /// Users with a session in the configured window.
    ///
    /// Without readable audit data nobody counts as active.
    ///
    /// # Errors
    ///
    /// Fails only if the user listing fails.
    pub async fn fetch_active_users(&self) -> QlikResult<Vec<QlikUser>> {
        let mut users = self.fetch_all_users().await?;
        let window = ActivityWindow::last_days(Utc::now().date_naive(), self.config.audit_days_back);

        let activity = match self.fetch_last_activity(window).await {
            Ok(activity) => activity,
            Err(e) => {
                warn!(error = %e, "Audit scan failed, no user counts as active");
                LastActivity::new(window)
            }
        };

        let before = users.len();
        users.retain(|u| u.id.as_deref().is_some_and(|id| activity.is_active(id)));
        info!(
            total = before,
            days_back = self.config.audit_days_back,
            included = users.len(),
            filtered_out = before - users.len(),
            "Filtered users by recent activity"
        );
        Ok(users)
    }
}

#[async_trait]
impl UserSource for QlikClient {
    async fn fetch_users(&self) -> SyncResult<Vec<SourceUser>> {
        let users = self.fetch_active_users().await?;
        Ok(users
            .into_iter()
            .filter_map(QlikUser::into_source_user)
            .collect())
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= LOG_BODY_LIMIT {
        return body.to_string();
    }
    let head: String = body.chars().take(LOG_BODY_LIMIT).collect();
    format!("{head}...(truncated)")
}
