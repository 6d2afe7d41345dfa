//! Rebuilds the directory cache from the directory provider.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cache::{normalize_group_name, CacheStats, DirectoryCache, DirectorySnapshot};
use crate::directory::DirectoryClient;
use crate::error::RemoteError;

/// Result of one refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache was replaced with a fresh snapshot.
    Refreshed(CacheStats),
    /// Staging failed; the previous cache content is still in place.
    Failed(String),
}

impl RefreshOutcome {
    #[must_use]
    pub fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed(_))
    }
}

/// Stages a full directory snapshot and swaps it into the cache.
pub struct CacheRefresher {
    client: Arc<dyn DirectoryClient>,
    cache: Arc<DirectoryCache>,
    group_names: Vec<String>,
}

impl CacheRefresher {
    /// `group_names` are trimmed and deduplicated, keeping first-seen order.
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        cache: Arc<DirectoryCache>,
        group_names: &[String],
    ) -> Self {
        let mut seen = HashSet::new();
        let group_names = group_names
            .iter()
            .filter_map(|name| normalize_group_name(name))
            .filter(|name| seen.insert(name.clone()))
            .collect();

        Self {
            client,
            cache,
            group_names,
        }
    }

    #[must_use]
    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    /// Refreshes the cache. Never fails: on error the existing cache is kept
    /// and the failure is logged.
    #[instrument(skip(self), fields(groups = self.group_names.len()))]
    pub async fn refresh(&self) -> RefreshOutcome {
        let started = Instant::now();

        match self.stage().await {
            Ok(snapshot) => {
                self.cache.replace_with(snapshot);
                self.cache.mark_refreshed();
                let stats = self.cache.stats();
                info!(
                    guests = stats.guests,
                    groups = stats.groups,
                    memberships = stats.memberships,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Directory cache refreshed"
                );
                RefreshOutcome::Refreshed(stats)
            }
            Err(e) => {
                warn!(error = %e, "Directory cache refresh failed, keeping existing cache");
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }

    async fn stage(&self) -> Result<DirectorySnapshot, RemoteError> {
        let mut snapshot = DirectorySnapshot::new();

        let users = self.client.list_guest_users().await?;
        let listed = users.len();
        for user in users {
            if !user.is_guest() {
                continue;
            }
            let (Some(id), Some(email)) = (user.id.as_deref(), user.sync_email()) else {
                continue;
            };
            snapshot.put_guest(&email, id);
        }
        debug!(listed, cached = snapshot.guest_count(), "Staged guest users");

        if self.group_names.is_empty() {
            warn!("No target groups configured, skipping group membership refresh");
            return Ok(snapshot);
        }

        let mut resolved = Vec::with_capacity(self.group_names.len());
        for name in &self.group_names {
            match self.client.find_group_id(name).await {
                Ok(Some(id)) => {
                    snapshot.put_group_id(name, &id);
                    resolved.push((name, id));
                }
                Ok(None) => warn!(group = %name, "Group not found in directory"),
                Err(e) => warn!(group = %name, error = %e, "Group lookup failed"),
            }
        }

        for (name, group_id) in resolved {
            match self.client.list_group_members(&group_id).await {
                Ok(members) => {
                    debug!(group = %name, group_id = %group_id, members = members.len(), "Staged group members");
                    snapshot.set_group_members(&group_id, members);
                }
                Err(e) => {
                    warn!(group = %name, group_id = %group_id, error = %e, "Failed to list group members, leaving group out of cache");
                }
            }
        }

        Ok(snapshot)
    }
}
