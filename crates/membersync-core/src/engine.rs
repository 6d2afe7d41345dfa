//! Reconciliation engine.
//!
//! One cycle runs these stages in order:
//!
//! 1. Fetch source users (abort on failure, nothing is touched)
//! 2. Build the desired state
//! 3. Resolve in-scope group ids from the cache
//! 4. Ensure every desired email has a guest account
//! 5. Ensure every (email, group) membership exists
//! 6. Optionally remove memberships the desired state no longer wants
//!
//! Stages 4 to 6 fan out through [`BoundedDispatcher`]s and each is drained
//! before the next starts. A phase that hits its deadline is logged as
//! degraded; work already committed to the cache stays committed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::DirectoryCache;
use crate::desired::{build_desired_state, DesiredState, EligibilityFilter};
use crate::directory::DirectoryClient;
use crate::dispatch::{drain_phase, BoundedDispatcher};
use crate::error::SyncResult;
use crate::mapping::GroupResolver;
use crate::report::{MembershipSyncResult, SyncCounters, SyncReport};
use crate::retry::RetryPolicy;
use crate::source::UserSource;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Configured target group names. Empty means "whatever users map to".
    pub target_groups: Vec<String>,
    /// Email domains whose users are never synced.
    pub excluded_domains: Vec<String>,
    /// Enables the removal phase.
    pub remove_memberships: bool,
    /// Concurrent invite calls (default: 6).
    pub invite_concurrency: usize,
    /// Concurrent membership add/remove calls (default: 16).
    pub membership_concurrency: usize,
    /// Per-operation timeout, including admission wait and retries (default: 10 min).
    pub operation_timeout: Duration,
    /// Deadline for the guest phase (default: 30 min).
    pub guest_phase_timeout: Duration,
    /// Deadline for the membership phase (default: 40 min).
    pub membership_phase_timeout: Duration,
    /// Deadline for the removal phase (default: 40 min).
    pub removal_phase_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_groups: Vec::new(),
            excluded_domains: Vec::new(),
            remove_memberships: false,
            invite_concurrency: 6,
            membership_concurrency: 16,
            operation_timeout: Duration::from_secs(10 * 60),
            guest_phase_timeout: Duration::from_secs(30 * 60),
            membership_phase_timeout: Duration::from_secs(40 * 60),
            removal_phase_timeout: Duration::from_secs(40 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The source fetch failed; nothing was changed.
    Aborted(String),
    /// All stages ran (possibly degraded, see [`SyncReport::degraded_phases`]).
    Completed(SyncReport),
}

impl CycleOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Aborted(_) => None,
        }
    }
}

/// Drives sync cycles against a directory.
pub struct ReconciliationEngine {
    source: Arc<dyn UserSource>,
    directory: Arc<dyn DirectoryClient>,
    cache: Arc<DirectoryCache>,
    resolver: Arc<dyn GroupResolver>,
    filter: EligibilityFilter,
    config: EngineConfig,
    invites: BoundedDispatcher,
    memberships: BoundedDispatcher,
}

impl ReconciliationEngine {
    pub fn new(
        source: Arc<dyn UserSource>,
        directory: Arc<dyn DirectoryClient>,
        cache: Arc<DirectoryCache>,
        resolver: Arc<dyn GroupResolver>,
        config: EngineConfig,
    ) -> Self {
        let filter = EligibilityFilter::new(&config.target_groups, &config.excluded_domains);
        let invites = BoundedDispatcher::new(
            "invite",
            config.invite_concurrency,
            config.operation_timeout,
        );
        let memberships = BoundedDispatcher::new(
            "membership",
            config.membership_concurrency,
            config.operation_timeout,
        );

        if filter.excluded_domains.is_empty() {
            info!("No excluded email domains configured");
        } else {
            info!(domains = ?filter.excluded_domains, "Excluded email domains configured");
        }

        Self {
            source,
            directory,
            cache,
            resolver,
            filter,
            config,
            invites,
            memberships,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<DirectoryCache> {
        &self.cache
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Interrupts units waiting for admission. Used on shutdown.
    pub fn close(&self) {
        self.invites.close();
        self.memberships.close();
    }

    /// Runs one full sync cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let users = match self.source.fetch_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "Skipping sync because the user fetch failed, will retry next run");
                return CycleOutcome::Aborted(e.to_string());
            }
        };

        let desired = build_desired_state(&users, self.resolver.as_ref(), &self.filter);
        let mut report = SyncReport {
            users_found: desired.user_count(),
            groups_found: desired.groups_in_scope.len(),
            ..SyncReport::default()
        };

        if desired.is_empty() {
            info!(
                fetched = users.len(),
                groups_found = report.groups_found,
                "No users to sync after filters"
            );
            return CycleOutcome::Completed(report);
        }

        let group_ids = self.resolve_group_ids(&desired);
        let counters = Arc::new(SyncCounters::new());

        let user_ids = self.ensure_guests(&desired, &mut report).await;
        self.ensure_memberships(&desired, &user_ids, &group_ids, &counters, &mut report)
            .await;

        if self.config.remove_memberships {
            self.remove_excess(&desired, &user_ids, &group_ids, &counters, &mut report)
                .await;
        } else {
            warn!("Membership removal disabled by configuration");
        }

        let report = report.with_counters(&counters);
        info!(
            users_found = report.users_found,
            groups_found = report.groups_found,
            added = report.added,
            skipped = report.skipped,
            failed = report.failed,
            removed = report.removed,
            remove_failed = report.remove_failed,
            degraded = report.is_degraded(),
            "Sync summary"
        );
        CycleOutcome::Completed(report)
    }

    fn resolve_group_ids(&self, desired: &DesiredState) -> BTreeMap<String, String> {
        let mut group_ids = BTreeMap::new();
        for name in &desired.groups_in_scope {
            match self.cache.group_id(name) {
                Some(id) => {
                    group_ids.insert(name.clone(), id);
                }
                None => warn!(group = %name, "Group id not in cache, skipping group this cycle"),
            }
        }
        group_ids
    }

    async fn ensure_guests(
        &self,
        desired: &DesiredState,
        report: &mut SyncReport,
    ) -> HashMap<String, String> {
        let mut user_ids = HashMap::with_capacity(desired.user_count());
        let mut tasks = JoinSet::new();
        let mut cached = 0usize;

        for email in desired.groups_by_email.keys() {
            if let Some(id) = self.cache.guest_id(email) {
                user_ids.insert(email.clone(), id);
                cached += 1;
                continue;
            }

            let dispatcher = self.invites.clone();
            let directory = Arc::clone(&self.directory);
            let cache = Arc::clone(&self.cache);
            let retry = self.config.retry.clone();
            let email = email.clone();
            let display_name = desired.display_name(&email).map(str::to_string);

            tasks.spawn(async move {
                let unit_email = email.clone();
                let result = dispatcher
                    .run(move || async move {
                        let id = retry
                            .with_retry("ensure_guest", &unit_email, || {
                                directory.ensure_guest_user(&unit_email, display_name.as_deref())
                            })
                            .await?;
                        cache.put_guest(&unit_email, &id);
                        Ok(id)
                    })
                    .await;
                (email, result)
            });
        }

        let to_create = tasks.len();
        if to_create > 0 {
            info!(cached, to_create, total = desired.user_count(), "Guest phase started");
        } else {
            debug!(cached, total = desired.user_count(), "All guests already cached");
        }

        let mut invited = 0u64;
        let mut failed = 0u64;
        let outcome = drain_phase(
            "ensure_guests",
            &mut tasks,
            self.config.guest_phase_timeout,
            |(email, result): (String, SyncResult<String>)| match result {
                Ok(id) => {
                    debug!(email = %email, user_id = %id, "Guest ensured");
                    user_ids.insert(email, id);
                    invited += 1;
                }
                Err(e) if e.is_timeout() => {
                    warn!(email = %email, error = %e, "Timed out ensuring guest");
                    failed += 1;
                }
                Err(e) => {
                    error!(email = %email, error = %e, "Failed to ensure guest");
                    failed += 1;
                }
            },
        )
        .await;

        report.guests_invited = invited;
        report.guests_failed = failed + outcome.panicked as u64 + outcome.detached as u64;
        if outcome.is_degraded() {
            report.degraded_phases.push("ensure_guests".to_string());
        }
        user_ids
    }

    async fn ensure_memberships(
        &self,
        desired: &DesiredState,
        user_ids: &HashMap<String, String>,
        group_ids: &BTreeMap<String, String>,
        counters: &Arc<SyncCounters>,
        report: &mut SyncReport,
    ) {
        let mut results: BTreeMap<String, MembershipSyncResult> = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for (email, groups) in &desired.groups_by_email {
            let Some(user_id) = user_ids.get(email) else {
                counters.record_failed();
                warn!(email = %email, "Skipping memberships because the guest id was not resolved");
                continue;
            };

            let result = results.entry(email.clone()).or_default();
            result.groups = groups.len() as u32;

            for group in groups {
                let Some(group_id) = group_ids.get(group) else {
                    counters.record_failed();
                    result.failed += 1;
                    continue;
                };

                if self.cache.is_member(group_id, user_id) {
                    counters.record_skipped();
                    result.skipped += 1;
                    continue;
                }

                let dispatcher = self.memberships.clone();
                let directory = Arc::clone(&self.directory);
                let cache = Arc::clone(&self.cache);
                let retry = self.config.retry.clone();
                let email = email.clone();
                let group = group.clone();
                let group_id = group_id.clone();
                let user_id = user_id.clone();

                tasks.spawn(async move {
                    let key = format!("{group_id}/{user_id}");
                    let result = dispatcher
                        .run(move || async move {
                            retry
                                .with_retry("add_member", &key, || {
                                    directory.add_member(&group_id, &user_id)
                                })
                                .await?;
                            cache.add_member(&group_id, &user_id);
                            Ok(())
                        })
                        .await;
                    (email, group, result)
                });
            }
        }

        debug!(pending = tasks.len(), "Membership phase started");

        let outcome = drain_phase(
            "ensure_memberships",
            &mut tasks,
            self.config.membership_phase_timeout,
            |(email, group, result): (String, String, SyncResult<()>)| {
                let entry = results.entry(email.clone()).or_default();
                match result {
                    Ok(()) => {
                        counters.record_added();
                        entry.added += 1;
                    }
                    Err(e) => {
                        counters.record_failed();
                        entry.failed += 1;
                        if e.is_timeout() {
                            warn!(email = %email, group = %group, error = %e, "Timed out adding membership");
                        } else {
                            error!(email = %email, group = %group, error = %e, "Failed to add membership");
                        }
                    }
                }
            },
        )
        .await;

        for _ in 0..outcome.detached + outcome.panicked {
            counters.record_failed();
        }
        if outcome.is_degraded() {
            report.degraded_phases.push("ensure_memberships".to_string());
        }

        for (email, result) in &results {
            if result.has_failures() {
                warn!(
                    email = %email,
                    groups = result.groups,
                    added = result.added,
                    skipped = result.skipped,
                    failed = result.failed,
                    "Membership sync finished with failures"
                );
            } else {
                debug!(
                    email = %email,
                    groups = result.groups,
                    added = result.added,
                    skipped = result.skipped,
                    "Membership sync finished"
                );
            }
        }
    }

    async fn remove_excess(
        &self,
        desired: &DesiredState,
        user_ids: &HashMap<String, String>,
        group_ids: &BTreeMap<String, String>,
        counters: &Arc<SyncCounters>,
        report: &mut SyncReport,
    ) {
        if group_ids.is_empty() {
            warn!("No group ids resolved from cache, removal skipped");
            return;
        }

        let wanted = desired_members_by_group(desired, user_ids, group_ids);
        let no_members = HashSet::new();
        let mut tasks = JoinSet::new();

        for (group, group_id) in group_ids {
            let wanted_ids = wanted.get(group_id).unwrap_or(&no_members);
            let current = self.cache.group_members(group_id).unwrap_or_default();
            let to_remove = removal_candidates(&current, wanted_ids);

            debug!(
                group = %group,
                group_id = %group_id,
                desired = wanted_ids.len(),
                current = current.len(),
                remove = to_remove.len(),
                "Planned removals"
            );

            for user_id in to_remove {
                let dispatcher = self.memberships.clone();
                let directory = Arc::clone(&self.directory);
                let cache = Arc::clone(&self.cache);
                let retry = self.config.retry.clone();
                let group = group.clone();
                let group_id = group_id.clone();

                tasks.spawn(async move {
                    let key = format!("{group_id}/{user_id}");
                    let unit_user = user_id.clone();
                    let result = dispatcher
                        .run(move || async move {
                            retry
                                .with_retry("remove_member", &key, || {
                                    directory.remove_member(&group_id, &unit_user)
                                })
                                .await?;
                            cache.remove_member(&group_id, &unit_user);
                            Ok(())
                        })
                        .await;
                    (group, user_id, result)
                });
            }
        }

        if tasks.is_empty() {
            debug!("No members to remove");
            return;
        }

        let outcome = drain_phase(
            "remove_memberships",
            &mut tasks,
            self.config.removal_phase_timeout,
            |(group, user_id, result): (String, String, SyncResult<()>)| match result {
                Ok(()) => {
                    counters.record_removed();
                    info!(group = %group, user_id = %user_id, "Removed member");
                }
                Err(e) => {
                    counters.record_remove_failed();
                    error!(group = %group, user_id = %user_id, error = %e, "Failed to remove member");
                }
            },
        )
        .await;

        for _ in 0..outcome.detached + outcome.panicked {
            counters.record_remove_failed();
        }
        if outcome.is_degraded() {
            report.degraded_phases.push("remove_memberships".to_string());
        }
    }
}

/// Directory ids that should be members of each resolved group.
fn desired_members_by_group(
    desired: &DesiredState,
    user_ids: &HashMap<String, String>,
    group_ids: &BTreeMap<String, String>,
) -> HashMap<String, HashSet<String>> {
    let mut wanted: HashMap<String, HashSet<String>> = HashMap::new();
    for (email, groups) in &desired.groups_by_email {
        let Some(user_id) = user_ids.get(email) else {
            continue;
        };
        for group_id in groups.iter().filter_map(|g| group_ids.get(g)) {
            wanted
                .entry(group_id.clone())
                .or_default()
                .insert(user_id.clone());
        }
    }
    wanted
}

/// Current members not wanted by the desired state, in stable order.
fn removal_candidates(current: &HashSet<String>, wanted: &HashSet<String>) -> Vec<String> {
    let mut to_remove: Vec<String> = current.difference(wanted).cloned().collect();
    to_remove.sort();
    to_remove
}
