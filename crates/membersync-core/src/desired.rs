//! Desired-state computation.
//!
//! Turns the source user list into "email -> target groups" plus the set of
//! groups the cycle is allowed to touch. Pure: no I/O, no shared state.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::cache::{normalize_email, normalize_group_name};
use crate::mapping::GroupResolver;
use crate::source::SourceUser;

/// Inputs that decide which users and groups take part in a cycle.
#[derive(Debug, Clone, Default)]
pub struct EligibilityFilter {
    /// Configured target groups. Empty means unconstrained.
    pub groups_in_scope: BTreeSet<String>,
    /// Lower-cased email domains whose users are never synced.
    pub excluded_domains: BTreeSet<String>,
}

impl EligibilityFilter {
    /// Normalizes the configured group names and domains.
    #[must_use]
    pub fn new<G, D>(groups_in_scope: G, excluded_domains: D) -> Self
    where
        G: IntoIterator,
        G::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            groups_in_scope: groups_in_scope
                .into_iter()
                .filter_map(|g| normalize_group_name(g.as_ref()))
                .collect(),
            excluded_domains: excluded_domains
                .into_iter()
                .filter_map(|d| normalize_email(d.as_ref()))
                .collect(),
        }
    }

    /// Whether the domain after the last `@` is excluded. An address without
    /// a domain part is never excluded.
    #[must_use]
    pub fn is_excluded(&self, email: &str) -> bool {
        let Some(at) = email.rfind('@') else {
            return false;
        };
        let domain = &email[at + 1..];
        !domain.is_empty() && self.excluded_domains.contains(&domain.to_lowercase())
    }
}

/// Target membership for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    pub groups_by_email: BTreeMap<String, BTreeSet<String>>,
    pub display_name_by_email: BTreeMap<String, String>,
    pub groups_in_scope: BTreeSet<String>,
}

impl DesiredState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups_by_email.is_empty()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.groups_by_email.len()
    }

    #[must_use]
    pub fn display_name(&self, email: &str) -> Option<&str> {
        self.display_name_by_email.get(email).map(String::as_str)
    }

    /// Emails that should be members of `group`.
    pub fn emails_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.groups_by_email
            .iter()
            .filter(move |(_, groups)| groups.contains(group))
            .map(|(email, _)| email.as_str())
    }

    /// Total number of (email, group) pairs.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.groups_by_email.values().map(BTreeSet::len).sum()
    }
}

/// Builds the desired state from the source users.
///
/// A user is kept only if they have a federated assignment, a usable email
/// outside the excluded domains, and at least one resolved target group
/// (inside the configured scope, when one is set). Groups of users sharing
/// an email are merged and the first non-blank display name wins.
///
/// When a scope is configured it is returned as `groups_in_scope` even if no
/// user resolved to it.
pub fn build_desired_state(
    users: &[SourceUser],
    resolver: &dyn GroupResolver,
    filter: &EligibilityFilter,
) -> DesiredState {
    let mut state = DesiredState::default();
    let mut observed = BTreeSet::new();

    for user in users {
        if !user.is_federated() {
            continue;
        }

        let Some(email) = user.email.as_deref().and_then(normalize_email) else {
            continue;
        };

        if filter.is_excluded(&email) {
            debug!(email = %email, "Skipping user in excluded domain");
            continue;
        }

        let mut targets = resolver.resolve_target_groups(user);
        if targets.is_empty() {
            continue;
        }

        if !filter.groups_in_scope.is_empty() {
            targets.retain(|g| filter.groups_in_scope.contains(g));
            if targets.is_empty() {
                continue;
            }
        }

        observed.extend(targets.iter().cloned());
        state
            .groups_by_email
            .entry(email.clone())
            .or_default()
            .extend(targets);

        if let Some(name) = user.display_name.as_deref().map(str::trim) {
            if !name.is_empty() {
                state
                    .display_name_by_email
                    .entry(email)
                    .or_insert_with(|| name.to_string());
            }
        }
    }

    state.groups_in_scope = if filter.groups_in_scope.is_empty() {
        observed
    } else {
        filter.groups_in_scope.clone()
    };
    state
}
