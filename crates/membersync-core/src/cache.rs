//! In-memory cache of directory state.
//!
//! Holds three lookups: guest user id by email, group id by display name and
//! member ids by group id. Keys are normalized on every write and read so
//! lookups with differently cased or padded input hit the same entry.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Trims and lower-cases an email address. Blank input yields `None`.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Trims a group display name. Group names stay case-sensitive.
#[must_use]
pub fn normalize_group_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A full copy of the cached directory state.
///
/// The refresher stages a snapshot off to the side and hands it to
/// [`DirectoryCache::replace_with`] in one piece.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    guest_id_by_email: HashMap<String, String>,
    group_id_by_name: HashMap<String, String>,
    member_ids_by_group: HashMap<String, HashSet<String>>,
}

impl DirectorySnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_guest(&mut self, email: &str, id: &str) {
        let Some(email) = normalize_email(email) else {
            return;
        };
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        self.guest_id_by_email.insert(email, id.to_string());
    }

    pub fn put_group_id(&mut self, display_name: &str, id: &str) {
        let Some(name) = normalize_group_name(display_name) else {
            return;
        };
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        self.group_id_by_name.insert(name, id.to_string());
    }

    pub fn set_group_members(&mut self, group_id: &str, ids: HashSet<String>) {
        let group_id = group_id.trim();
        if group_id.is_empty() {
            return;
        }
        self.member_ids_by_group.insert(group_id.to_string(), ids);
    }

    #[must_use]
    pub fn guest_count(&self) -> usize {
        self.guest_id_by_email.len()
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.group_id_by_name.len()
    }

    #[must_use]
    pub fn membership_count(&self) -> usize {
        self.member_ids_by_group.values().map(HashSet::len).sum()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            guests: self.guest_count(),
            groups: self.group_count(),
            groups_with_members: self.member_ids_by_group.len(),
            memberships: self.membership_count(),
            last_refresh: None,
        }
    }
}

/// Cache sizes, used in logs and the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub guests: usize,
    pub groups: usize,
    pub groups_with_members: usize,
    pub memberships: usize,
    pub last_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct CacheState {
    snapshot: DirectorySnapshot,
    last_refresh: Option<DateTime<Utc>>,
}

/// Process-wide directory cache.
///
/// Every mutation takes the write lock for a single map operation, so
/// concurrent workers never observe a half-written entry. No method performs
/// I/O.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    state: RwLock<CacheState>,
}

impl DirectoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_guest(&self, email: &str, id: &str) {
        self.state.write().snapshot.put_guest(email, id);
    }

    #[must_use]
    pub fn guest_id(&self, email: &str) -> Option<String> {
        let email = normalize_email(email)?;
        self.state
            .read()
            .snapshot
            .guest_id_by_email
            .get(&email)
            .cloned()
    }

    pub fn put_group_id(&self, display_name: &str, id: &str) {
        self.state.write().snapshot.put_group_id(display_name, id);
    }

    #[must_use]
    pub fn group_id(&self, display_name: &str) -> Option<String> {
        let name = normalize_group_name(display_name)?;
        self.state
            .read()
            .snapshot
            .group_id_by_name
            .get(&name)
            .cloned()
    }

    pub fn set_group_members(&self, group_id: &str, ids: HashSet<String>) {
        self.state.write().snapshot.set_group_members(group_id, ids);
    }

    /// Returns a copy of the group's member set.
    #[must_use]
    pub fn group_members(&self, group_id: &str) -> Option<HashSet<String>> {
        self.state
            .read()
            .snapshot
            .member_ids_by_group
            .get(group_id.trim())
            .cloned()
    }

    /// Whether `user_id` is a cached member of `group_id`.
    #[must_use]
    pub fn is_member(&self, group_id: &str, user_id: &str) -> bool {
        self.state
            .read()
            .snapshot
            .member_ids_by_group
            .get(group_id.trim())
            .is_some_and(|members| members.contains(user_id))
    }

    /// Adds a member, creating the group's set if needed. Idempotent.
    pub fn add_member(&self, group_id: &str, user_id: &str) {
        let (group_id, user_id) = (group_id.trim(), user_id.trim());
        if group_id.is_empty() || user_id.is_empty() {
            return;
        }
        self.state
            .write()
            .snapshot
            .member_ids_by_group
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Removes a member if present. Idempotent.
    pub fn remove_member(&self, group_id: &str, user_id: &str) {
        if let Some(members) = self
            .state
            .write()
            .snapshot
            .member_ids_by_group
            .get_mut(group_id.trim())
        {
            members.remove(user_id.trim());
        }
    }

    /// Empties all three lookups.
    pub fn clear_all(&self) {
        self.state.write().snapshot = DirectorySnapshot::default();
    }

    /// Clears the cache and loads `snapshot` under a single write lock.
    pub fn replace_with(&self, snapshot: DirectorySnapshot) {
        self.state.write().snapshot = snapshot;
    }

    /// Records the time of the last successful full refresh.
    pub fn mark_refreshed(&self) {
        self.state.write().last_refresh = Some(Utc::now());
    }

    /// Time of the last successful full refresh, if any.
    #[must_use]
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_refresh
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        CacheStats {
            last_refresh: state.last_refresh,
            ..state.snapshot.stats()
        }
    }
}
