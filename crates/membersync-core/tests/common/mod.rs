//! Common test utilities for membersync-core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use membersync_core::{
    DirectoryCache, DirectoryClient, DirectoryUser, EngineConfig, GroupResolver,
    ReconciliationEngine, RemoteError, RetryPolicy, SourceUser, SyncError, SyncResult,
    UserSource, AssignedGroup,
};

/// A recorded directory call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListGuests,
    FindGroup(String),
    ListMembers(String),
    EnsureGuest(String),
    AddMember { group_id: String, user_id: String },
    RemoveMember { group_id: String, user_id: String },
}

/// In-memory directory that records every call.
#[derive(Default)]
pub struct MockDirectory {
    guests: Mutex<Vec<DirectoryUser>>,
    groups: Mutex<HashMap<String, String>>,
    members: Mutex<HashMap<String, HashSet<String>>>,
    calls: Mutex<Vec<Call>>,
    add_failures: Mutex<VecDeque<RemoteError>>,
    invite_failures: Mutex<HashMap<String, RemoteError>>,
    failing_member_lists: Mutex<HashSet<String>>,
    guest_listing_error: Mutex<Option<RemoteError>>,
    add_hold: Mutex<Option<Arc<Semaphore>>>,
    adds_in_flight: AtomicU32,
    max_adds_in_flight: AtomicU32,
    next_id: AtomicU32,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_guest(&self, email: &str, id: &str) -> &Self {
        self.guests.lock().unwrap().push(DirectoryUser {
            id: Some(id.to_string()),
            mail: Some(email.to_string()),
            user_principal_name: None,
            user_type: Some("Guest".to_string()),
        });
        self
    }

    pub fn with_user(&self, user: DirectoryUser) -> &Self {
        self.guests.lock().unwrap().push(user);
        self
    }

    pub fn with_group(&self, name: &str, id: &str, members: &[&str]) -> &Self {
        self.groups
            .lock()
            .unwrap()
            .insert(name.to_string(), id.to_string());
        self.members.lock().unwrap().insert(
            id.to_string(),
            members.iter().map(ToString::to_string).collect(),
        );
        self
    }

    /// Makes the next `add_member` calls fail with these errors, in order.
    pub fn fail_adds_with(&self, errors: impl IntoIterator<Item = RemoteError>) -> &Self {
        self.add_failures.lock().unwrap().extend(errors);
        self
    }

    pub fn fail_invite_for(&self, email: &str, error: RemoteError) -> &Self {
        self.invite_failures
            .lock()
            .unwrap()
            .insert(email.to_string(), error);
        self
    }

    pub fn fail_member_listing_for(&self, group_id: &str) -> &Self {
        self.failing_member_lists
            .lock()
            .unwrap()
            .insert(group_id.to_string());
        self
    }

    pub fn fail_guest_listing(&self, error: RemoteError) -> &Self {
        *self.guest_listing_error.lock().unwrap() = Some(error);
        self
    }

    /// Blocks each `add_member` call until a permit is added to `hold`.
    pub fn hold_adds(&self, hold: Arc<Semaphore>) -> &Self {
        *self.add_hold.lock().unwrap() = Some(hold);
        self
    }

    pub fn adds_in_flight(&self) -> u32 {
        self.adds_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of `add_member` calls seen in flight at once.
    pub fn max_adds_in_flight(&self) -> u32 {
        self.max_adds_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn adds(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AddMember { group_id, user_id } => Some((group_id, user_id)),
                _ => None,
            })
            .collect()
    }

    pub fn removes(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::RemoveMember { group_id, user_id } => Some((group_id, user_id)),
                _ => None,
            })
            .collect()
    }

    pub fn invites(&self) -> BTreeSet<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::EnsureGuest(email) => Some(email),
                _ => None,
            })
            .collect()
    }

    pub fn members_of(&self, group_id: &str) -> HashSet<String> {
        self.members
            .lock()
            .unwrap()
            .get(group_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn list_guest_users(&self) -> Result<Vec<DirectoryUser>, RemoteError> {
        self.record(Call::ListGuests);
        if let Some(error) = self.guest_listing_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.guests.lock().unwrap().clone())
    }

    async fn find_group_id(&self, display_name: &str) -> Result<Option<String>, RemoteError> {
        self.record(Call::FindGroup(display_name.to_string()));
        Ok(self.groups.lock().unwrap().get(display_name).cloned())
    }

    async fn list_group_members(&self, group_id: &str) -> Result<HashSet<String>, RemoteError> {
        self.record(Call::ListMembers(group_id.to_string()));
        if self.failing_member_lists.lock().unwrap().contains(group_id) {
            return Err(RemoteError::from_status(503, "Service unavailable"));
        }
        Ok(self.members_of(group_id))
    }

    async fn ensure_guest_user(
        &self,
        email: &str,
        _display_name: Option<&str>,
    ) -> Result<String, RemoteError> {
        self.record(Call::EnsureGuest(email.to_string()));
        if let Some(error) = self.invite_failures.lock().unwrap().get(email) {
            return Err(error.clone());
        }

        let mut guests = self.guests.lock().unwrap();
        if let Some(existing) = guests
            .iter()
            .find(|g| g.mail.as_deref() == Some(email))
            .and_then(|g| g.id.clone())
        {
            return Ok(existing);
        }
        let id = format!("guest-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        guests.push(DirectoryUser {
            id: Some(id.clone()),
            mail: Some(email.to_string()),
            user_principal_name: None,
            user_type: Some("Guest".to_string()),
        });
        Ok(id)
    }

    async fn add_member(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError> {
        self.record(Call::AddMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
        });
        let hold = self.add_hold.lock().unwrap().clone();
        if let Some(hold) = hold {
            let in_flight = self.adds_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_adds_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            let _permit = hold.acquire().await;
            self.adds_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        if let Some(error) = self.add_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.members
            .lock()
            .unwrap()
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        Ok(())
    }

    async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError> {
        self.record(Call::RemoveMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
        });
        if let Some(members) = self.members.lock().unwrap().get_mut(group_id) {
            members.remove(user_id);
        }
        Ok(())
    }
}

/// Source returning a fixed list, or failing when built with `failing()`.
pub struct StaticSource {
    users: Option<Vec<SourceUser>>,
    fetches: AtomicU32,
    hold: Option<Arc<Semaphore>>,
}

impl StaticSource {
    pub fn new(users: Vec<SourceUser>) -> Arc<Self> {
        Arc::new(Self {
            users: Some(users),
            fetches: AtomicU32::new(0),
            hold: None,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            users: None,
            fetches: AtomicU32::new(0),
            hold: None,
        })
    }

    /// Blocks each fetch until a permit is added to `hold`.
    pub fn held(users: Vec<SourceUser>, hold: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            users: Some(users),
            fetches: AtomicU32::new(0),
            hold: Some(hold),
        })
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserSource for StaticSource {
    async fn fetch_users(&self) -> SyncResult<Vec<SourceUser>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = &self.hold {
            let _permit = hold.acquire().await;
        }
        self.users
            .clone()
            .ok_or_else(|| SyncError::Source("users page failed".to_string()))
    }
}

/// Maps each assigned group name to a directory group of the same name.
pub struct IdentityResolver;

impl GroupResolver for IdentityResolver {
    fn resolve_target_groups(&self, user: &SourceUser) -> BTreeSet<String> {
        user.assigned_groups
            .iter()
            .filter_map(|g| g.name.clone())
            .collect()
    }
}

pub fn federated_user(id: &str, email: &str, groups: &[&str]) -> SourceUser {
    SourceUser {
        id: id.to_string(),
        email: Some(email.to_string()),
        display_name: Some(format!("User {id}")),
        assigned_groups: groups.iter().map(|g| AssignedGroup::new(*g, "idp")).collect(),
    }
}

pub fn native_user(id: &str, email: &str, groups: &[&str]) -> SourceUser {
    SourceUser {
        assigned_groups: groups
            .iter()
            .map(|g| AssignedGroup::new(*g, "native"))
            .collect(),
        ..federated_user(id, email, groups)
    }
}

pub fn test_config(target_groups: &[&str], remove_memberships: bool) -> EngineConfig {
    EngineConfig {
        target_groups: target_groups.iter().map(ToString::to_string).collect(),
        remove_memberships,
        retry: RetryPolicy::for_testing(),
        ..EngineConfig::default()
    }
}

pub fn engine(
    source: Arc<StaticSource>,
    directory: Arc<MockDirectory>,
    cache: Arc<DirectoryCache>,
    config: EngineConfig,
) -> ReconciliationEngine {
    ReconciliationEngine::new(source, directory, cache, Arc::new(IdentityResolver), config)
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}
