//! Integration tests for the directory cache refresher.

mod common;

use common::*;
use membersync_core::{CacheRefresher, DirectoryCache, DirectoryUser, RefreshOutcome, RemoteError};
use std::collections::HashSet;
use std::sync::Arc;

fn names(groups: &[&str]) -> Vec<String> {
    groups.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_refresh_loads_guests_groups_and_members() {
    let directory = MockDirectory::new();
    directory
        .with_guest("Alice@Example.com", "u-a")
        .with_user(DirectoryUser {
            id: Some("u-b".into()),
            mail: None,
            user_principal_name: Some("Bob@Partner.org".into()),
            user_type: Some("Guest".into()),
        })
        .with_user(DirectoryUser {
            id: Some("u-m".into()),
            mail: Some("member@example.com".into()),
            user_principal_name: None,
            user_type: Some("Member".into()),
        })
        .with_user(DirectoryUser {
            id: None,
            mail: Some("noid@example.com".into()),
            user_principal_name: None,
            user_type: Some("Guest".into()),
        })
        .with_group("Sales", "g-sales", &["u-a", "u-b"]);
    let cache = Arc::new(DirectoryCache::new());
    let refresher = CacheRefresher::new(directory.clone(), cache.clone(), &names(&["Sales"]));

    let outcome = refresher.refresh().await;

    assert!(outcome.is_refreshed());
    assert_eq!(cache.guest_id("alice@example.com").as_deref(), Some("u-a"));
    assert_eq!(cache.guest_id("bob@partner.org").as_deref(), Some("u-b"));
    assert!(cache.guest_id("member@example.com").is_none());
    assert!(cache.guest_id("noid@example.com").is_none());
    assert_eq!(cache.group_id("Sales").as_deref(), Some("g-sales"));
    assert_eq!(cache.group_members("g-sales").unwrap().len(), 2);
    assert!(cache.last_refresh().is_some());
}

#[tokio::test]
async fn test_group_names_are_trimmed_and_deduplicated() {
    let directory = MockDirectory::new();
    directory.with_group("Sales", "g-sales", &[]);
    let cache = Arc::new(DirectoryCache::new());

    let refresher = CacheRefresher::new(
        directory.clone(),
        cache,
        &names(&[" Sales ", "Sales", "", "Finance"]),
    );
    refresher.refresh().await;

    assert_eq!(refresher.group_names(), ["Sales", "Finance"]);
    let lookups: Vec<Call> = directory
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::FindGroup(_)))
        .collect();
    assert_eq!(
        lookups,
        [Call::FindGroup("Sales".into()), Call::FindGroup("Finance".into())]
    );
}

#[tokio::test]
async fn test_guest_listing_failure_keeps_existing_cache() {
    let directory = MockDirectory::new();
    directory.fail_guest_listing(RemoteError::from_status(503, "Service unavailable"));
    let cache = Arc::new(DirectoryCache::new());
    cache.put_guest("old@example.com", "u-old");
    cache.put_group_id("Sales", "g-sales");
    cache.add_member("g-sales", "u-old");
    let refresher = CacheRefresher::new(directory, cache.clone(), &names(&["Sales"]));

    let outcome = refresher.refresh().await;

    assert!(matches!(outcome, RefreshOutcome::Failed(_)));
    assert_eq!(cache.guest_id("old@example.com").as_deref(), Some("u-old"));
    assert!(cache.is_member("g-sales", "u-old"));
    assert!(cache.last_refresh().is_none());
}

#[tokio::test]
async fn test_member_listing_failure_drops_only_that_group() {
    let directory = MockDirectory::new();
    directory
        .with_group("Sales", "g-sales", &["u1"])
        .with_group("Finance", "g-fin", &["u2"])
        .fail_member_listing_for("g-fin");
    let cache = Arc::new(DirectoryCache::new());
    cache.set_group_members("g-fin", HashSet::from(["stale".to_string()]));
    let refresher = CacheRefresher::new(directory, cache.clone(), &names(&["Sales", "Finance"]));

    let outcome = refresher.refresh().await;

    assert!(outcome.is_refreshed());
    assert!(cache.is_member("g-sales", "u1"));
    assert!(cache.group_members("g-fin").is_none());
    assert_eq!(cache.group_id("Finance").as_deref(), Some("g-fin"));
}

#[tokio::test]
async fn test_unknown_group_is_dropped() {
    let directory = MockDirectory::new();
    directory.with_group("Sales", "g-sales", &[]);
    let cache = Arc::new(DirectoryCache::new());
    let refresher = CacheRefresher::new(directory, cache.clone(), &names(&["Sales", "Ghost"]));

    refresher.refresh().await;

    assert!(cache.group_id("Ghost").is_none());
    assert_eq!(cache.stats().groups, 1);
}

#[tokio::test]
async fn test_no_configured_groups_skips_group_lookups() {
    let directory = MockDirectory::new();
    directory.with_guest("a@example.com", "u-a");
    let cache = Arc::new(DirectoryCache::new());
    let refresher = CacheRefresher::new(directory.clone(), cache.clone(), &[]);

    let outcome = refresher.refresh().await;

    assert!(outcome.is_refreshed());
    assert_eq!(directory.calls(), [Call::ListGuests]);
    assert_eq!(cache.stats().guests, 1);
}

#[tokio::test]
async fn test_refresh_replaces_previous_snapshot() {
    let directory = MockDirectory::new();
    directory.with_guest("new@example.com", "u-new");
    let cache = Arc::new(DirectoryCache::new());
    cache.put_guest("gone@example.com", "u-gone");
    let refresher = CacheRefresher::new(directory, cache.clone(), &[]);

    refresher.refresh().await;

    assert!(cache.guest_id("gone@example.com").is_none());
    assert_eq!(cache.guest_id("new@example.com").as_deref(), Some("u-new"));
}
