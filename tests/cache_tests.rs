//! Read ordering, staleness, filters, and failure isolation.
mod common;

use std::time::Duration;

use chrono::Utc;
use fleetwatch::error::ApiError;
use fleetwatch::models::{InstanceState, TargetState};
use fleetwatch::{Config, ReadFilter, StateCache};

use common::record;

use InstanceState::*;

fn ids(cache: &StateCache, filter: &ReadFilter) -> Vec<String> {
    cache.read(filter).into_iter().map(|i| i.id).collect()
}

#[test]
fn pinned_instances_sort_first_with_stable_groups() {
    let cache = StateCache::new(&Config::default());
    let snapshot = vec![
        record("i-1", Running),
        record("i-2", Running),
        record("i-3", Stopped),
        record("i-4", Running),
    ];
    cache.merge_confirmed("r", snapshot.clone(), Utc::now());
    assert!(cache.set_pinned("r", "i-3", true));
    assert!(cache.set_pinned("r", "i-2", true));

    let filter = ReadFilter::default();
    assert_eq!(ids(&cache, &filter), ["i-2", "i-3", "i-1", "i-4"]);

    // Repeated merges that neither add nor remove entries keep both
    // groups in their prior relative order.
    for _ in 0..3 {
        cache.advance_tick();
        cache.merge_confirmed("r", snapshot.clone(), Utc::now());
        assert_eq!(ids(&cache, &filter), ["i-2", "i-3", "i-1", "i-4"]);
    }

    cache.set_pinned("r", "i-3", false);
    assert_eq!(ids(&cache, &filter), ["i-2", "i-1", "i-3", "i-4"]);
}

#[test]
fn read_filters_by_region_and_state() {
    let cache = StateCache::new(&Config::default());
    cache.merge_confirmed(
        "us-east-1",
        vec![record("i-a", Running), record("i-b", Stopped)],
        Utc::now(),
    );
    cache.merge_confirmed("eu-west-1", vec![record("i-c", Running)], Utc::now());

    assert_eq!(
        ids(&cache, &ReadFilter::default().region("eu-west-1")),
        ["i-c"]
    );
    assert_eq!(ids(&cache, &ReadFilter::default().state(Stopped)), ["i-b"]);
    assert_eq!(
        ids(&cache, &ReadFilter::default().region("us-east-1").state(Running)),
        ["i-a"]
    );
    assert_eq!(ids(&cache, &ReadFilter::default()).len(), 3);
}

#[test]
fn staleness_tracks_fetch_history_and_ttl() {
    let cache = StateCache::new(&Config::default());
    assert!(cache.is_stale("r"), "never-fetched region must be stale");

    cache.merge_confirmed("r", vec![record("i-1", Running)], Utc::now());
    assert!(!cache.is_stale("r"));

    cache.mark_unavailable("r", &ApiError::Network("boom".into()));
    assert!(cache.is_stale("r"), "failed fetch flips the staleness flag");

    // A successful merge clears it again.
    cache.merge_confirmed("r", vec![record("i-1", Running)], Utc::now());
    assert!(!cache.is_stale("r"));
}

#[test]
fn snapshot_older_than_ttl_reads_stale() {
    let cfg = Config {
        stale_ttl: Duration::from_millis(5),
        ..Config::default()
    };
    let cache = StateCache::new(&cfg);
    cache.merge_confirmed("r", vec![record("i-1", Running)], Utc::now());
    std::thread::sleep(Duration::from_millis(20));
    assert!(cache.is_stale("r"));
}

#[test]
fn one_region_failure_leaves_others_untouched() {
    let cache = StateCache::new(&Config::default());
    cache.merge_confirmed("us-east-1", vec![record("i-a", Running)], Utc::now());
    cache.merge_confirmed("eu-west-1", vec![record("i-b", Running)], Utc::now());

    cache.mark_unavailable("eu-west-1", &ApiError::Timeout(Duration::from_secs(10)));

    assert!(cache.is_stale("eu-west-1"));
    assert!(!cache.is_stale("us-east-1"));
    // The failed region keeps its last known data.
    assert_eq!(ids(&cache, &ReadFilter::default().region("eu-west-1")), ["i-b"]);
    assert_eq!(ids(&cache, &ReadFilter::default().region("us-east-1")), ["i-a"]);
}

#[test]
fn optimistic_update_for_unknown_instance_is_a_noop() {
    let cache = StateCache::new(&Config::default());
    cache.merge_confirmed("r", vec![record("i-1", Stopped)], Utc::now());

    assert!(!cache.apply_optimistic("r", "i-unknown", TargetState::Pending, 2));
    assert!(!cache.apply_optimistic("other", "i-1", TargetState::Pending, 2));
    assert!(!cache.set_pinned("r", "i-unknown", true));

    let out = cache.read(&ReadFilter::default());
    assert_eq!(out.len(), 1);
    assert!(out[0].optimistic.is_none());
}

#[test]
fn confirmed_state_reflects_last_merge_only() {
    let cache = StateCache::new(&Config::default());
    assert_eq!(cache.confirmed_state("r", "i-1"), None);

    cache.merge_confirmed("r", vec![record("i-1", Stopped)], Utc::now());
    cache.apply_optimistic("r", "i-1", TargetState::Pending, 2);
    // The overlay is a display hint; the confirmed state is untouched.
    assert_eq!(cache.confirmed_state("r", "i-1"), Some(Stopped));
}
