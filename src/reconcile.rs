//! Snapshot reconciliation: merges a fresh per-region snapshot into the
//! cached entry, resolving each instance against any live optimistic
//! overlay and applying the miss-count eviction policy.
//!
//! The merge is idempotent: applying the same snapshot twice in a row
//! changes nothing beyond the first application. Presence resets a miss
//! counter; absence increments it once per merge.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::api::InstanceRecord;
use crate::cache::{CachedInstance, RegionEntry};
use crate::models::Instance;

#[derive(Debug, Default)]
pub(crate) struct MergeOutcome {
    pub inserted: usize,
    pub evicted: Vec<String>,
    pub confirmed_overlays: usize,
    pub discarded_overlays: usize,
    /// Instances present in the merged snapshot.
    pub present: usize,
    /// Whether the merge changed anything a reader could observe
    /// (field updates, inserts, evictions, overlay resolution).
    pub changed: bool,
}

pub(crate) fn merge(
    entry: &mut RegionEntry,
    region: &str,
    fresh: Vec<InstanceRecord>,
    as_of: DateTime<Utc>,
    now_tick: u64,
    eviction_misses: u32,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    // Re-applying a snapshot with the as-of we already committed is a
    // replay, not a new fetch: absence must not earn a second miss.
    let replay = entry.as_of == Some(as_of);
    let mut seen: HashSet<String> = HashSet::with_capacity(fresh.len());

    for record in fresh {
        seen.insert(record.id.clone());
        match entry
            .instances
            .iter_mut()
            .find(|c| c.instance.id == record.id)
        {
            Some(cached) => {
                if cached.misses != 0 {
                    cached.misses = 0;
                    cached.instance.stale = false;
                    outcome.changed = true;
                }
                resolve_overlay(cached, &record, now_tick, &mut outcome);
                update_confirmed(&mut cached.instance, &record, &mut outcome);
                cached.instance.last_confirmed = as_of;
            }
            None => {
                // First appearance: inserted fresh, no optimism possible.
                entry.instances.push(CachedInstance {
                    instance: from_record(region, record, as_of),
                    misses: 0,
                });
                outcome.inserted += 1;
                outcome.changed = true;
            }
        }
    }

    // Absent entries: one miss per successful fetch, eviction at the
    // threshold, retained with prior data until then.
    entry.instances.retain_mut(|cached| {
        if seen.contains(&cached.instance.id) || replay {
            return true;
        }
        cached.misses += 1;
        if cached.misses >= eviction_misses {
            outcome.evicted.push(cached.instance.id.clone());
            outcome.changed = true;
            false
        } else {
            if !cached.instance.stale {
                cached.instance.stale = true;
                outcome.changed = true;
            }
            true
        }
    });

    entry.as_of = Some(as_of);
    entry.last_fetch_failed = false;
    entry.last_error = None;
    outcome.present = seen.len();
    outcome
}

/// Conflict resolution between "what we just told the cloud to do" and
/// "what the cloud now reports".
fn resolve_overlay(
    cached: &mut CachedInstance,
    record: &InstanceRecord,
    now_tick: u64,
    outcome: &mut MergeOutcome,
) {
    let Some(overlay) = cached.instance.optimistic else {
        return;
    };
    if overlay.target.is_reached(record.state) {
        // Confirmed: the remote caught up with the dispatched action.
        cached.instance.optimistic = None;
        outcome.confirmed_overlays += 1;
        outcome.changed = true;
    } else if overlay.expired(now_tick) {
        // The action was lost or overridden out-of-band; trust the remote.
        cached.instance.optimistic = None;
        outcome.discarded_overlays += 1;
        outcome.changed = true;
    }
    // Otherwise the overlay is still plausibly in flight: retain it for
    // another tick to tolerate remote eventual-consistency lag.
}

fn update_confirmed(instance: &mut Instance, record: &InstanceRecord, outcome: &mut MergeOutcome) {
    let name = record.display_name();
    if instance.state != record.state
        || instance.name != name
        || instance.instance_type != record.instance_type
        || instance.public_ip != record.public_ip
        || instance.private_ip != record.private_ip
        || instance.launch_time != record.launch_time
    {
        outcome.changed = true;
    }
    instance.state = record.state;
    instance.name = name;
    instance.instance_type = record.instance_type.clone();
    instance.public_ip = record.public_ip.clone();
    instance.private_ip = record.private_ip.clone();
    instance.launch_time = record.launch_time;
}

fn from_record(region: &str, record: InstanceRecord, as_of: DateTime<Utc>) -> Instance {
    Instance {
        name: record.display_name(),
        id: record.id,
        region: region.to_string(),
        instance_type: record.instance_type,
        public_ip: record.public_ip,
        private_ip: record.private_ip,
        launch_time: record.launch_time,
        state: record.state,
        pinned: false,
        stale: false,
        last_confirmed: as_of,
        optimistic: None,
    }
}
