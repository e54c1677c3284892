use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::InstanceRecord;
use crate::config::{Config, DEFAULT_EVENT_CAPACITY};
use crate::error::ApiError;
use crate::events::CacheEvent;
use crate::models::{Instance, InstanceState, Overlay, TargetState};
use crate::reconcile;

/// Optional narrowing applied by `StateCache::read`.
#[derive(Debug, Clone, Default)]
pub struct ReadFilter {
    pub region: Option<String>,
    pub state: Option<InstanceState>,
}

impl ReadFilter {
    pub fn region(mut self, code: &str) -> Self {
        self.region = Some(code.to_string());
        self
    }

    pub fn state(mut self, state: InstanceState) -> Self {
        self.state = Some(state);
        self
    }

    fn matches(&self, instance: &Instance) -> bool {
        if let Some(ref region) = self.region {
            if &instance.region != region {
                return false;
            }
        }
        if let Some(state) = self.state {
            if instance.state != state {
                return false;
            }
        }
        true
    }
}

/// One cached instance plus its consecutive-miss counter.
#[derive(Debug, Clone)]
pub(crate) struct CachedInstance {
    pub instance: Instance,
    pub misses: u32,
}

/// Everything we hold for one region. Instance order is insertion order;
/// reads layer the pinned-first sort on top without rewriting it.
#[derive(Debug, Default)]
pub(crate) struct RegionEntry {
    pub instances: Vec<CachedInstance>,
    pub as_of: Option<DateTime<Utc>>,
    pub last_fetch_failed: bool,
    pub last_error: Option<String>,
}

struct CacheInner {
    regions: HashMap<String, RegionEntry>,
    /// Logical clock advanced once per completed scan; overlay expiry is
    /// measured against it.
    tick: u64,
}

/// In-memory store of the last known instance set per region.
///
/// Single-writer discipline: every mutation goes through one internal lock,
/// so `apply_optimistic` and `merge_confirmed` are serialized with respect
/// to each other and readers never observe a half-merged snapshot. Reads
/// and writes are plain in-memory operations; nothing here touches the
/// network.
pub struct StateCache {
    inner: Mutex<CacheInner>,
    eviction_misses: u32,
    stale_ttl: Duration,
    events: broadcast::Sender<CacheEvent>,
}

impl StateCache {
    pub fn new(cfg: &Config) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            inner: Mutex::new(CacheInner {
                regions: HashMap::new(),
                tick: 0,
            }),
            eviction_misses: cfg.eviction_misses.max(1),
            stale_ttl: cfg.stale_ttl,
            events,
        }
    }

    /// Subscribe to cache-change events. Restartable: each call returns an
    /// independent receiver that observes everything emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: CacheEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    pub fn current_tick(&self) -> u64 {
        self.inner.lock().unwrap().tick
    }

    /// Advance the logical clock. The scheduler calls this once per
    /// completed scan; tests drive it directly.
    pub fn advance_tick(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        inner.tick
    }

    /// Ordered snapshot of cached instances: pinned before unpinned, each
    /// group keeping its prior relative order (stable sort on read, the
    /// underlying order is never rewritten). Never blocks on network.
    pub fn read(&self, filter: &ReadFilter) -> Vec<Instance> {
        let inner = self.inner.lock().unwrap();
        let mut region_codes: Vec<&String> = inner.regions.keys().collect();
        region_codes.sort();

        let mut out = Vec::new();
        for code in region_codes {
            let entry = &inner.regions[code];
            out.extend(
                entry
                    .instances
                    .iter()
                    .map(|c| &c.instance)
                    .filter(|i| filter.matches(i))
                    .cloned(),
            );
        }
        out.sort_by_key(|i| !i.pinned);
        out
    }

    /// True if the region has never been fetched, its last fetch failed,
    /// or its snapshot has outlived the configured TTL.
    pub fn is_stale(&self, region: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        let Some(entry) = inner.regions.get(region) else {
            return true;
        };
        if entry.last_fetch_failed {
            return true;
        }
        match entry.as_of {
            Some(as_of) => {
                let age = Utc::now().signed_duration_since(as_of);
                match age.to_std() {
                    Ok(age) => age > self.stale_ttl,
                    // Clock skew put as_of in the future; treat as fresh.
                    Err(_) => false,
                }
            }
            None => true,
        }
    }

    /// Install or replace the optimistic overlay for one instance. A new
    /// action always replaces a live overlay. No-op for an instance the
    /// cache does not know.
    pub fn apply_optimistic(
        &self,
        region: &str,
        id: &str,
        target: TargetState,
        expiry_ticks: u64,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let tick = inner.tick;
        let Some(cached) = inner
            .regions
            .get_mut(region)
            .and_then(|e| e.instances.iter_mut().find(|c| c.instance.id == id))
        else {
            warn!(region, id, "optimistic update for unknown instance ignored");
            return false;
        };
        cached.instance.optimistic = Some(Overlay {
            target,
            issued_at_tick: tick,
            expires_after_ticks: expiry_ticks,
        });
        debug!(region, id, target = %target, tick, "optimistic overlay applied");
        true
    }

    /// Merge a confirmed per-region snapshot. The reconciler's single entry
    /// point: the only path that changes `state`, `last_confirmed`, or
    /// evicts. Atomic per region; a reader sees the old snapshot or the
    /// fully merged one, never a mix.
    pub fn merge_confirmed(
        &self,
        region: &str,
        records: Vec<InstanceRecord>,
        as_of: DateTime<Utc>,
    ) {
        let outcome = {
            let mut inner = self.inner.lock().unwrap();
            let tick = inner.tick;
            let entry = inner.regions.entry(region.to_string()).or_default();
            reconcile::merge(entry, region, records, as_of, tick, self.eviction_misses)
        };

        for id in &outcome.evicted {
            info!(region, id, "instance evicted after consecutive misses");
            self.emit(CacheEvent::InstanceEvicted {
                region: region.to_string(),
                id: id.clone(),
            });
        }
        debug!(
            region,
            inserted = outcome.inserted,
            evicted = outcome.evicted.len(),
            confirmed = outcome.confirmed_overlays,
            discarded = outcome.discarded_overlays,
            "snapshot merged"
        );
        self.emit(CacheEvent::RegionRefreshed {
            region: region.to_string(),
            instances: outcome.present,
            changed: outcome.changed,
        });
    }

    /// Record a failed fetch: flips the staleness flag, keeps all cached
    /// data, and leaves every other region untouched.
    pub fn mark_unavailable(&self, region: &str, error: &ApiError) {
        {
            let mut inner = self.inner.lock().unwrap();
            let entry = inner.regions.entry(region.to_string()).or_default();
            entry.last_fetch_failed = true;
            entry.last_error = Some(error.to_string());
        }
        warn!(region, %error, "region marked stale after failed fetch");
        self.emit(CacheEvent::RegionFailed {
            region: region.to_string(),
            error: error.to_string(),
        });
    }

    /// Local-only pin toggle; affects read ordering only.
    pub fn set_pinned(&self, region: &str, id: &str, pinned: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(cached) = inner
            .regions
            .get_mut(region)
            .and_then(|e| e.instances.iter_mut().find(|c| c.instance.id == id))
        else {
            return false;
        };
        cached.instance.pinned = pinned;
        true
    }

    /// Last confirmed state for one instance, if cached.
    pub fn confirmed_state(&self, region: &str, id: &str) -> Option<InstanceState> {
        let inner = self.inner.lock().unwrap();
        inner
            .regions
            .get(region)?
            .instances
            .iter()
            .find(|c| c.instance.id == id)
            .map(|c| c.instance.state)
    }
}
