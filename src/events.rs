use crate::models::InstanceAction;

/// Change notifications pushed to subscribers so the presentation layer can
/// react without polling the cache. Delivered over a bounded broadcast
/// channel; a subscriber that lags loses the oldest events, never blocks
/// the writer.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A region's snapshot was merged. `changed` is false when the merge
    /// was a no-op against the cached data.
    RegionRefreshed {
        region: String,
        instances: usize,
        changed: bool,
    },
    /// One region failed during a scan; its cached data is kept but stale.
    RegionFailed { region: String, error: String },
    /// An instance missed enough consecutive fetches to be dropped.
    InstanceEvicted { region: String, id: String },
    /// The remote API accepted a control action; an optimistic overlay is
    /// now live for the instance.
    ActionAccepted {
        region: String,
        id: String,
        action: InstanceAction,
    },
    /// A full scan settled. `failed_regions` counts bulkheaded failures.
    ScanCompleted { tick: u64, failed_regions: usize },
    /// The scheduler stopped itself on a fatal (auth) error.
    SchedulerHalted { reason: String },
}
