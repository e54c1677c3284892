use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::api::{CloudApi, StatusChecks};
use crate::cache::{ReadFilter, StateCache};
use crate::catalog::RegionCatalog;
use crate::config::Config;
use crate::dispatch::{ActionDispatcher, ActionOutcome};
use crate::error::{ActionError, ApiError};
use crate::events::CacheEvent;
use crate::models::{Instance, InstanceAction, Region};
use crate::scheduler::RefreshScheduler;

/// Top-level composition of the engine: catalog, cache, scheduler and
/// dispatcher wired together with an explicit start/shutdown lifecycle.
/// This is the surface the presentation layer talks to.
pub struct Engine {
    api: Arc<dyn CloudApi>,
    cache: Arc<StateCache>,
    catalog: Arc<RegionCatalog>,
    dispatcher: ActionDispatcher,
    scheduler: RefreshScheduler,
}

impl Engine {
    /// Construct the engine and spawn the refresh scheduler. With
    /// `cfg.auto_refresh` set, periodic scanning begins immediately.
    pub fn start(cfg: Config, api: Arc<dyn CloudApi>) -> Self {
        info!(auto_refresh = cfg.auto_refresh, "starting engine");
        let cache = Arc::new(StateCache::new(&cfg));
        let catalog = Arc::new(RegionCatalog::new(Arc::clone(&api)));
        let dispatcher = ActionDispatcher::new(
            Arc::clone(&api),
            Arc::clone(&cache),
            cfg.optimistic_expiry_ticks,
            cfg.reboot_expiry_ticks,
        );
        let scheduler = RefreshScheduler::start(
            &cfg,
            Arc::clone(&api),
            Arc::clone(&catalog),
            Arc::clone(&cache),
        );
        Self {
            api,
            cache,
            catalog,
            dispatcher,
            scheduler,
        }
    }

    /// Cache-only ordered read; never blocks on network.
    pub fn read(&self, filter: &ReadFilter) -> Vec<Instance> {
        self.cache.read(filter)
    }

    pub fn is_stale(&self, region: &str) -> bool {
        self.cache.is_stale(region)
    }

    pub async fn request_action(
        &self,
        region: &str,
        id: &str,
        action: InstanceAction,
    ) -> Result<ActionOutcome, ActionError> {
        self.dispatcher.request_action(region, id, action).await
    }

    /// Current status checks for one instance, straight from the remote
    /// API; never served from the cache.
    pub async fn instance_status(
        &self,
        region: &str,
        id: &str,
    ) -> Result<StatusChecks, ApiError> {
        self.api.instance_status(region, id).await
    }

    pub async fn set_auto_refresh(&self, enabled: bool) {
        if enabled {
            self.scheduler.resume().await;
        } else {
            self.scheduler.pause().await;
        }
    }

    /// Fire-and-forget refresh trigger; coalesces with an in-flight scan.
    pub async fn manual_refresh(&self) {
        self.scheduler.manual_refresh().await;
    }

    /// Refresh and wait for the triggering (or coalesced) scan to commit.
    pub async fn refresh_and_wait(&self) {
        self.scheduler.refresh_and_wait().await;
    }

    pub fn set_pinned(&self, region: &str, id: &str, pinned: bool) -> bool {
        self.cache.set_pinned(region, id, pinned)
    }

    pub fn set_region_enabled(&self, code: &str, enabled: bool) {
        self.catalog.set_enabled(code, enabled);
    }

    /// Session region catalog (remote on first call, cached after).
    pub async fn regions(&self) -> Result<Vec<Region>, ApiError> {
        self.catalog.list().await
    }

    pub fn invalidate_regions(&self) {
        self.catalog.invalidate();
    }

    /// Subscribe to cache-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    /// Tear down: stops the scheduler and waits for any in-flight scan to
    /// finish committing.
    pub async fn shutdown(self) {
        info!("shutting down engine");
        self.scheduler.shutdown().await;
    }
}
