use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::CloudApi;
use crate::cache::StateCache;
use crate::catalog::RegionCatalog;
use crate::config::Config;
use crate::error::ApiError;
use crate::events::CacheEvent;
use crate::fetch;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug)]
pub(crate) enum Command {
    Pause,
    Resume,
    /// Manual refresh. The optional ack fires once the triggering scan (or
    /// the in-flight scan it coalesced with) has committed.
    Refresh(Option<oneshot::Sender<()>>),
}

/// Drives periodic, cooperative, single-flight refresh cycles across all
/// enabled regions. The scan runs inside the scheduler task itself, so a
/// second scan can never start while one is in flight; refresh requests
/// arriving mid-scan coalesce with it.
pub struct RefreshScheduler {
    command_tx: mpsc::Sender<Command>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    pub(crate) fn start(
        cfg: &Config,
        api: Arc<dyn CloudApi>,
        catalog: Arc<RegionCatalog>,
        cache: Arc<StateCache>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = SchedulerTask {
            interval: cfg.refresh_interval,
            fetch_timeout: cfg.fetch_timeout,
            worker_budget: cfg.worker_budget.max(1),
            api,
            catalog,
            cache,
            command_rx,
            shutdown_rx,
            paused: !cfg.auto_refresh,
            halted: false,
        };
        let handle = tokio::spawn(task.run());
        Self {
            command_tx,
            shutdown_tx,
            handle,
        }
    }

    pub async fn pause(&self) {
        self.send(Command::Pause).await;
    }

    pub async fn resume(&self) {
        self.send(Command::Resume).await;
    }

    /// Fire-and-forget manual refresh.
    pub async fn manual_refresh(&self) {
        self.send(Command::Refresh(None)).await;
    }

    /// Manual refresh that resolves once the scan has committed. If a scan
    /// is already in flight the request coalesces with it and resolves when
    /// that scan commits.
    pub async fn refresh_and_wait(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Refresh(Some(done_tx))).await;
        // A dropped sender still means the scan (or the scheduler) is done.
        let _ = done_rx.await;
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.handle.await {
            error!(?err, "refresh scheduler task panicked");
        }
    }

    /// Control commands are must-deliver: a full channel applies
    /// backpressure to the caller instead of dropping the command. The send
    /// only fails once the scheduler task is gone.
    async fn send(&self, command: Command) {
        if self.command_tx.send(command).await.is_err() {
            warn!("scheduler command ignored; scheduler has shut down");
        }
    }
}

struct SchedulerTask {
    interval: Duration,
    fetch_timeout: Duration,
    worker_budget: usize,
    api: Arc<dyn CloudApi>,
    catalog: Arc<RegionCatalog>,
    cache: Arc<StateCache>,
    command_rx: mpsc::Receiver<Command>,
    shutdown_rx: watch::Receiver<bool>,
    paused: bool,
    halted: bool,
}

impl SchedulerTask {
    async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            worker_budget = self.worker_budget,
            paused = self.paused,
            "starting refresh scheduler"
        );
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick(), if !self.paused && !self.halted => {
                    self.run_scan(Vec::new()).await;
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Pause) => {
                            debug!("scheduler paused");
                            self.paused = true;
                        }
                        Some(Command::Resume) => {
                            debug!("scheduler resumed");
                            self.paused = false;
                            self.halted = false;
                        }
                        Some(Command::Refresh(ack)) => {
                            // Manual refresh works even while paused; while
                            // halted it is refused until a resume.
                            if self.halted {
                                warn!("manual refresh ignored; scheduler is halted");
                                drop(ack);
                            } else {
                                let acks = ack.into_iter().collect();
                                self.run_scan(acks).await;
                            }
                        }
                        None => break,
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("refresh scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one scan to completion while continuing to service commands.
    /// A pause request mid-scan lets the scan finish and commit, then
    /// suppresses subsequent ticks; refresh requests mid-scan coalesce.
    async fn run_scan(&mut self, mut acks: Vec<oneshot::Sender<()>>) {
        let scan = scan_once(
            Arc::clone(&self.api),
            Arc::clone(&self.catalog),
            Arc::clone(&self.cache),
            self.worker_budget,
            self.fetch_timeout,
        );
        tokio::pin!(scan);

        let result = loop {
            tokio::select! {
                result = &mut scan => break result,
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Pause) => self.paused = true,
                        Some(Command::Resume) => self.paused = false,
                        Some(Command::Refresh(ack)) => {
                            debug!("manual refresh coalesced with in-flight scan");
                            acks.extend(ack);
                        }
                        None => {}
                    }
                }
            }
        };

        if let Err(err) = result {
            error!(%err, "fatal error during scan; halting scheduler");
            self.halted = true;
            self.paused = true;
            self.cache.emit(CacheEvent::SchedulerHalted {
                reason: err.to_string(),
            });
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
}

/// One full refresh cycle: fan out fetches across enabled regions with
/// bounded parallelism, wait for every fetch to settle, then commit all
/// results in a single pass. Returns `Err` only for fatal (auth) failures.
async fn scan_once(
    api: Arc<dyn CloudApi>,
    catalog: Arc<RegionCatalog>,
    cache: Arc<StateCache>,
    worker_budget: usize,
    fetch_timeout: Duration,
) -> Result<(), ApiError> {
    let regions = match catalog.enabled_regions().await {
        Ok(regions) => regions,
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            warn!(%err, "region listing failed; skipping this scan");
            return Ok(());
        }
    };
    if regions.is_empty() {
        debug!("no enabled regions; nothing to scan");
        return Ok(());
    }

    let results: Vec<_> = stream::iter(regions.into_iter().map(|region| {
        let api = Arc::clone(&api);
        async move { fetch::fetch_instances(api.as_ref(), &region, fetch_timeout).await }
    }))
    .buffer_unordered(worker_budget)
    .collect()
    .await;

    // All fetches have settled; one reconciliation pass commits results.
    // A failed region only flips its own staleness flag.
    let mut failed_regions = 0;
    let mut fatal = None;
    for result in results {
        match result {
            Ok(snapshot) => {
                cache.merge_confirmed(&snapshot.region, snapshot.records, snapshot.as_of);
            }
            Err(unavailable) => {
                failed_regions += 1;
                cache.mark_unavailable(&unavailable.region, &unavailable.source);
                if unavailable.source.is_fatal() && fatal.is_none() {
                    fatal = Some(unavailable.source);
                }
            }
        }
    }

    let tick = cache.advance_tick();
    debug!(tick, failed_regions, "scan committed");
    cache.emit(CacheEvent::ScanCompleted {
        tick,
        failed_regions,
    });

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
