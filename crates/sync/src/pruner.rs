//! Expectations Pruner (C4): an independent periodic task that cancels
//! readiness expectations for GVKs no longer watched, once the sync sources
//! have finished populating them (spec.md §4.4). Shaped like the teacher's
//! other ticker loops (cf. `orka_store::spawn_ingest`), but standalone: it
//! only needs a [`ReadinessTracker`] and a way to ask what's watched.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rustc_hash::FxHashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::traits::{ClusterReader, PolicyDataClient, ProcessExcluder, ReadinessTracker, WatchRegistrar};
use crate::manager::CacheManager;

/// Run the pruner until the tracker reports global satisfaction or `cancel`
/// fires. `period` matches spec.md's "fixed period, e.g., 3s". Drives the
/// same tracker instance the manager reports into, via
/// [`CacheManager::tracker`].
pub async fn run_pruner<R, D, T, C>(
    manager: Arc<CacheManager<R, D, T, C>>,
    period: Duration,
    cancel: CancellationToken,
) where
    R: WatchRegistrar + 'static,
    D: PolicyDataClient + 'static,
    T: ReadinessTracker + 'static,
    C: ClusterReader + 'static,
{
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("expectations pruner stopped");
                return;
            }
            _ = ticker.tick() => {
                let tracker = manager.tracker();
                if tracker.satisfied() {
                    info!("readiness tracker globally satisfied, pruner exiting");
                    return;
                }
                if !tracker.sync_sources_satisfied() {
                    debug!("sync sources not yet satisfied, skipping prune tick");
                    continue;
                }
                prune_once(&manager, tracker).await;
            }
        }
    }
}

async fn prune_once<R, D, T, C>(manager: &CacheManager<R, D, T, C>, tracker: &T)
where
    R: WatchRegistrar,
    D: PolicyDataClient,
    T: ReadinessTracker + ?Sized,
    C: ClusterReader,
{
    let expected: FxHashSet<_> = tracker.data_gvks().into_iter().collect();
    let watched: FxHashSet<_> = manager.watched_gvks().await.into_iter().collect();
    for gvk in expected.difference(&watched) {
        debug!(gvk = %gvk, "pruning unmeetable readiness expectation");
        tracker.cancel_data(gvk);
        counter!("sync_pruned_expectations_total", 1, "gvk" => gvk.to_string());
    }
}
