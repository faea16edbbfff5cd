//! Drains [`crate::registrar::WatchEvent`]s from a `KubeWatchRegistrar` into
//! a `CacheManager`'s `add_object`/`remove_object`. Kept as a standalone task
//! (rather than letting the registrar hold the manager directly) to avoid a
//! registrar -> manager ownership cycle, the same shape `orka_kubehub::start_watcher`
//! uses to hand deltas off to a channel a separate task consumes.

use std::sync::Arc;

use orka_sync::{CacheManager, ClusterReader, PolicyDataClient, ReadinessTracker, WatchRegistrar};
use tokio::sync::mpsc;
use tracing::error;

use crate::registrar::WatchEvent;

pub async fn run_dispatcher<R, D, T, C>(manager: Arc<CacheManager<R, D, T, C>>, mut events_rx: mpsc::Receiver<WatchEvent>)
where
    R: WatchRegistrar + 'static,
    D: PolicyDataClient + 'static,
    T: ReadinessTracker + 'static,
    C: ClusterReader + 'static,
{
    while let Some(ev) = events_rx.recv().await {
        let result = match ev {
            WatchEvent::Applied(obj) => manager.add_object(&obj).await,
            WatchEvent::Deleted(obj) => manager.remove_object(&obj).await,
        };
        if let Err(err) = result {
            error!(error = %err, "failed to dispatch watch event into cache manager");
        }
    }
}
