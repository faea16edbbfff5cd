//! `KubeWatchRegistrar`: installs/tears down per-GVK `kube` watchers,
//! forwarding observed events into a channel a [`crate::dispatch::run_dispatcher`]
//! task drains into a `CacheManager`. Grounded on `orka_kubehub::start_watcher`'s
//! list+watch loop, generalized from a single fixed GVK to a reconciled set.

use futures::TryStreamExt;
use kube::{
    api::Api,
    core::DynamicObject,
    runtime::watcher::{self, Event},
    Client,
};
use orka_sync::{Gvk, RegistrarError, WatchRegistrar};
use rustc_hash::FxHashSet;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A raw watch observation, handed off to a dispatcher task that owns the
/// `CacheManager` (avoids a registrar -> manager ownership cycle).
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Applied(serde_json::Value),
    Deleted(serde_json::Value),
}

pub struct KubeWatchRegistrar {
    client: Client,
    tasks: Mutex<rustc_hash::FxHashMap<Gvk, JoinHandle<()>>>,
    events_tx: mpsc::Sender<WatchEvent>,
}

impl KubeWatchRegistrar {
    pub fn new(client: Client, events_tx: mpsc::Sender<WatchEvent>) -> Self {
        Self { client, tasks: Mutex::new(rustc_hash::FxHashMap::default()), events_tx }
    }

    async fn spawn_watch(&self, gvk: Gvk) -> anyhow::Result<JoinHandle<()>> {
        let kube_gvk = kube::core::GroupVersionKind {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        };
        let (ar, _namespaced) = orka_kubehub::find_api_resource(self.client.clone(), &kube_gvk).await?;
        let client = self.client.clone();
        let tx = self.events_tx.clone();
        let gvk_for_log = gvk.clone();

        Ok(tokio::spawn(async move {
            // Cluster-wide watch across all namespaces, matching kubehub's
            // default when no single namespace scope is requested.
            let api: Api<DynamicObject> = Api::all_with(client, &ar);
            let stream = watcher::watcher(api, watcher::Config::default());
            futures::pin_mut!(stream);
            info!(gvk = %gvk_for_log, "watch started");
            loop {
                match stream.try_next().await {
                    Ok(Some(Event::Applied(obj))) => {
                        if let Ok(v) = serde_json::to_value(&obj) {
                            let _ = tx.send(WatchEvent::Applied(v)).await;
                        }
                    }
                    Ok(Some(Event::Deleted(obj))) => {
                        if let Ok(v) = serde_json::to_value(&obj) {
                            let _ = tx.send(WatchEvent::Deleted(v)).await;
                        }
                    }
                    Ok(Some(Event::Restarted(list))) => {
                        for obj in list {
                            if let Ok(v) = serde_json::to_value(&obj) {
                                let _ = tx.send(WatchEvent::Applied(v)).await;
                            }
                        }
                    }
                    Ok(None) => {
                        warn!(gvk = %gvk_for_log, "watch stream ended");
                        return;
                    }
                    Err(err) => {
                        warn!(gvk = %gvk_for_log, error = %err, "watch stream error, stopping task");
                        return;
                    }
                }
            }
        }))
    }
}

#[async_trait::async_trait]
impl WatchRegistrar for KubeWatchRegistrar {
    async fn replace_watch(&self, desired: &FxHashSet<Gvk>) -> Result<(), RegistrarError> {
        let mut tasks = self.tasks.lock().await;
        let current: FxHashSet<Gvk> = tasks.keys().cloned().collect();

        let mut remove_failed = FxHashSet::default();
        for gvk in current.difference(desired) {
            if let Some(handle) = tasks.remove(gvk) {
                handle.abort();
            } else {
                remove_failed.insert(gvk.clone());
            }
        }

        let mut add_failed = FxHashSet::default();
        for gvk in desired.difference(&current) {
            match self.spawn_watch(gvk.clone()).await {
                Ok(handle) => {
                    tasks.insert(gvk.clone(), handle);
                }
                Err(err) => {
                    warn!(gvk = %gvk, error = %err, "failed to start watch");
                    add_failed.insert(gvk.clone());
                }
            }
        }

        if add_failed.is_empty() && remove_failed.is_empty() {
            Ok(())
        } else {
            Err(RegistrarError { general: None, add_failed, remove_failed })
        }
    }
}

impl Drop for KubeWatchRegistrar {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.try_lock() {
            for handle in tasks.values() {
                handle.abort();
            }
        }
    }
}

/// Wire a fresh channel + registrar pair; callers hand the receiver to
/// [`crate::dispatch::run_dispatcher`] and the registrar to
/// `CacheManager::new`.
pub fn new_registrar(client: Client, buffer: usize) -> (KubeWatchRegistrar, mpsc::Receiver<WatchEvent>) {
    let (tx, rx) = mpsc::channel(buffer);
    (KubeWatchRegistrar::new(client, tx), rx)
}
