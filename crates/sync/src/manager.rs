//! Cache Manager (C3): ties the [`GvkAggregator`] and [`WatchSet`] together
//! with a background reconciliation loop that installs/removes watches,
//! wipes and replays the replicated policy-data cache, and feeds the
//! readiness tracker. This is the bulk of the sync cache manager; compare
//! the tick/select-loop shape to `orka_store::spawn_ingest`'s ticker.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use metrics::{counter, gauge, histogram};
use rand::Rng;
use rustc_hash::FxHashSet;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregator::GvkAggregator;
use crate::config::{CacheManagerConfig, ReadinessCancelPolicy};
use crate::error::SyncError;
use crate::objutil::gvk_of;
use crate::registrar_error::RegistrarError;
use crate::traits::{ClusterReader, PolicyDataClient, ProcessExcluder, ReadinessTracker, RemoveTarget, WatchRegistrar};
use crate::types::{Gvk, SourceKey};
use crate::watchset::WatchSet;

struct ReplayHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Bookkeeping the background loop needs between ticks. Held behind a single
/// lock so a tick always observes a consistent view.
#[derive(Default)]
struct ManagerState {
    gvks_to_delete_from_cache: FxHashSet<Gvk>,
    dangling_watches: FxHashSet<Gvk>,
    need_to_list: bool,
    excluder_changed: bool,
    replay: Option<ReplayHandle>,
}

/// The Cache Manager: aggregates per-source GVK requirements, reconciles the
/// watch set against the registrar, and keeps the replicated policy-data
/// cache in sync with the cluster (spec.md §4.2-§4.3).
pub struct CacheManager<R, D, T, C>
where
    R: WatchRegistrar,
    D: PolicyDataClient,
    T: ReadinessTracker,
    C: ClusterReader,
{
    aggregator: GvkAggregator,
    watched: WatchSet,
    registrar: R,
    data_client: D,
    tracker: T,
    reader: C,
    excluder: ArcSwap<dyn ProcessExcluder>,
    state: RwLock<ManagerState>,
    config: CacheManagerConfig,
}

impl<R, D, T, C> CacheManager<R, D, T, C>
where
    R: WatchRegistrar + 'static,
    D: PolicyDataClient + 'static,
    T: ReadinessTracker + 'static,
    C: ClusterReader + 'static,
{
    pub fn new(
        registrar: R,
        data_client: D,
        tracker: T,
        reader: C,
        excluder: Arc<dyn ProcessExcluder>,
        config: CacheManagerConfig,
    ) -> Self {
        Self {
            aggregator: GvkAggregator::new(),
            watched: WatchSet::new(),
            registrar,
            data_client,
            tracker,
            reader,
            excluder: ArcSwap::new(excluder),
            state: RwLock::new(ManagerState::default()),
            config,
        }
    }

    /// Add or replace a source's GVK requirements, reconciling the watch set
    /// immediately (spec.md §4.2 `UpsertSource`). An empty `new_gvks` is
    /// equivalent to [`Self::remove_source`].
    pub async fn upsert_source(&self, key: SourceKey, new_gvks: Vec<Gvk>) -> anyhow::Result<()> {
        let new_set: FxHashSet<Gvk> = new_gvks.into_iter().filter(|g| !g.is_empty()).collect();
        if new_set.is_empty() {
            self.aggregator.remove(&key);
        } else {
            self.aggregator.upsert(&key, new_set.iter().cloned()).map_err(SyncError::from)?;
        }

        let mut state = self.state.write().await;
        let Some(err) = self.replace_watch_set_locked(&mut state).await else {
            return Ok(());
        };

        if err.is_general() {
            self.cancel_readiness_for(&new_set, &mut state).await;
            return Err(SyncError::Registrar(err.to_string()).into());
        }

        let relevant: FxHashSet<Gvk> = err.add_failed.intersection(&new_set).cloned().collect();
        for gvk in &relevant {
            self.tracker.try_cancel_data(gvk);
        }
        if relevant.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Registrar(err.to_string()).into())
        }
    }

    /// Remove a source's GVK requirements entirely. Only a general registrar
    /// error is surfaced; per-GVK remove failures are absorbed into
    /// `dangling_watches` for the background loop to retry.
    pub async fn remove_source(&self, key: &SourceKey) -> anyhow::Result<()> {
        self.aggregator.remove(key);
        let mut state = self.state.write().await;
        match self.replace_watch_set_locked(&mut state).await {
            Some(err) if err.is_general() => Err(SyncError::Registrar(err.to_string()).into()),
            _ => Ok(()),
        }
    }

    async fn cancel_readiness_for(&self, caller_gvks: &FxHashSet<Gvk>, _state: &mut ManagerState) {
        match self.config.cancel_policy {
            ReadinessCancelPolicy::CancelAllAggregated => {
                for gvk in self.aggregator.gvks() {
                    self.tracker.cancel_data(&gvk);
                }
            }
            ReadinessCancelPolicy::CancelCallerGvksOnly => {
                for gvk in caller_gvks {
                    self.tracker.cancel_data(gvk);
                }
            }
        }
    }

    /// Reconcile `watched` against the aggregator's current view, calling
    /// the registrar while the watch-set write lock is held (spec.md §5's
    /// ordering guarantee). Returns the registrar's error, if any, after
    /// updating `dangling_watches`/`gvks_to_delete_from_cache` per spec.md
    /// §4.2 step 4's three outcomes: clean success, a per-GVK remove
    /// failure, or a general (or otherwise unattributable) failure.
    async fn replace_watch_set_locked(&self, state: &mut ManagerState) -> Option<RegistrarError> {
        let desired = self.aggregator.gvks();
        let watched_before = self.watched.snapshot().await;
        let to_drop: FxHashSet<Gvk> = watched_before.difference(&desired).cloned().collect();

        let registrar = &self.registrar;
        let result =
            self.watched.replace(desired.clone(), |_| async move { registrar.replace_watch(&desired).await }).await;

        // spec.md §4.2 step 2: toDrop is always queued for cache deletion,
        // independent of whether the registrar confirms the removal below.
        state.gvks_to_delete_from_cache.extend(to_drop.iter().cloned());

        match result {
            Ok(()) => {
                let finished = std::mem::take(&mut state.dangling_watches);
                state.gvks_to_delete_from_cache.extend(finished);
                None
            }
            Err(err) => {
                if !err.remove_failed.is_empty() && err.general.is_none() {
                    let still_dangling = err.remove_failed.clone();
                    let finally_removed: FxHashSet<Gvk> =
                        state.dangling_watches.difference(&still_dangling).cloned().collect();
                    state.gvks_to_delete_from_cache.extend(finally_removed);
                    state.dangling_watches = still_dangling;
                } else {
                    state.dangling_watches = state.dangling_watches.union(&to_drop).cloned().collect();
                    warn!(error = %err, "registrar reported a general failure, keeping watches dangling");
                }
                Some(err)
            }
        }
    }

    /// Run the background reconciliation loop until `cancel` fires
    /// (spec.md §6: `Start(ctx) → error`).
    pub async fn start(self: Arc<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.config.tick_period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.stop_replay().await;
                    info!("cache manager loop stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let start = std::time::Instant::now();
                    self.tick().await;
                    histogram!("sync_tick_ms", start.elapsed().as_millis() as f64);
                }
            }
        }
    }

    /// Run one reconciliation pass immediately, without waiting for the next
    /// scheduled tick. `start`'s loop calls this on its own timer; exposed
    /// publicly so operational tooling can force an out-of-band resync.
    pub async fn tick(self: &Arc<Self>) {
        let mut state = self.state.write().await;

        if !state.dangling_watches.is_empty() {
            let _ = self.replace_watch_set_locked(&mut state).await;
        }

        self.wipe_cache_if_needed(&mut state).await;

        if state.need_to_list {
            state.need_to_list = false;
            self.restart_replay(&mut state).await;
        }

        gauge!("sync_dangling_watches", state.dangling_watches.len() as f64);
        drop(state);
        gauge!("sync_watched_gvks", self.watched.snapshot().await.len() as f64);
    }

    async fn wipe_cache_if_needed(&self, state: &mut ManagerState) {
        if state.gvks_to_delete_from_cache.is_empty() && !state.excluder_changed {
            return;
        }
        match self.data_client.remove_data(RemoveTarget::WipeAll).await {
            Ok(()) => {
                counter!("sync_wipes_total", 1);
                state.gvks_to_delete_from_cache.clear();
                state.excluder_changed = false;
                state.need_to_list = true;
            }
            Err(err) => {
                warn!(error = %err, "cache wipe failed, will retry next tick");
            }
        }
    }

    async fn stop_replay(&self) {
        let mut state = self.state.write().await;
        if let Some(prev) = state.replay.take() {
            prev.token.cancel();
            if tokio::time::timeout(self.config.relist_cancel_wait, prev.handle).await.is_err() {
                warn!("previous replay did not acknowledge cancellation within the bound; abandoning it");
            }
        }
    }

    /// Cancel any in-flight replay, wait up to `relist_cancel_wait` for it to
    /// acknowledge, then spawn a fresh one over the current GVK set.
    async fn restart_replay(self: &Arc<Self>, state: &mut ManagerState) {
        if let Some(prev) = state.replay.take() {
            prev.token.cancel();
            if tokio::time::timeout(self.config.relist_cancel_wait, prev.handle).await.is_err() {
                warn!("previous replay did not acknowledge cancellation within the bound; abandoning it");
            }
        }

        let gvks: Vec<Gvk> = self.aggregator.gvks().into_iter().collect();
        let token = CancellationToken::new();
        let child_token = token.clone();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.replay_gvks(gvks, child_token).await });
        state.replay = Some(ReplayHandle { token, handle });
    }

    /// Relist every GVK in `gvks`, retrying failures with backoff until they
    /// succeed or `token` is cancelled by a newer generation.
    async fn replay_gvks(self: Arc<Self>, gvks: Vec<Gvk>, token: CancellationToken) {
        let mut remaining: FxHashSet<Gvk> = gvks.into_iter().collect();
        while !remaining.is_empty() {
            if token.is_cancelled() {
                debug!("replay superseded, stopping");
                return;
            }
            gauge!("sync_relist_remaining", remaining.len() as f64);
            let mut done = Vec::new();
            for gvk in &remaining {
                if token.is_cancelled() {
                    return;
                }
                if self.sync_gvk_with_backoff(gvk, &token).await {
                    done.push(gvk.clone());
                }
            }
            for gvk in done {
                remaining.remove(&gvk);
            }
        }
        gauge!("sync_relist_remaining", 0.0);
    }

    /// Retry `sync_gvk` with bounded exponential backoff, short-circuiting
    /// to success if `token` is cancelled (we no longer want this GVK).
    async fn sync_gvk_with_backoff(&self, gvk: &Gvk, token: &CancellationToken) -> bool {
        let cfg = &self.config.backoff;
        let mut delay = cfg.base;
        for attempt in 0..cfg.steps {
            if token.is_cancelled() {
                return true;
            }
            counter!("sync_relist_attempts_total", 1, "gvk" => gvk.to_string());
            match self.sync_gvk(gvk).await {
                Ok(()) => return true,
                Err(err) => {
                    counter!("sync_relist_failures_total", 1, "gvk" => gvk.to_string());
                    warn!(gvk = %gvk, attempt, error = %err, "relist failed, backing off");
                }
            }
            if attempt + 1 == cfg.steps {
                break;
            }
            let jittered = delay.mul_f64(1.0 + cfg.jitter * rand::thread_rng().gen::<f64>());
            tokio::select! {
                _ = token.cancelled() => return true,
                _ = tokio::time::sleep(jittered) => {}
            }
            delay = Duration::from_secs_f64(delay.as_secs_f64() * cfg.factor);
        }
        false
    }

    async fn sync_gvk(&self, gvk: &Gvk) -> anyhow::Result<()> {
        if !self.watched.contains(gvk).await {
            return Ok(());
        }
        let objects = self.reader.list(gvk).await?;
        for obj in &objects {
            self.add_object(obj).await?;
        }
        Ok(())
    }

    /// Feed a live or relisted object into the tracker and (if in scope and
    /// still watched) the policy data client. The tracker is always
    /// notified, even for out-of-scope or no-longer-watched objects, so its
    /// expectation bookkeeping stays accurate.
    pub async fn add_object(&self, obj: &serde_json::Value) -> anyhow::Result<()> {
        let gvk = gvk_of(obj)?;
        let namespace = crate::objutil::namespace_of(obj);

        if self.excluder.load().is_excluded(namespace) {
            self.tracker.cancel_expect(&gvk, obj);
            return Ok(());
        }

        if self.watched.contains(&gvk).await {
            match self.data_client.add_data(obj).await {
                Ok(()) => counter!("sync_objects_active_total", 1, "gvk" => gvk.to_string()),
                Err(err) => {
                    counter!("sync_objects_error_total", 1, "gvk" => gvk.to_string());
                    error!(gvk = %gvk, error = %err, "failed to add object to policy data cache");
                }
            }
        }

        self.tracker.observe(&gvk, obj);
        Ok(())
    }

    /// Remove an object from the policy data cache, propagating failure so
    /// the caller (typically the watch event dispatcher) can retry.
    pub async fn remove_object(&self, obj: &serde_json::Value) -> anyhow::Result<()> {
        let gvk = gvk_of(obj)?;
        self.data_client.remove_data(RemoveTarget::Object(obj)).await?;
        counter!("sync_objects_removed_total", 1, "gvk" => gvk.to_string());
        self.tracker.cancel_expect(&gvk, obj);
        Ok(())
    }

    /// Swap the process excluder. A no-op if `new_excluder` is the same
    /// instance already installed (identity, not value, equality — the
    /// excluder is an opaque trait object).
    pub async fn exclude_processes(&self, new_excluder: Arc<dyn ProcessExcluder>) {
        let unchanged = Arc::ptr_eq(&*self.excluder.load(), &new_excluder);
        if unchanged {
            return;
        }
        self.excluder.store(new_excluder);
        self.state.write().await.excluder_changed = true;
    }

    pub async fn watched_gvks(&self) -> Vec<Gvk> {
        self.watched.snapshot().await.into_iter().collect()
    }

    /// GVKs currently dangling (remove requested, registrar hasn't confirmed
    /// yet) — retried automatically on the next tick.
    pub async fn dangling_watches(&self) -> Vec<Gvk> {
        self.state.read().await.dangling_watches.iter().cloned().collect()
    }

    /// Access the readiness tracker this manager reports into; the
    /// expectations pruner ([`crate::pruner::run_pruner`]) drives the same
    /// instance to decide what it may safely cancel.
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Apply `f` to every currently watched GVK, stopping at the first error.
    pub async fn do_for_each<F>(&self, mut f: F) -> anyhow::Result<()>
    where
        F: FnMut(&Gvk) -> anyhow::Result<()>,
    {
        for gvk in self.watched.snapshot().await.iter() {
            f(gvk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRegistrar {
        fail_next: Mutex<Option<RegistrarError>>,
        last_desired: Mutex<FxHashSet<Gvk>>,
    }

    #[async_trait]
    impl WatchRegistrar for FakeRegistrar {
        async fn replace_watch(&self, desired: &FxHashSet<Gvk>) -> Result<(), RegistrarError> {
            *self.last_desired.lock().unwrap() = desired.clone();
            if let Some(err) = self.fail_next.lock().unwrap().take() {
                return Err(err);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDataClient {
        added: AtomicUsize,
        removed: AtomicUsize,
        wipes: AtomicUsize,
    }

    #[async_trait]
    impl PolicyDataClient for FakeDataClient {
        async fn add_data(&self, _obj: &serde_json::Value) -> anyhow::Result<()> {
            self.added.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn remove_data(&self, target: RemoveTarget<'_>) -> anyhow::Result<()> {
            match target {
                RemoveTarget::Object(_) => {
                    self.removed.fetch_add(1, Ordering::SeqCst);
                }
                RemoveTarget::WipeAll => {
                    self.wipes.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTracker {
        cancelled: Mutex<Vec<Gvk>>,
    }

    impl ReadinessTracker for FakeTracker {
        fn observe(&self, _gvk: &Gvk, _obj: &serde_json::Value) {}
        fn cancel_expect(&self, _gvk: &Gvk, _obj: &serde_json::Value) {}
        fn try_cancel_data(&self, gvk: &Gvk) -> bool {
            self.cancelled.lock().unwrap().push(gvk.clone());
            true
        }
        fn cancel_data(&self, gvk: &Gvk) {
            self.cancelled.lock().unwrap().push(gvk.clone());
        }
        fn data_gvks(&self) -> Vec<Gvk> {
            Vec::new()
        }
        fn satisfied(&self) -> bool {
            true
        }
        fn sync_sources_satisfied(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct FakeReader;

    #[async_trait]
    impl ClusterReader for FakeReader {
        async fn list(&self, _gvk: &Gvk) -> anyhow::Result<Vec<serde_json::Value>> {
            Ok(Vec::new())
        }
    }

    struct AllowAll;
    impl ProcessExcluder for AllowAll {
        fn is_excluded(&self, _namespace: Option<&str>) -> bool {
            false
        }
    }

    fn gvk(kind: &str) -> Gvk {
        Gvk::new("", "v1", kind)
    }

    type TestManager = CacheManager<FakeRegistrar, FakeDataClient, FakeTracker, FakeReader>;

    fn make_manager() -> Arc<TestManager> {
        Arc::new(CacheManager::new(
            FakeRegistrar::default(),
            FakeDataClient::default(),
            FakeTracker::default(),
            FakeReader,
            Arc::new(AllowAll),
            CacheManagerConfig::default(),
        ))
    }

    #[tokio::test]
    async fn upsert_adds_to_watch_set_on_success() {
        let mgr = make_manager();
        mgr.upsert_source(SourceKey::new("syncset", "a"), vec![gvk("ConfigMap")]).await.unwrap();
        assert_eq!(mgr.watched_gvks().await, vec![gvk("ConfigMap")]);
        assert_eq!(mgr.registrar.last_desired.lock().unwrap().clone(), FxHashSet::from_iter([gvk("ConfigMap")]));
    }

    #[tokio::test]
    async fn upsert_with_empty_gvks_behaves_like_remove() {
        let mgr = make_manager();
        mgr.upsert_source(SourceKey::new("syncset", "a"), vec![gvk("ConfigMap")]).await.unwrap();
        mgr.upsert_source(SourceKey::new("syncset", "a"), vec![]).await.unwrap();
        assert!(mgr.watched_gvks().await.is_empty());
    }

    #[tokio::test]
    async fn remove_source_shrinks_watch_set() {
        let mgr = make_manager();
        mgr.upsert_source(SourceKey::new("syncset", "a"), vec![gvk("ConfigMap"), gvk("Pod")]).await.unwrap();
        mgr.remove_source(&SourceKey::new("syncset", "a")).await.unwrap();
        assert!(mgr.watched_gvks().await.is_empty());
    }

    #[tokio::test]
    async fn general_registrar_error_cancels_all_aggregated_readiness() {
        let mgr = make_manager();
        *mgr.registrar.fail_next.lock().unwrap() = Some(RegistrarError::general("etcd unreachable"));
        let result = mgr.upsert_source(SourceKey::new("syncset", "a"), vec![gvk("ConfigMap")]).await;
        assert!(result.is_err());
        assert_eq!(mgr.tracker.cancelled.lock().unwrap().clone(), vec![gvk("ConfigMap")]);
    }

    #[tokio::test]
    async fn per_gvk_add_failure_only_errors_for_relevant_caller() {
        let mgr = make_manager();
        *mgr.registrar.fail_next.lock().unwrap() = Some(RegistrarError::add_failed([gvk("Secret")]));
        let result = mgr.upsert_source(SourceKey::new("syncset", "a"), vec![gvk("ConfigMap")]).await;
        assert!(result.is_ok());

        *mgr.registrar.fail_next.lock().unwrap() = Some(RegistrarError::add_failed([gvk("Secret")]));
        let result = mgr.upsert_source(SourceKey::new("syncset", "b"), vec![gvk("Secret")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dangling_watches_tracked_on_remove_failure() {
        let mgr = make_manager();
        mgr.upsert_source(SourceKey::new("syncset", "a"), vec![gvk("ConfigMap")]).await.unwrap();

        *mgr.registrar.fail_next.lock().unwrap() = Some(RegistrarError::remove_failed([gvk("ConfigMap")]));
        mgr.remove_source(&SourceKey::new("syncset", "a")).await.unwrap();

        let state = mgr.state.read().await;
        assert_eq!(state.dangling_watches, FxHashSet::from_iter([gvk("ConfigMap")]));
    }

    #[tokio::test]
    async fn exclude_processes_is_noop_for_same_instance() {
        let mgr = make_manager();
        let excluder: Arc<dyn ProcessExcluder> = Arc::new(AllowAll);
        mgr.exclude_processes(Arc::clone(&excluder)).await;
        assert!(!mgr.state.read().await.excluder_changed);
        mgr.exclude_processes(excluder).await;
        assert!(!mgr.state.read().await.excluder_changed);
    }

    #[tokio::test]
    async fn exclude_processes_marks_changed_for_new_instance() {
        let mgr = make_manager();
        mgr.exclude_processes(Arc::new(AllowAll)).await;
        assert!(mgr.state.read().await.excluder_changed);
    }

    #[tokio::test]
    async fn add_object_routes_excluded_objects_to_cancel_expect_only() {
        let mgr = make_manager();
        mgr.upsert_source(SourceKey::new("syncset", "a"), vec![gvk("ConfigMap")]).await.unwrap();
        let obj = serde_json::json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"namespace": "kube-system"}});
        mgr.add_object(&obj).await.unwrap();
        assert_eq!(mgr.data_client.added.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn add_object_skips_data_client_when_not_watched() {
        let mgr = make_manager();
        let obj = serde_json::json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"namespace": "default"}});
        mgr.add_object(&obj).await.unwrap();
        assert_eq!(mgr.data_client.added.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tick_wipes_cache_when_watch_set_shrinks() {
        let mgr = make_manager();
        mgr.upsert_source(SourceKey::new("syncset", "a"), vec![gvk("ConfigMap")]).await.unwrap();
        mgr.remove_source(&SourceKey::new("syncset", "a")).await.unwrap();
        mgr.tick().await;
        assert_eq!(mgr.data_client.wipes.load(Ordering::SeqCst), 1);
    }
}
