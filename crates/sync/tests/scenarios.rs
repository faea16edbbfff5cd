//! End-to-end scenarios from the cache manager's testable-properties list,
//! driven entirely with in-memory fakes so they run without a cluster.
//! Mirrors `orka-store`'s `tests/replay.rs` placement convention.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orka_sync::{
    CacheManager, CacheManagerConfig, ClusterReader, Gvk, PolicyDataClient, ProcessExcluder, ReadinessTracker,
    RegistrarError, RemoveTarget, SourceKey, WatchRegistrar,
};
use rustc_hash::FxHashSet;

/// Inner fake registrar, held behind an `Arc` shared between the test and the
/// manager so a test can arm a failure after construction.
#[derive(Default)]
struct FakeRegistrarInner {
    fail_next: Mutex<Option<RegistrarError>>,
}

#[derive(Clone, Default)]
struct SharedRegistrar(Arc<FakeRegistrarInner>);

impl SharedRegistrar {
    fn fail_next(&self, err: RegistrarError) {
        *self.0.fail_next.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl WatchRegistrar for SharedRegistrar {
    async fn replace_watch(&self, _desired: &FxHashSet<Gvk>) -> Result<(), RegistrarError> {
        if let Some(err) = self.0.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeDataClientInner {
    wipes: AtomicUsize,
    added: Mutex<Vec<serde_json::Value>>,
}

#[derive(Clone, Default)]
struct SharedDataClient(Arc<FakeDataClientInner>);

impl SharedDataClient {
    fn wipes(&self) -> usize {
        self.0.wipes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyDataClient for SharedDataClient {
    async fn add_data(&self, obj: &serde_json::Value) -> anyhow::Result<()> {
        self.0.added.lock().unwrap().push(obj.clone());
        Ok(())
    }

    async fn remove_data(&self, target: RemoveTarget<'_>) -> anyhow::Result<()> {
        if matches!(target, RemoveTarget::WipeAll) {
            self.0.wipes.fetch_add(1, Ordering::SeqCst);
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

struct AllowAllExcluder;
impl ProcessExcluder for AllowAllExcluder {
    fn is_excluded(&self, _namespace: Option<&str>) -> bool {
        false
    }
}

fn cm() -> Gvk {
    Gvk::new("", "v1", "ConfigMap")
}
fn pod() -> Gvk {
    Gvk::new("", "v1", "Pod")
}
fn ns() -> Gvk {
    Gvk::new("", "v1", "Namespace")
}
fn nx() -> Gvk {
    Gvk::new("", "v1", "DoesNotExist")
}

type TestManager = CacheManager<SharedRegistrar, SharedDataClient, FakeTracker, FakeReader>;

fn manager() -> (Arc<TestManager>, SharedRegistrar, SharedDataClient) {
    let registrar = SharedRegistrar::default();
    let data_client = SharedDataClient::default();
    let mgr = Arc::new(CacheManager::new(
        registrar.clone(),
        data_client.clone(),
        FakeTracker::default(),
        FakeReader,
        Arc::new(AllowAllExcluder),
        CacheManagerConfig::default(),
    ));
    (mgr, registrar, data_client)
}

async fn watched_set(mgr: &TestManager) -> FxHashSet<Gvk> {
    mgr.watched_gvks().await.into_iter().collect()
}

#[tokio::test]
async fn scenario_1_add_one_source() {
    let (mgr, _registrar, _data_client) = manager();
    mgr.upsert_source(SourceKey::new("syncset", "a"), vec![cm()]).await.unwrap();
    assert_eq!(watched_set(&mgr).await, FxHashSet::from_iter([cm()]));
}

#[tokio::test]
async fn scenario_2_overwrite_a_source() {
    let (mgr, _registrar, data_client) = manager();
    let key = SourceKey::new("syncset", "a");
    mgr.upsert_source(key.clone(), vec![cm()]).await.unwrap();
    mgr.upsert_source(key, vec![pod()]).await.unwrap();
    assert_eq!(watched_set(&mgr).await, FxHashSet::from_iter([pod()]));

    // cm is enqueued for cache deletion and wiped on the next tick.
    mgr.tick().await;
    assert_eq!(data_client.wipes(), 1);
}

#[tokio::test]
async fn scenario_3_overlap_with_other_source() {
    let (mgr, _registrar, _data_client) = manager();
    let config = SourceKey::new("config", "");
    let syncset_a = SourceKey::new("syncset", "a");

    mgr.upsert_source(config, vec![pod()]).await.unwrap();
    mgr.upsert_source(syncset_a.clone(), vec![pod(), cm()]).await.unwrap();
    mgr.remove_source(&syncset_a).await.unwrap();

    // pod retained because `config` still references it; cm removed.
    assert_eq!(watched_set(&mgr).await, FxHashSet::from_iter([pod()]));
}

#[tokio::test]
async fn scenario_4_per_gvk_add_failure_isolated_per_source() {
    let (mgr, registrar, _data_client) = manager();
    mgr.upsert_source(SourceKey::new("config", ""), vec![cm()]).await.unwrap();

    registrar.fail_next(RegistrarError::add_failed([nx()]));
    let result = mgr.upsert_source(SourceKey::new("syncset", "a"), vec![pod(), nx()]).await;
    assert!(result.is_err());

    // A later, unrelated source succeeds even though a prior call on a
    // different source had an unrelated non-existent GVK.
    let result = mgr.upsert_source(SourceKey::new("syncset", "b"), vec![ns()]).await;
    assert!(result.is_ok());
    assert!(watched_set(&mgr).await.contains(&ns()));
}

#[tokio::test]
async fn scenario_5_dangling_remove_recovered() {
    let (mgr, registrar, data_client) = manager();
    let config = SourceKey::new("config", "");
    mgr.upsert_source(config.clone(), vec![cm()]).await.unwrap();

    registrar.fail_next(RegistrarError::remove_failed([cm()]));
    mgr.remove_source(&config).await.unwrap();

    // cm sits in dangling_watches until the next tick.
    assert!(mgr.dangling_watches().await.contains(&cm()));

    // Next tick: a successful ReplaceWatch moves it into the delete queue
    // and the wipe-and-relist sequence executes.
    mgr.tick().await;
    assert!(!mgr.dangling_watches().await.contains(&cm()));
    assert!(data_client.wipes() >= 1);
}

#[tokio::test]
async fn scenario_5b_partial_remove_failure_still_wipes_successfully_dropped_gvk() {
    // Drop two GVKs at once, with the registrar only failing to remove one
    // of them (`cm`; `pod` is dropped cleanly). Per spec.md §4.2 step 2,
    // `toDrop` is queued for cache deletion unconditionally, so `pod`'s
    // cached objects must still be wiped even though the overall
    // `ReplaceWatch` call reported an error.
    let (mgr, registrar, data_client) = manager();
    let config = SourceKey::new("config", "");
    mgr.upsert_source(config.clone(), vec![cm(), pod()]).await.unwrap();

    registrar.fail_next(RegistrarError::remove_failed([cm()]));
    mgr.remove_source(&config).await.unwrap();
    assert!(mgr.dangling_watches().await.contains(&cm()));
    assert!(!mgr.dangling_watches().await.contains(&pod()));

    // Keep `cm` failing on the background loop's retry so the only
    // possible source of a wipe this tick is `pod`'s unconditional
    // toDrop-enqueue, not the dangling-watch recovery path.
    registrar.fail_next(RegistrarError::remove_failed([cm()]));
    mgr.tick().await;

    assert!(mgr.dangling_watches().await.contains(&cm()));
    assert_eq!(data_client.wipes(), 1);
}

#[tokio::test]
async fn scenario_6_excluder_change_forces_re_evaluation() {
    let (mgr, _registrar, data_client) = manager();
    mgr.upsert_source(SourceKey::new("syncset", "a"), vec![cm(), pod()]).await.unwrap();

    struct DenyAll;
    impl ProcessExcluder for DenyAll {
        fn is_excluded(&self, _namespace: Option<&str>) -> bool {
            true
        }
    }
    mgr.exclude_processes(Arc::new(DenyAll)).await;

    mgr.tick().await;
    assert!(data_client.wipes() >= 1);
}
