//! External collaborator contracts (spec.md §6): the watch registrar, the
//! policy data client, the readiness tracker, the process excluder, and the
//! cluster reader used for relist. Concrete implementations live outside
//! this crate (see `orka-sync-kube`); tests here use in-memory fakes.

use rustc_hash::FxHashSet;

use crate::registrar_error::RegistrarError;
use crate::types::Gvk;

/// Target of a `remove_data` call: a single object, or the wipe sentinel
/// meaning "delete all replicated data" (spec.md's `wipeSentinel`).
pub enum RemoveTarget<'a> {
    Object(&'a serde_json::Value),
    WipeAll,
}

/// Installs/removes informers for a GVK set in the cluster.
#[async_trait::async_trait]
pub trait WatchRegistrar: Send + Sync {
    /// Reconcile the registrar's watched set to exactly `desired`. Returns
    /// `Err` only when something failed; a partial failure is reported via
    /// [`RegistrarError::add_failed`]/`remove_failed`, not a general `Err`
    /// outcome, so the caller can still inspect which GVKs succeeded.
    async fn replace_watch(&self, desired: &FxHashSet<Gvk>) -> Result<(), RegistrarError>;
}

/// Accepts additions/removals into the replicated policy data cache.
#[async_trait::async_trait]
pub trait PolicyDataClient: Send + Sync {
    async fn add_data(&self, obj: &serde_json::Value) -> anyhow::Result<()>;
    async fn remove_data(&self, target: RemoveTarget<'_>) -> anyhow::Result<()>;
}

/// Records per-GVK/per-object data expectations for readiness.
pub trait ReadinessTracker: Send + Sync {
    fn observe(&self, gvk: &Gvk, obj: &serde_json::Value);
    fn cancel_expect(&self, gvk: &Gvk, obj: &serde_json::Value);
    /// Cancel the expectation for `gvk` only if one is outstanding; returns
    /// whether anything was cancelled.
    fn try_cancel_data(&self, gvk: &Gvk) -> bool;
    fn cancel_data(&self, gvk: &Gvk);
    fn data_gvks(&self) -> Vec<Gvk>;
    fn satisfied(&self) -> bool;
    fn sync_sources_satisfied(&self) -> bool;
}

/// Decides whether an object is out-of-scope for namespace/process reasons.
pub trait ProcessExcluder: Send + Sync {
    fn is_excluded(&self, namespace: Option<&str>) -> bool;
}

/// Lists every live object of a GVK from the cluster, for replay.
#[async_trait::async_trait]
pub trait ClusterReader: Send + Sync {
    async fn list(&self, gvk: &Gvk) -> anyhow::Result<Vec<serde_json::Value>>;
}
