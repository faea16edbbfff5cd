//! Watch Set (C2): a concurrency-safe set of GVKs with the
//! swap-under-callback primitive the Cache Manager uses to sequence a
//! registrar update with the set swap (spec.md §4.2, §5).

use rustc_hash::FxHashSet;
use std::future::Future;
use tokio::sync::RwLock;

use crate::types::Gvk;

/// Set of GVKs the registrar is believed to be watching.
pub struct WatchSet {
    inner: RwLock<FxHashSet<Gvk>>,
}

impl Default for WatchSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchSet {
    pub fn new() -> Self {
        Self { inner: RwLock::new(FxHashSet::default()) }
    }

    pub async fn contains(&self, gvk: &Gvk) -> bool {
        self.inner.read().await.contains(gvk)
    }

    /// Snapshot the current contents as an owned set.
    pub async fn snapshot(&self) -> FxHashSet<Gvk> {
        self.inner.read().await.clone()
    }

    pub async fn difference(&self, other: &FxHashSet<Gvk>) -> FxHashSet<Gvk> {
        self.inner.read().await.difference(other).cloned().collect()
    }

    pub async fn intersection(&self, other: &FxHashSet<Gvk>) -> FxHashSet<Gvk> {
        self.inner.read().await.intersection(other).cloned().collect()
    }

    pub async fn union(&self, other: &FxHashSet<Gvk>) -> FxHashSet<Gvk> {
        self.inner.read().await.union(other).cloned().collect()
    }

    /// Atomically replace the set's contents with `new_set`, invoking
    /// `callback` with the new contents *while the write lock is held*.
    /// This is what lets the Cache Manager guarantee that any event
    /// delivered after the registrar call returns observes the updated
    /// `watched` set (spec.md §5's ordering guarantee).
    pub async fn replace<F, Fut, T>(&self, new_set: FxHashSet<Gvk>, callback: F) -> T
    where
        F: FnOnce(&FxHashSet<Gvk>) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut guard = self.inner.write().await;
        *guard = new_set;
        callback(&guard).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gvk(kind: &str) -> Gvk {
        Gvk::new("", "v1", kind)
    }

    #[tokio::test]
    async fn replace_swaps_before_callback_runs() {
        let ws = WatchSet::new();
        let new_set = FxHashSet::from_iter([gvk("Pod")]);
        let observed = ws
            .replace(new_set, |contents| {
                let contains_pod = contents.contains(&gvk("Pod"));
                async move { contains_pod }
            })
            .await;
        assert!(observed);
        assert!(ws.contains(&gvk("Pod")).await);
    }

    #[tokio::test]
    async fn set_algebra() {
        let ws = WatchSet::new();
        ws.replace(FxHashSet::from_iter([gvk("Pod"), gvk("ConfigMap")]), |_| async {}).await;
        let other = FxHashSet::from_iter([gvk("ConfigMap"), gvk("Node")]);
        assert_eq!(ws.difference(&other).await, FxHashSet::from_iter([gvk("Pod")]));
        assert_eq!(ws.intersection(&other).await, FxHashSet::from_iter([gvk("ConfigMap")]));
        assert_eq!(
            ws.union(&other).await,
            FxHashSet::from_iter([gvk("Pod"), gvk("ConfigMap"), gvk("Node")])
        );
    }

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let ws = WatchSet::new();
        ws.replace(FxHashSet::from_iter([gvk("Pod")]), |_| async {}).await;
        let mut snap = ws.snapshot().await;
        snap.insert(gvk("Node"));
        assert!(!ws.contains(&gvk("Node")).await);
    }
}
