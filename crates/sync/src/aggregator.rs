//! GVK Aggregator (C1): bidirectional mapping between sync-source keys and
//! the GVKs they require, answering "which GVKs overall?" and "is this GVK
//! still wanted?" in O(1).

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::RwLock;
use thiserror::Error;
use tracing::error;

use crate::types::{Gvk, SourceKey};

#[derive(Debug, Error)]
pub enum AggregatorError {
    /// `reverse` disagreed with what `forward` implied. Should never occur;
    /// if it does, the operation that detected it is aborted.
    #[error("aggregator internal corruption: key {key} missing from reverse[{gvk}]")]
    InternalCorruption { key: SourceKey, gvk: Gvk },
}

#[derive(Default)]
struct Maps {
    forward: FxHashMap<SourceKey, FxHashSet<Gvk>>,
    reverse: FxHashMap<Gvk, FxHashSet<SourceKey>>,
}

/// Thread-safe forward/reverse bimap of sync sources to GVKs.
pub struct GvkAggregator {
    maps: RwLock<Maps>,
}

impl Default for GvkAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl GvkAggregator {
    pub fn new() -> Self {
        Self { maps: RwLock::new(Maps::default()) }
    }

    /// Replace `key`'s associated GVK set with the non-empty members of
    /// `gvks`. GVKs previously associated with `key` but absent from `gvks`
    /// are unlinked; GVKs that become unreferenced are dropped from
    /// `reverse`. If the filtered input is empty, `key` is removed
    /// entirely (equivalent to [`Self::remove`]).
    pub fn upsert(&self, key: &SourceKey, gvks: impl IntoIterator<Item = Gvk>) -> Result<(), AggregatorError> {
        let new_set: FxHashSet<Gvk> = gvks.into_iter().filter(|g| !g.is_empty()).collect();

        let mut maps = self.maps.write().expect("aggregator lock poisoned");
        let old_set = maps.forward.get(key).cloned().unwrap_or_default();
        let to_remove: Vec<Gvk> = old_set.difference(&new_set).cloned().collect();

        for g in &to_remove {
            let entry = maps.reverse.get_mut(g);
            match entry {
                Some(set) => {
                    set.remove(key);
                    if set.is_empty() {
                        maps.reverse.remove(g);
                    }
                }
                None => {
                    error!(key = %key, gvk = %g, "aggregator internal corruption detected");
                    return Err(AggregatorError::InternalCorruption { key: key.clone(), gvk: g.clone() });
                }
            }
        }

        if new_set.is_empty() {
            maps.forward.remove(key);
            return Ok(());
        }

        for g in &new_set {
            maps.reverse.entry(g.clone()).or_default().insert(key.clone());
        }
        maps.forward.insert(key.clone(), new_set);
        Ok(())
    }

    /// Unlink all GVKs from `key` and drop it from `forward`. No error if
    /// `key` is absent.
    pub fn remove(&self, key: &SourceKey) {
        let mut maps = self.maps.write().expect("aggregator lock poisoned");
        let Some(old_set) = maps.forward.remove(key) else { return };
        for g in old_set {
            if let Some(set) = maps.reverse.get_mut(&g) {
                set.remove(key);
                if set.is_empty() {
                    maps.reverse.remove(&g);
                }
            }
        }
    }

    /// O(1) membership test against `reverse`.
    pub fn is_present(&self, gvk: &Gvk) -> bool {
        self.maps.read().expect("aggregator lock poisoned").reverse.contains_key(gvk)
    }

    /// Returns a copy of `key`'s GVK set.
    pub fn list(&self, key: &SourceKey) -> FxHashSet<Gvk> {
        self.maps.read().expect("aggregator lock poisoned").forward.get(key).cloned().unwrap_or_default()
    }

    /// All GVKs currently referenced by at least one source.
    pub fn gvks(&self) -> FxHashSet<Gvk> {
        self.maps.read().expect("aggregator lock poisoned").reverse.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gvk(kind: &str) -> Gvk {
        Gvk::new("", "v1", kind)
    }

    fn key(id: &str) -> SourceKey {
        SourceKey::new("syncset", id)
    }

    #[test]
    fn upsert_then_list_and_gvks() {
        let agg = GvkAggregator::new();
        let k = key("a");
        agg.upsert(&k, vec![gvk("ConfigMap")]).unwrap();
        assert_eq!(agg.list(&k), FxHashSet::from_iter([gvk("ConfigMap")]));
        assert_eq!(agg.gvks(), FxHashSet::from_iter([gvk("ConfigMap")]));
        assert!(agg.is_present(&gvk("ConfigMap")));
        assert!(!agg.is_present(&gvk("Pod")));
    }

    #[test]
    fn empty_gvk_is_silently_dropped() {
        let agg = GvkAggregator::new();
        let k = key("a");
        agg.upsert(&k, vec![gvk("ConfigMap"), Gvk::new("", "", "")]).unwrap();
        assert_eq!(agg.list(&k), FxHashSet::from_iter([gvk("ConfigMap")]));
    }

    #[test]
    fn upsert_with_only_empty_gvks_removes_key() {
        let agg = GvkAggregator::new();
        let k = key("a");
        agg.upsert(&k, vec![gvk("ConfigMap")]).unwrap();
        agg.upsert(&k, vec![Gvk::new("", "", "")]).unwrap();
        assert!(agg.list(&k).is_empty());
        assert!(!agg.is_present(&gvk("ConfigMap")));
    }

    #[test]
    fn upsert_is_idempotent() {
        let agg = GvkAggregator::new();
        let k = key("a");
        agg.upsert(&k, vec![gvk("ConfigMap"), gvk("Pod")]).unwrap();
        agg.upsert(&k, vec![gvk("ConfigMap"), gvk("Pod")]).unwrap();
        assert_eq!(agg.list(&k), FxHashSet::from_iter([gvk("ConfigMap"), gvk("Pod")]));
        assert_eq!(agg.gvks().len(), 2);
    }

    #[test]
    fn upsert_coalesces_duplicate_inputs() {
        let agg = GvkAggregator::new();
        let k = key("a");
        agg.upsert(&k, vec![gvk("ConfigMap"), gvk("ConfigMap")]).unwrap();
        assert_eq!(agg.list(&k).len(), 1);
    }

    #[test]
    fn overwrite_drops_previous_and_keeps_new() {
        let agg = GvkAggregator::new();
        let k = key("a");
        agg.upsert(&k, vec![gvk("ConfigMap")]).unwrap();
        agg.upsert(&k, vec![gvk("Pod")]).unwrap();
        assert_eq!(agg.list(&k), FxHashSet::from_iter([gvk("Pod")]));
        assert!(!agg.is_present(&gvk("ConfigMap")));
        assert!(agg.is_present(&gvk("Pod")));
    }

    #[test]
    fn shared_gvk_retained_while_other_source_references_it() {
        let agg = GvkAggregator::new();
        let a = key("a");
        let c = SourceKey::new("config", "");
        agg.upsert(&c, vec![gvk("Pod")]).unwrap();
        agg.upsert(&a, vec![gvk("Pod"), gvk("ConfigMap")]).unwrap();
        agg.remove(&a);
        assert_eq!(agg.gvks(), FxHashSet::from_iter([gvk("Pod")]));
    }

    #[test]
    fn remove_absent_key_is_noop() {
        let agg = GvkAggregator::new();
        agg.remove(&key("does-not-exist"));
        assert!(agg.gvks().is_empty());
    }

    #[test]
    fn minimality_no_empty_entries_survive() {
        let agg = GvkAggregator::new();
        let a = key("a");
        let b = key("b");
        agg.upsert(&a, vec![gvk("Pod")]).unwrap();
        agg.upsert(&b, vec![gvk("Pod")]).unwrap();
        agg.remove(&a);
        agg.remove(&b);
        assert!(agg.gvks().is_empty());
        assert!(!agg.is_present(&gvk("Pod")));
    }
}
