//! `MemoryReadinessTracker`: a minimal reference `ReadinessTracker`. Tracks,
//! per GVK, whether at least one object has been observed and whether a
//! data-expectation is still outstanding; satisfied once every GVK with an
//! outstanding expectation has seen data (or been pruned/cancelled).

use std::sync::Mutex;

use orka_sync::{Gvk, ReadinessTracker};
use rustc_hash::FxHashMap;

#[derive(Default, Clone, Copy)]
struct Expectation {
    outstanding: bool,
}

#[derive(Default)]
pub struct MemoryReadinessTracker {
    expectations: Mutex<FxHashMap<Gvk, Expectation>>,
    sync_sources_satisfied: Mutex<bool>,
}

impl MemoryReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the controller has finished declaring all sync sources
    /// (spec.md's `SyncSourcesSatisfied`), registering `gvk` as expected to
    /// eventually receive data.
    pub fn expect(&self, gvk: Gvk) {
        self.expectations.lock().unwrap().entry(gvk).or_insert(Expectation { outstanding: true });
    }

    pub fn mark_sync_sources_satisfied(&self) {
        *self.sync_sources_satisfied.lock().unwrap() = true;
    }
}

impl ReadinessTracker for MemoryReadinessTracker {
    fn observe(&self, gvk: &Gvk, _obj: &serde_json::Value) {
        if let Some(exp) = self.expectations.lock().unwrap().get_mut(gvk) {
            exp.outstanding = false;
        }
    }

    fn cancel_expect(&self, gvk: &Gvk, _obj: &serde_json::Value) {
        self.expectations.lock().unwrap().remove(gvk);
    }

    fn try_cancel_data(&self, gvk: &Gvk) -> bool {
        self.expectations.lock().unwrap().remove(gvk).is_some()
    }

    fn cancel_data(&self, gvk: &Gvk) {
        self.expectations.lock().unwrap().remove(gvk);
    }

    fn data_gvks(&self) -> Vec<Gvk> {
        self.expectations.lock().unwrap().keys().cloned().collect()
    }

    fn satisfied(&self) -> bool {
        self.sync_sources_satisfied() && self.expectations.lock().unwrap().values().all(|e| !e.outstanding)
    }

    fn sync_sources_satisfied(&self) -> bool {
        *self.sync_sources_satisfied.lock().unwrap()
    }
}
