//! Registrar error taxonomy (spec.md §3 "Registrar error taxonomy", §7).

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::types::Gvk;

/// The structured error a [`crate::traits::WatchRegistrar`] reports back
/// from `replace_watch`. A registrar call either succeeds (`None` returned
/// from the trait method) or fails with some combination of: a general,
/// not-GVK-attributable error; a set of GVKs that failed to start being
/// watched; a set of GVKs that failed to stop being watched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrarError {
    pub general: Option<String>,
    pub add_failed: FxHashSet<Gvk>,
    pub remove_failed: FxHashSet<Gvk>,
}

impl RegistrarError {
    pub fn general(msg: impl Into<String>) -> Self {
        Self { general: Some(msg.into()), ..Default::default() }
    }

    pub fn add_failed(gvks: impl IntoIterator<Item = Gvk>) -> Self {
        Self { add_failed: gvks.into_iter().collect(), ..Default::default() }
    }

    pub fn remove_failed(gvks: impl IntoIterator<Item = Gvk>) -> Self {
        Self { remove_failed: gvks.into_iter().collect(), ..Default::default() }
    }

    /// True when this is a general ("state unknown") failure rather than a
    /// purely per-GVK one.
    pub fn is_general(&self) -> bool {
        self.general.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.general.is_none() && self.add_failed.is_empty() && self.remove_failed.is_empty()
    }
}

impl std::fmt::Display for RegistrarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(g) = &self.general {
            return write!(f, "registrar general error: {g}");
        }
        write!(
            f,
            "registrar per-gvk error: add_failed={:?} remove_failed={:?}",
            self.add_failed, self.remove_failed
        )
    }
}

impl std::error::Error for RegistrarError {}
