//! Cache Manager error surface (spec.md §7): a `thiserror`-derived taxonomy
//! wrapped for callers that just want a renderable `anyhow::Error`, matching
//! `orka-api::OrkaError` sitting next to this workspace's otherwise
//! `anyhow`-first style.

use thiserror::Error;

use crate::aggregator::AggregatorError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Aggregator(#[from] AggregatorError),
    #[error("watch registrar: {0}")]
    Registrar(String),
    #[error("process excluder: {0}")]
    Excluder(#[source] anyhow::Error),
}
