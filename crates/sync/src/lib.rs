//! Orka sync: GVK aggregation, dynamic watch-set reconciliation, cache
//! replay, and readiness-expectation pruning for a policy-enforcement
//! control plane. Pure core with no dependency on `kube` — concrete
//! Kubernetes-backed collaborators live in `orka-sync-kube`.

#![forbid(unsafe_code)]

pub mod aggregator;
pub mod config;
pub mod error;
pub mod manager;
pub mod objutil;
pub mod pruner;
pub mod registrar_error;
pub mod traits;
pub mod types;
pub mod watchset;

pub use aggregator::{AggregatorError, GvkAggregator};
pub use config::{BackoffConfig, CacheManagerConfig, ReadinessCancelPolicy};
pub use error::SyncError;
pub use manager::CacheManager;
pub use pruner::run_pruner;
pub use registrar_error::RegistrarError;
pub use traits::{ClusterReader, PolicyDataClient, ProcessExcluder, ReadinessTracker, RemoveTarget, WatchRegistrar};
pub use types::{Gvk, SourceKey};
pub use watchset::WatchSet;
