//! Kubernetes-backed collaborators for `orka-sync`: a watch registrar built
//! on `orka-kubehub` discovery, a cluster reader for relist, a data client
//! bridging into `orka-store`'s ingest channel, a minimal in-memory
//! readiness tracker, and a namespace-list process excluder. This is the
//! only crate in the sync cache manager feature area that depends on `kube`.

#![forbid(unsafe_code)]

pub mod config;
pub mod data_client;
pub mod dispatch;
pub mod excluder;
pub mod reader;
pub mod registrar;
pub mod tracker;

pub use config::config_from_env;
pub use data_client::StoreDataClient;
pub use dispatch::run_dispatcher;
pub use excluder::NamespaceListExcluder;
pub use reader::KubeClusterReader;
pub use registrar::{new_registrar, KubeWatchRegistrar, WatchEvent};
pub use tracker::MemoryReadinessTracker;
