//! Orka core types (Milestone 0)

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub type Uid = [u8; 16];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeltaKind {
    Applied,
    Deleted,
    /// Sentinel instructing the world builder to drop all held items,
    /// independent of any single object's uid. Used when a replicated
    /// cache must be fully replayed (e.g. after a watch-set change).
    Wipe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub uid: Uid,
    pub kind: DeltaKind,
    /// Raw object (possibly stripped of oversized fields under feature flags)
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteObj {
    pub uid: Uid,
    pub namespace: Option<String>,
    pub name: String,
    pub creation_ts: i64,
    /// Column-id-keyed projected fields, filled by a [`Projector`] at ingest time.
    #[serde(default)]
    pub projected: SmallVec<[(u32, String); 8]>,
    #[serde(default)]
    pub labels: SmallVec<[(String, String); 8]>,
    #[serde(default)]
    pub annotations: SmallVec<[(String, String); 4]>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldSnapshot {
    pub epoch: u64,
    /// For Milestone 0, we hold items only for the selected GVK.
    pub items: Vec<LiteObj>,
}

/// Shapes a raw object into the small set of column values the store keeps
/// alongside a [`LiteObj`], e.g. a Pod's ready-count or a Service's type.
pub trait Projector: Send + Sync {
    fn project(&self, raw: &serde_json::Value) -> SmallVec<[(u32, String); 8]>;
}

/// Target shard for a delta, decided ahead of ingest so per-shard coalescing
/// and building can run without cross-shard coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardKey {
    pub ns_bucket: u32,
}

pub trait ShardPlanner: Send + Sync {
    fn plan(&self, gvk_id: u32, namespace: Option<&str>) -> ShardKey;
}

pub mod columns;

pub mod prelude {
    pub use super::{Delta, DeltaKind, LiteObj, Projector, ShardKey, ShardPlanner, Uid, WorldSnapshot};
}

