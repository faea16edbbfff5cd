//! Core value types: `Gvk` and `SourceKey`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `{group, version, kind}` triple identifying a Kubernetes resource type.
///
/// An empty `Gvk` (all three fields empty) is not a valid watch target;
/// callers feeding GVKs into the aggregator must drop them first (see
/// [`crate::aggregator::GvkAggregator::upsert`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    /// True when all three fields are empty; such a GVK is illegal input.
    pub fn is_empty(&self) -> bool {
        self.group.is_empty() && self.version.is_empty() && self.kind.is_empty()
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Identifies a sync source contributing GVK requirements, e.g.
/// `{source: "syncset", id: "my-syncset"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub struct SourceKey {
    pub source: String,
    pub id: String,
}

impl SourceKey {
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self { source: source.into(), id: id.into() }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.id)
    }
}
