//! Tunables for the Cache Manager's background loop (spec.md §4.3, §9 open
//! questions). These are constructor parameters, not environment
//! variables — this is a library; `orka-sync-kube`'s example wiring shows
//! reading them from env the way the rest of the workspace does.

use std::time::Duration;

/// Bounded exponential backoff with jitter, used by `replayGVKs`' retry of
/// `syncGVK` (spec.md: "base 1s, factor 2, jitter 0.1, 3 steps").
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub steps: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { base: Duration::from_secs(1), factor: 2.0, jitter: 0.1, steps: 3 }
    }
}

/// Resolves spec.md §9's first open question: whether a general registrar
/// error during `UpsertSource` cancels readiness expectations for every
/// currently-aggregated GVK, or only the caller's. Kept as an explicit,
/// swappable policy rather than hardcoded, per the spec's own ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessCancelPolicy {
    /// Conservative default: cancel expectations for every GVK the
    /// aggregator currently knows about.
    CancelAllAggregated,
    /// Cancel expectations only for the GVKs the failing caller submitted.
    CancelCallerGvksOnly,
}

#[derive(Debug, Clone)]
pub struct CacheManagerConfig {
    /// Period of the background reconciliation tick.
    pub tick_period: Duration,
    /// Bound on how long to wait for a superseded replay generation to
    /// acknowledge cancellation before giving up on joining it.
    pub relist_cancel_wait: Duration,
    pub backoff: BackoffConfig,
    pub cancel_policy: ReadinessCancelPolicy,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(3),
            relist_cancel_wait: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
            cancel_policy: ReadinessCancelPolicy::CancelAllAggregated,
        }
    }
}
