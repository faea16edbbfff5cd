//! Example env-var wiring for `CacheManagerConfig`, matching the
//! `ORKA_*`-prefixed reads `orka-store`/`orka-kubehub` do elsewhere in this
//! workspace (e.g. `ORKA_SHARDS`, `ORKA_MAX_RSS_MB`). `orka-sync` itself
//! takes these as constructor parameters; reading them from the process
//! environment is the embedding binary's job, demonstrated here.

use std::time::Duration;

use orka_sync::CacheManagerConfig;

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis).unwrap_or(default)
}

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs).unwrap_or(default)
}

/// Read `ORKA_SYNC_TICK_MS` / `ORKA_SYNC_RELIST_WAIT_SECS`, falling back to
/// `CacheManagerConfig::default()`'s values.
pub fn config_from_env() -> CacheManagerConfig {
    let defaults = CacheManagerConfig::default();
    CacheManagerConfig {
        tick_period: env_duration_ms("ORKA_SYNC_TICK_MS", defaults.tick_period),
        relist_cancel_wait: env_duration_secs("ORKA_SYNC_RELIST_WAIT_SECS", defaults.relist_cancel_wait),
        ..defaults
    }
}
