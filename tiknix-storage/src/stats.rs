//! Query cache statistics.

use serde::Serialize;

/// Snapshot of query cache usage.
///
/// `hits` and `misses` count this process only. `cached_queries` and
/// `size_bytes` come from a scan of the shared tier and are best-effort.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryCacheStats {
    pub enabled: bool,
    /// Shared tier backend name.
    pub backend: String,
    pub hits: u64,
    pub misses: u64,
    /// Percentage in `0.0..=100.0`, two decimals.
    pub hit_rate: f64,
    pub cached_queries: u64,
    pub size_bytes: u64,
    pub cache_size_kb: f64,
}

impl QueryCacheStats {
    pub fn total_reads(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Hit rate as a percentage rounded to two decimals; zero with no reads.
pub fn hit_rate_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        round2(hits as f64 / total as f64 * 100.0)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
