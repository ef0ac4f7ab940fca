//! Retention policy derived from configuration.

use std::time::Duration;

use crate::config::CacheConfig;

/// Ceilings and residency rules for one cache operation.
///
/// Built from a configuration snapshot at the start of each operation, so a
/// reload never changes the rules halfway through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub enabled: bool,
    pub max_size_bytes: u64,
    pub max_entry_bytes: u64,
    pub tracked_window: Duration,
    pub min_downloads: u64,
    pub min_residency: Duration,
    pub min_evicted_residency: Duration,
}

impl CachePolicy {
    /// Whether a value of `size` bytes may be stored at all.
    pub fn admits_size(&self, size: u64) -> bool {
        self.max_entry_bytes == 0 || size <= self.max_entry_bytes
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_size_bytes: config.max_size_bytes,
            max_entry_bytes: config.max_file_size_bytes,
            tracked_window: Duration::from_secs(config.tracked_minutes.saturating_mul(60)),
            min_downloads: config.min_downloads,
            min_residency: Duration::from_secs(config.min_cache_time_seconds),
            min_evicted_residency: Duration::from_secs(config.min_evicted_time_seconds),
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}
