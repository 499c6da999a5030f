//! Cache layer configuration.
//!
//! Settings may be deserialized from the gateway's configuration file; every
//! field has a default matching the tuning the layer ships with.

use std::time::Duration;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

/// Tuning knobs for the metadata and content caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheConfig {
    /// Seconds a cached stat may be trusted without a re-stat. Used on the
    /// read fast path to decide whether a cached size is authoritative.
    pub stat_valid_secs: u64,

    /// Seconds after which an idle stat entry becomes sweep-eligible. A
    /// deliberately longer window than `stat-valid-secs`.
    pub stat_expire_secs: u64,

    /// Seconds between sweeper scans of the stat cache.
    pub sweep_interval_secs: u64,

    /// Capacity of one content page.
    pub page_size: ByteSize,

    /// Process-wide allocation ceiling of the page pool.
    pub pool_max_pages: usize,

    /// Pages a single file cache may hold (active plus reclaimed).
    pub file_page_budget: usize,

    /// Per-file caches the directory retains, active and idle combined.
    pub max_cached_files: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stat_valid_secs: 120,
            stat_expire_secs: 180,
            sweep_interval_secs: 3600,
            page_size: ByteSize::mib(8),
            pool_max_pages: 500,
            file_page_budget: 10,
            max_cached_files: 100,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn stat_valid(&self) -> Duration {
        Duration::from_secs(self.stat_valid_secs)
    }

    #[must_use]
    pub fn stat_expire(&self) -> Duration {
        Duration::from_secs(self.stat_expire_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Page capacity in bytes.
    #[must_use]
    pub fn page_bytes(&self) -> usize {
        usize::try_from(self.page_size.as_u64()).unwrap_or(usize::MAX)
    }
}
