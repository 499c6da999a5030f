//! Caching primitives for the gateway.

/// Path to per-file cache registry with idle retention.
pub mod directory;
/// Per-path byte-range cache over fixed content pages.
pub mod fcache;
/// Content pages and the shared page pool.
pub mod page;
/// Path to attribute-snapshot cache with TTL and pin counts.
pub mod stat_cache;
/// Background eviction of expired stat entries.
pub mod sweeper;
