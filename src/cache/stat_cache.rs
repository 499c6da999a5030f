//! Path to attribute-snapshot cache with TTL and pin counts.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::attr::{stat_from_headers, FileStat};
use crate::remote::{header, Headers};

/// Copy of a cache entry handed to callers.
#[derive(Debug, Clone)]
pub struct StatSnapshot {
    pub stat: FileStat,
    pub headers: Headers,
}

struct StatEntry {
    stat: FileStat,
    headers: Headers,
    /// Open handles referencing this entry. Never removed by the sweeper
    /// while nonzero.
    pins: u64,
    refreshed_at: Instant,
}

/// Keep only the headers the gateway ever reads back: the standard subset
/// plus custom-prefixed metadata.
fn selected_headers(headers: &Headers) -> Headers {
    headers
        .iter()
        .filter(|(name, _)| {
            matches!(
                name.as_str(),
                header::CONTENT_TYPE
                    | header::CONTENT_LENGTH
                    | header::LAST_MODIFIED
                    | header::ETAG
            ) || name.starts_with(header::META_PREFIX)
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Attribute cache over remote HEAD results.
///
/// Two independent staleness predicates apply to every entry: a short
/// validity window (`lookup_trusted`, the read fast path) and a longer
/// expiry window (`lookup` and the sweeper). Both are sliding; a hit on
/// `lookup` refreshes the entry's timestamp.
pub struct MetadataCache {
    valid_for: Duration,
    expire_after: Duration,
    entries: Mutex<HashMap<String, StatEntry>>,
    /// Monotonic guard so concurrent sweep probes trigger at most one scan
    /// per interval.
    last_sweep_check: Mutex<Instant>,
}

impl MetadataCache {
    #[must_use]
    pub fn new(valid_for: Duration, expire_after: Duration) -> Self {
        Self {
            valid_for,
            expire_after,
            entries: Mutex::new(HashMap::new()),
            last_sweep_check: Mutex::new(Instant::now()),
        }
    }

    /// A snapshot of `path`'s entry, if present and not expired. A hit
    /// refreshes the entry's timestamp.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<StatSnapshot> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(path)?;
        if entry.refreshed_at.elapsed() >= self.expire_after {
            trace!(path, "stat entry expired");
            return None;
        }
        entry.refreshed_at = Instant::now();
        Some(StatSnapshot {
            stat: entry.stat,
            headers: entry.headers.clone(),
        })
    }

    /// The read fast-path predicate: a snapshot only while the entry is
    /// inside the short validity window. Does not refresh the timestamp;
    /// refreshing here would keep a size trusted forever.
    #[must_use]
    pub fn lookup_trusted(&self, path: &str) -> Option<StatSnapshot> {
        let entries = self.entries.lock();
        let entry = entries.get(path)?;
        if entry.refreshed_at.elapsed() >= self.valid_for {
            trace!(path, "stat entry outside validity window");
            return None;
        }
        Some(StatSnapshot {
            stat: entry.stat,
            headers: entry.headers.clone(),
        })
    }

    /// Upsert `path` from HEAD headers, deriving its POSIX attributes.
    /// Preserves an existing pin count and resets the refresh timestamp.
    pub fn insert(&self, path: &str, headers: &Headers) {
        let stat = stat_from_headers(path, headers);
        let mut entries = self.entries.lock();
        let pins = entries.get(path).map_or(0, |entry| entry.pins);
        trace!(path, size = stat.size, pins, "caching stat entry");
        entries.insert(
            path.to_owned(),
            StatEntry {
                stat,
                headers: selected_headers(headers),
                pins,
                refreshed_at: Instant::now(),
            },
        );
    }

    /// Insert many entries at once (directory-listing fill).
    pub fn bulk_insert<'a>(&self, batch: impl IntoIterator<Item = (&'a str, &'a Headers)>) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        for (path, headers) in batch {
            let stat = stat_from_headers(path, headers);
            let pins = entries.get(path).map_or(0, |entry| entry.pins);
            entries.insert(
                path.to_owned(),
                StatEntry {
                    stat,
                    headers: selected_headers(headers),
                    pins,
                    refreshed_at: now,
                },
            );
        }
        debug!(total = entries.len(), "bulk stat insert done");
    }

    /// Pin `path` against sweeping; called on file open.
    pub fn pin(&self, path: &str) {
        let mut entries = self.entries.lock();
        match entries.get_mut(path) {
            Some(entry) => entry.pins += 1,
            None => warn!(path, "pin on uncached path"),
        }
    }

    /// Drop one pin (floor 0); called on file release.
    pub fn unpin(&self, path: &str) {
        let mut entries = self.entries.lock();
        match entries.get_mut(path) {
            Some(entry) => {
                if entry.pins == 0 {
                    warn!(path, "unpin on unpinned stat entry");
                } else {
                    entry.pins -= 1;
                }
            }
            None => warn!(path, "unpin on uncached path"),
        }
    }

    /// Unconditional removal, regardless of pins. Used after writes and
    /// renames so the next access misses and re-stats.
    pub fn delete(&self, path: &str) {
        if self.entries.lock().remove(path).is_some() {
            trace!(path, "stat entry invalidated");
        }
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every expired, unpinned entry; returns how many went.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|path, entry| {
            let keep = entry.pins > 0 || entry.refreshed_at.elapsed() < self.expire_after;
            if !keep {
                trace!(path = %path, "sweeping expired stat entry");
            }
            keep
        });
        before - entries.len()
    }

    /// Whether a sweep is due, advancing the last-checked timestamp when it
    /// is. At most one caller per interval gets `true`.
    pub fn sweep_due(&self, interval: Duration) -> bool {
        let mut last = self.last_sweep_check.lock();
        if last.elapsed() >= interval {
            *last = Instant::now();
            true
        } else {
            false
        }
    }
}
