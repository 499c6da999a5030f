//! Path to per-file cache registry with idle retention.
//!
//! Caches whose last open handle closed are parked in an idle list instead
//! of being destroyed, trading memory for warm-reopen latency. The active
//! and idle maps are jointly bounded; going over budget evicts the single
//! oldest idle entry.

use std::collections::HashMap;
use std::sync::Arc;

use hashlink::LinkedHashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::fcache::FileByteRangeCache;
use super::page::PagePool;

struct DirInner {
    active: HashMap<String, Arc<FileByteRangeCache>>,
    /// Insertion-ordered so the front entry is the oldest idle cache.
    idle: LinkedHashMap<String, Arc<FileByteRangeCache>>,
}

impl DirInner {
    fn total(&self) -> usize {
        self.active.len() + self.idle.len()
    }

    fn evict_oldest_idle(&mut self) {
        if let Some((path, _cache)) = self.idle.pop_front() {
            debug!(path = %path, "evicting oldest idle file cache");
        }
    }
}

/// Registry of [`FileByteRangeCache`]s keyed by object path.
///
/// The directory-level mutex protects only the map structure; page content
/// is guarded by each cache's own mutex, so independent paths never contend.
pub struct FileCacheDirectory {
    pool: Arc<PagePool>,
    file_page_budget: usize,
    max_items: usize,
    inner: Mutex<DirInner>,
}

impl FileCacheDirectory {
    #[must_use]
    pub fn new(pool: Arc<PagePool>, file_page_budget: usize, max_items: usize) -> Self {
        Self {
            pool,
            file_page_budget,
            max_items,
            inner: Mutex::new(DirInner {
                active: HashMap::new(),
                idle: LinkedHashMap::new(),
            }),
        }
    }

    /// The content cache for `path`, with its open-handle count bumped.
    ///
    /// Prefers the active map, then promotes from idle (avoiding a cold
    /// refetch on rapid reopen), and only then constructs a fresh cache,
    /// evicting the oldest idle entry first when at budget.
    pub fn open(&self, path: &str) -> Arc<FileByteRangeCache> {
        let mut inner = self.inner.lock();
        let cache = if let Some(cache) = inner.active.get(path) {
            Arc::clone(cache)
        } else if let Some(cache) = inner.idle.remove(path) {
            trace!(path, "promoting idle file cache");
            inner.active.insert(path.to_owned(), Arc::clone(&cache));
            cache
        } else {
            if inner.total() >= self.max_items {
                inner.evict_oldest_idle();
            }
            trace!(path, "creating file cache");
            let cache = Arc::new(FileByteRangeCache::new(
                path,
                Arc::clone(&self.pool),
                self.file_page_budget,
            ));
            inner.active.insert(path.to_owned(), Arc::clone(&cache));
            cache
        };

        cache.add_open_ref();
        cache
    }

    /// Drop one open handle on `path`'s cache. When the count reaches zero
    /// the cache is parked idle, keeping its pages for a warm reopen.
    pub fn close(&self, path: &str) {
        let mut inner = self.inner.lock();
        let Some(cache) = inner.active.get(path) else {
            warn!(path, "close on a path with no active file cache");
            return;
        };

        if cache.dec_open_ref() == 0 {
            let cache = inner
                .active
                .remove(path)
                .unwrap_or_else(|| unreachable!("active entry vanished under the lock"));
            if inner.total() >= self.max_items {
                inner.evict_oldest_idle();
            }
            trace!(path, "parking file cache idle");
            inner.idle.insert(path.to_owned(), cache);
        }
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.lock().idle.len()
    }
}
