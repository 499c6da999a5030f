//! Per-path byte-range cache over fixed content pages.
//!
//! One [`FileByteRangeCache`] exists per open remote object. It keeps an
//! offset-ordered list of non-overlapping pages plus a local reclaimed list,
//! and turns random-offset reads into at most one bounded range fetch per
//! call. All mutation happens under the cache's own mutex, so concurrent
//! reads of *different* paths never contend; the blocking range fetch is the
//! only point where that lock is held across I/O, which serializes fills of
//! the *same* path by design.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::CacheError;
use crate::remote::ObjectStore;

use super::page::{Page, PageId, PagePool};

/// Pages pinned on behalf of one read call.
///
/// Every pinned page's refcount was incremented; hand the value back via
/// [`FileByteRangeCache::release`] once the bytes are copied out. A pinned
/// page is never evicted or mutated.
#[must_use = "pinned pages hold page refcounts and must be released"]
#[derive(Debug)]
pub struct PinnedPages {
    ids: Vec<PageId>,
    covered: usize,
}

impl PinnedPages {
    /// Bytes of the requested range actually covered by the pinned pages.
    /// May be less than requested near end-of-object.
    #[must_use]
    pub fn covered(&self) -> usize {
        self.covered
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

struct FcacheInner {
    /// Offset-ordered, non-overlapping pages with valid content.
    pages: Vec<Page>,
    /// Cleared pages owned by this path, ready for reuse.
    reclaimed: Vec<Page>,
    next_id: PageId,
    open_refs: u32,
}

impl FcacheInner {
    /// Pages currently held by this path, active and reclaimed combined.
    fn held(&self) -> usize {
        self.pages.len() + self.reclaimed.len()
    }

    /// Trailing bytes of `[start, start + len)` not covered by a contiguous
    /// cached run beginning at `start`. A page beyond `start` with a gap
    /// before it contributes nothing.
    fn uncached_tail(&self, start: u64, len: usize) -> usize {
        let end = start + len as u64;
        let mut cursor = start;
        for page in &self.pages {
            if page.contains(cursor) {
                if page.end() < end {
                    cursor = page.end();
                } else {
                    cursor = end;
                    break;
                }
            }
        }
        (end - cursor) as usize
    }

    /// Move every unpinned page to the reclaimed list, clearing it.
    fn reclaim_unpinned(&mut self) {
        let mut kept = Vec::with_capacity(self.pages.len());
        for mut page in self.pages.drain(..) {
            if page.refs() == 0 {
                trace!(
                    offset = page.offset(),
                    len = page.len(),
                    "reclaiming unpinned page"
                );
                page.clear();
                self.reclaimed.push(page);
            } else {
                kept.push(page);
            }
        }
        self.pages = kept;
    }

    /// A page from the local reclaimed list, else the pool while under the
    /// per-file budget.
    fn take_page(&mut self, pool: &PagePool, budget: usize) -> Option<Page> {
        if let Some(page) = self.reclaimed.pop() {
            return Some(page);
        }
        if self.held() < budget {
            return pool.get_page();
        }
        None
    }

    fn insert_in_order(&mut self, page: Page) {
        let at = self.pages.partition_point(|p| p.offset() < page.offset());
        trace!(
            offset = page.offset(),
            len = page.len(),
            "inserting page into ordered list"
        );
        self.pages.insert(at, page);
    }
}

/// Byte-range cache for a single remote object.
pub struct FileByteRangeCache {
    path: String,
    pool: Arc<PagePool>,
    page_budget: usize,
    inner: Mutex<FcacheInner>,
}

impl FileByteRangeCache {
    pub(crate) fn new(path: &str, pool: Arc<PagePool>, page_budget: usize) -> Self {
        Self {
            path: path.to_owned(),
            pool,
            page_budget,
            inner: Mutex::new(FcacheInner {
                pages: Vec::new(),
                reclaimed: Vec::new(),
                next_id: 0,
                open_refs: 0,
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Ensure `[start, start + len)` is cached as far as one fetch allows,
    /// then pin and return every page overlapping the range.
    ///
    /// The covered byte count may fall short of `len` near end-of-object.
    /// `Err(CacheError::PagesExhausted)` means the caller should bypass the
    /// cache for this request; the read itself must not fail.
    pub fn load_and_occupy(
        &self,
        store: &dyn ObjectStore,
        start: u64,
        len: usize,
    ) -> Result<PinnedPages, CacheError> {
        let mut inner = self.inner.lock();

        let tail = inner.uncached_tail(start, len);
        trace!(path = %self.path, start, len, tail, "load_and_occupy");
        if tail > 0 {
            // Never re-fetch the covered prefix; the fetch targets the
            // contiguous uncovered tail.
            let fetch_start = start + (len - tail) as u64;
            // Clamp at the next cached page so the new page can never
            // overlap it. The list stays ordered and non-overlapping.
            let fetch_len = inner
                .pages
                .iter()
                .find(|p| p.offset() > fetch_start)
                .map_or(tail, |next| tail.min((next.offset() - fetch_start) as usize));
            let mut page = match inner.take_page(&self.pool, self.page_budget) {
                Some(page) => page,
                None => {
                    inner.reclaim_unpinned();
                    inner
                        .take_page(&self.pool, self.page_budget)
                        .ok_or(CacheError::PagesExhausted)?
                }
            };

            // One blocking fetch of up to one page capacity, holding only
            // this path's lock.
            match store.range_fetch(&self.path, page.fetch_dest(fetch_len), fetch_start) {
                Ok(0) => {
                    // At or past end-of-object; nothing to insert.
                    trace!(path = %self.path, fetch_start, "empty fetch at end of object");
                    page.clear();
                    inner.reclaimed.push(page);
                }
                Ok(fetched) => {
                    page.set_range(fetch_start, fetched);
                    page.id = inner.next_id;
                    inner.next_id += 1;
                    inner.insert_in_order(page);
                }
                Err(err) => {
                    warn!(path = %self.path, fetch_start, code = err.code, "range fetch failed");
                    page.clear();
                    inner.reclaimed.push(page);
                    return Err(CacheError::Fetch(err));
                }
            }
        }

        let end = start + len as u64;
        let mut cursor = start;
        let mut ids = Vec::new();
        for page in &mut inner.pages {
            if page.contains(cursor) {
                page.add_ref();
                ids.push(page.id);
                if page.end() < end {
                    cursor = page.end();
                } else {
                    cursor = end;
                    break;
                }
            }
        }

        Ok(PinnedPages {
            ids,
            covered: (cursor - start) as usize,
        })
    }

    /// Concatenate, in offset order, the overlapping slices of the pinned
    /// pages into one contiguous buffer.
    #[must_use]
    pub fn extract_content(&self, pins: &PinnedPages, start: u64, len: usize) -> Bytes {
        let inner = self.inner.lock();
        let end = start + len as u64;
        let mut out = BytesMut::with_capacity(pins.covered.min(len));
        let mut cursor = start;
        for id in &pins.ids {
            let Some(page) = inner.pages.iter().find(|p| p.id == *id) else {
                // Pinned pages are never evicted; a missing id is a bug.
                debug_assert!(false, "pinned page disappeared from the list");
                continue;
            };
            if page.contains(cursor) {
                let upto = page.end().min(end);
                out.extend_from_slice(page.slice(cursor, upto));
                cursor = upto;
                if cursor == end {
                    break;
                }
            }
        }
        out.freeze()
    }

    /// Unpin pages returned by [`Self::load_and_occupy`]. Unpinned pages
    /// become reclaim-eligible lazily; nothing is freed until the next
    /// capacity-pressure reclamation pass.
    pub fn release(&self, pins: PinnedPages) {
        let mut inner = self.inner.lock();
        for id in pins.ids {
            if let Some(page) = inner.pages.iter_mut().find(|p| p.id == id) {
                page.sub_ref();
            }
        }
    }

    pub(crate) fn add_open_ref(&self) {
        self.inner.lock().open_refs += 1;
    }

    /// Decrement the open-handle count, returning the new value.
    pub(crate) fn dec_open_ref(&self) -> u32 {
        let mut inner = self.inner.lock();
        debug_assert!(inner.open_refs > 0, "open refcount underflow");
        inner.open_refs = inner.open_refs.saturating_sub(1);
        inner.open_refs
    }

    #[must_use]
    pub fn open_refs(&self) -> u32 {
        self.inner.lock().open_refs
    }

    /// Pages currently held by this cache, with and without valid content.
    #[must_use]
    pub fn held_pages(&self) -> usize {
        self.inner.lock().held()
    }
}

impl Drop for FileByteRangeCache {
    fn drop(&mut self) {
        // Hand every page back to the pool for other paths to reuse.
        let inner = self.inner.get_mut();
        let released = inner.held();
        for page in inner.pages.drain(..).chain(inner.reclaimed.drain(..)) {
            self.pool.release_page(page);
        }
        if released > 0 {
            debug!(path = %self.path, released, "returned pages to pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::error::RemoteError;
    use crate::remote::Headers;

    /// Store serving one in-memory object and counting range fetches.
    struct FixtureStore {
        body: Vec<u8>,
        fetches: AtomicU64,
        fail: bool,
    }

    impl FixtureStore {
        fn new(len: usize) -> Self {
            Self {
                body: (0..len).map(|i| (i % 251) as u8).collect(),
                fetches: AtomicU64::new(0),
                fail: false,
            }
        }

        fn fetches(&self) -> u64 {
            self.fetches.load(Ordering::Relaxed)
        }
    }

    impl ObjectStore for FixtureStore {
        fn range_fetch(
            &self,
            _path: &str,
            dest: &mut [u8],
            offset: u64,
        ) -> Result<usize, RemoteError> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(RemoteError::new(5));
            }
            let start = (offset as usize).min(self.body.len());
            let end = start.saturating_add(dest.len()).min(self.body.len());
            dest[..end - start].copy_from_slice(&self.body[start..end]);
            Ok(end - start)
        }

        fn head_attributes(&self, _path: &str) -> Result<Headers, RemoteError> {
            Ok(Headers::new())
        }
    }

    fn fcache(page_size: usize, pool_pages: usize, budget: usize) -> FileByteRangeCache {
        FileByteRangeCache::new(
            "bucket/obj",
            Arc::new(PagePool::new(page_size, pool_pages)),
            budget,
        )
    }

    #[test]
    fn read_through_populates_and_serves() {
        let store = FixtureStore::new(64);
        let cache = fcache(16, 4, 4);

        let pins = cache.load_and_occupy(&store, 0, 10).expect("load");
        assert_eq!(pins.covered(), 10);
        let data = cache.extract_content(&pins, 0, 10);
        assert_eq!(&data[..], &store.body[0..10]);
        cache.release(pins);
        assert_eq!(store.fetches(), 1);
    }

    #[test]
    fn fully_cached_range_triggers_no_fetch() {
        let store = FixtureStore::new(64);
        let cache = fcache(16, 4, 4);

        let pins = cache.load_and_occupy(&store, 0, 16).expect("first load");
        cache.release(pins);
        assert_eq!(store.fetches(), 1);

        let pins = cache.load_and_occupy(&store, 4, 8).expect("second load");
        let data = cache.extract_content(&pins, 4, 8);
        cache.release(pins);
        assert_eq!(&data[..], &store.body[4..12]);
        assert_eq!(
            store.fetches(),
            1,
            "a fully cached sub-range must not refetch"
        );
    }

    #[test]
    fn tail_fetch_skips_covered_prefix() {
        let store = FixtureStore::new(64);
        let cache = fcache(8, 4, 4);

        // Covers [0, 8).
        let pins = cache.load_and_occupy(&store, 0, 8).expect("first load");
        cache.release(pins);

        // [4, 16) has an 8-byte uncovered tail; the fetch must start at 8.
        let pins = cache.load_and_occupy(&store, 4, 12).expect("second load");
        assert_eq!(pins.covered(), 12);
        let data = cache.extract_content(&pins, 4, 12);
        cache.release(pins);
        assert_eq!(&data[..], &store.body[4..16]);
        assert_eq!(store.fetches(), 2);
    }

    #[test]
    fn gap_fill_stops_at_the_next_cached_page() {
        let store = FixtureStore::new(64);
        let cache = fcache(16, 4, 4);

        // Cache [16, 28) and [0, 8), leaving the gap [8, 16).
        let pins = cache.load_and_occupy(&store, 16, 12).expect("high load");
        cache.release(pins);
        let pins = cache.load_and_occupy(&store, 0, 8).expect("low load");
        cache.release(pins);

        // Filling the gap must fetch exactly [8, 16) and stop at the page
        // already sitting at 16.
        let pins = cache.load_and_occupy(&store, 0, 20).expect("gap fill");
        assert_eq!(pins.covered(), 20);
        let data = cache.extract_content(&pins, 0, 20);
        cache.release(pins);
        assert_eq!(&data[..], &store.body[0..20]);
        assert_eq!(store.fetches(), 3);

        let inner = cache.inner.lock();
        assert_eq!(inner.pages.len(), 3);
        for pair in inner.pages.windows(2) {
            assert!(
                pair[0].end() <= pair[1].offset(),
                "page list must stay ordered and non-overlapping"
            );
        }
    }

    #[test]
    fn gap_before_cached_page_counts_as_uncovered() {
        let store = FixtureStore::new(64);
        let cache = fcache(8, 4, 4);

        // Cache [32, 40) only.
        let pins = cache.load_and_occupy(&store, 32, 8).expect("load high");
        cache.release(pins);

        // [0, 8) is entirely uncovered; the page at 32 must not count.
        let inner = cache.inner.lock();
        assert_eq!(inner.uncached_tail(0, 8), 8);
        drop(inner);

        let pins = cache.load_and_occupy(&store, 0, 8).expect("load low");
        assert_eq!(pins.covered(), 8);
        cache.release(pins);
        assert_eq!(store.fetches(), 2);
    }

    #[test]
    fn short_fetch_near_end_of_object() {
        let store = FixtureStore::new(20);
        let cache = fcache(16, 4, 4);

        let pins = cache.load_and_occupy(&store, 16, 16).expect("load tail");
        assert_eq!(pins.covered(), 4, "only 4 bytes exist past offset 16");
        let data = cache.extract_content(&pins, 16, 16);
        assert_eq!(&data[..], &store.body[16..20]);
        cache.release(pins);
    }

    #[test]
    fn valid_length_defines_coverage_not_capacity() {
        // Page capacity 8, budget 2. A 4-byte load leaves the page half
        // empty; the next 4 bytes must still be seen as uncached.
        let store = FixtureStore::new(64);
        let cache = fcache(8, 2, 2);

        let pins = cache.load_and_occupy(&store, 0, 4).expect("first half");
        assert_eq!(pins.covered(), 4);
        cache.release(pins);

        {
            let inner = cache.inner.lock();
            assert_eq!(
                inner.uncached_tail(4, 4),
                4,
                "unfilled capacity must not masquerade as coverage"
            );
        }

        let pins = cache.load_and_occupy(&store, 4, 4).expect("second half");
        assert_eq!(pins.covered(), 4);
        let data = cache.extract_content(&pins, 4, 4);
        cache.release(pins);
        assert_eq!(&data[..], &store.body[4..8]);
        assert_eq!(store.fetches(), 2);
    }

    #[test]
    fn failed_fetch_leaves_list_unmodified() {
        let mut store = FixtureStore::new(64);
        store.fail = true;
        let cache = fcache(16, 4, 4);

        let err = cache
            .load_and_occupy(&store, 0, 8)
            .expect_err("fetch should fail");
        assert!(matches!(err, CacheError::Fetch(_)));
        assert_eq!(
            cache.inner.lock().pages.len(),
            0,
            "no partial page may be inserted on fetch failure"
        );

        // The page went back to the reclaimed list and the next call reuses it.
        let store = FixtureStore::new(64);
        let pins = cache.load_and_occupy(&store, 0, 8).expect("retry");
        assert_eq!(pins.covered(), 8);
        cache.release(pins);
    }

    #[test]
    fn exhaustion_reclaims_unpinned_then_reports() {
        let store = FixtureStore::new(64);
        let cache = fcache(8, 2, 2);

        // Fill both budgeted pages and keep them pinned.
        let first = cache.load_and_occupy(&store, 0, 8).expect("page one");
        let second = cache.load_and_occupy(&store, 8, 8).expect("page two");

        let err = cache
            .load_and_occupy(&store, 16, 8)
            .expect_err("everything pinned, nothing to reclaim");
        assert!(matches!(err, CacheError::PagesExhausted));

        // Releasing a pin makes its page reclaimable on the next pass.
        cache.release(first);
        let third = cache.load_and_occupy(&store, 16, 8).expect("reclaimed");
        assert_eq!(third.covered(), 8);
        cache.release(second);
        cache.release(third);
    }

    #[test]
    fn pinned_pages_survive_reclamation() {
        let store = FixtureStore::new(64);
        let cache = fcache(8, 2, 2);

        let pinned = cache.load_and_occupy(&store, 0, 8).expect("pin low");
        let other = cache.load_and_occupy(&store, 8, 8).expect("pin high");
        cache.release(other);

        // Forces a reclamation pass that may only take the unpinned page.
        let replacement = cache.load_and_occupy(&store, 16, 8).expect("reclaim");

        let data = cache.extract_content(&pinned, 0, 8);
        assert_eq!(
            &data[..],
            &store.body[0..8],
            "pinned page content must be intact after reclamation"
        );
        cache.release(pinned);
        cache.release(replacement);
    }

    #[test]
    fn drop_returns_pages_to_pool() {
        let pool = Arc::new(PagePool::new(8, 2));
        let store = FixtureStore::new(64);
        {
            let cache = FileByteRangeCache::new("bucket/obj", Arc::clone(&pool), 2);
            let pins = cache.load_and_occupy(&store, 0, 8).expect("load");
            cache.release(pins);
            assert_eq!(cache.held_pages(), 1);
        }
        // Both pool slots usable again after the cache dropped.
        let a = pool.get_page().expect("slot one");
        let b = pool.get_page().expect("slot two");
        pool.release_page(a);
        pool.release_page(b);
    }
}
