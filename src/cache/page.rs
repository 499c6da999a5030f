//! Fixed-capacity content pages and the process-wide page pool.

use parking_lot::Mutex;
use tracing::{debug, trace};

/// Stable identity of a page within one file cache. Pinned-page handles refer
/// to pages by id, never by position, so list inserts cannot invalidate them.
pub(crate) type PageId = u64;

/// Fixed-capacity buffer holding one contiguous byte range of a remote object.
///
/// The valid range `[offset, offset + len)` is populated by exactly one
/// fetch; `len` may be smaller than the buffer capacity near end-of-object.
/// Coverage computations must use `len`, never the capacity.
pub struct Page {
    buf: Box<[u8]>,
    offset: u64,
    len: usize,
    refs: u32,
    pub(crate) id: PageId,
}

impl Page {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            offset: 0,
            len: 0,
            refs: 0,
            id: 0,
        }
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// One past the last valid byte, as an absolute object position.
    pub(crate) fn end(&self) -> u64 {
        self.offset + self.len as u64
    }

    pub(crate) fn refs(&self) -> u32 {
        self.refs
    }

    pub(crate) fn contains(&self, pos: u64) -> bool {
        self.offset <= pos && pos < self.end()
    }

    /// Valid bytes in the absolute range `[from, to)`; both bounds must lie
    /// within the page's valid range.
    pub(crate) fn slice(&self, from: u64, to: u64) -> &[u8] {
        debug_assert!(self.offset <= from && to <= self.end() && from <= to);
        &self.buf[(from - self.offset) as usize..(to - self.offset) as usize]
    }

    /// Destination buffer for a fetch of up to `max` bytes.
    pub(crate) fn fetch_dest(&mut self, max: usize) -> &mut [u8] {
        let max = max.min(self.buf.len());
        &mut self.buf[..max]
    }

    /// Record a completed fetch: `len` bytes valid starting at `offset`.
    pub(crate) fn set_range(&mut self, offset: u64, len: usize) {
        debug_assert!(len <= self.buf.len());
        self.offset = offset;
        self.len = len;
    }

    pub(crate) fn add_ref(&mut self) {
        self.refs += 1;
    }

    pub(crate) fn sub_ref(&mut self) {
        debug_assert!(self.refs > 0, "page refcount underflow");
        self.refs = self.refs.saturating_sub(1);
    }

    pub(crate) fn clear(&mut self) {
        self.offset = 0;
        self.len = 0;
        self.refs = 0;
        self.buf.fill(0);
    }
}

struct PoolInner {
    free: Vec<Page>,
    allocated: usize,
}

/// Bounded allocator and recycler of [`Page`]s shared across all cached
/// files.
///
/// Pages are lent out with [`PagePool::get_page`] and handed back with
/// [`PagePool::release_page`]. The allocation ceiling, once reached, is never
/// reduced; pool memory stays resident for the process lifetime.
pub struct PagePool {
    page_size: usize,
    max_pages: usize,
    inner: Mutex<PoolInner>,
}

impl PagePool {
    #[must_use]
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            page_size,
            max_pages,
            inner: Mutex::new(PoolInner {
                free: Vec::new(),
                allocated: 0,
            }),
        }
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// A cleared page from the free list, else a fresh allocation while under
    /// the ceiling, else `None`.
    pub(crate) fn get_page(&self) -> Option<Page> {
        let mut inner = self.inner.lock();
        if let Some(page) = inner.free.pop() {
            trace!("reusing page from pool free list");
            return Some(page);
        }
        if inner.allocated < self.max_pages {
            inner.allocated += 1;
            trace!(
                allocated = inner.allocated,
                max = self.max_pages,
                "allocated new page"
            );
            return Some(Page::new(self.page_size));
        }
        debug!(max = self.max_pages, "page pool exhausted");
        None
    }

    /// Clear `page` and return it to the free list.
    pub(crate) fn release_page(&self, mut page: Page) {
        page.clear();
        self.inner.lock().free.push(page);
    }

    /// Pages ever allocated. Never exceeds the ceiling and never shrinks.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.inner.lock().allocated
    }
}
