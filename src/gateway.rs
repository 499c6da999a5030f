//! Filesystem-operation facade combining the caches with the remote store.
//!
//! The FUSE dispatch layer owns one [`Gateway`] per mount and calls it from
//! whatever threads it services requests on; every method takes `&self`.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::attr::FileStat;
use crate::cache::directory::FileCacheDirectory;
use crate::cache::page::PagePool;
use crate::cache::stat_cache::MetadataCache;
use crate::config::CacheConfig;
use crate::error::{CacheError, GatewayError};
use crate::remote::{Headers, ObjectStore};

/// One mount's worth of caching state plus the store handle.
pub struct Gateway<S: ObjectStore> {
    store: S,
    stats: Arc<MetadataCache>,
    files: FileCacheDirectory,
}

impl<S: ObjectStore> Gateway<S> {
    #[must_use]
    pub fn new(store: S, config: &CacheConfig) -> Self {
        let pool = Arc::new(PagePool::new(config.page_bytes(), config.pool_max_pages));
        Self {
            store,
            stats: Arc::new(MetadataCache::new(
                config.stat_valid(),
                config.stat_expire(),
            )),
            files: FileCacheDirectory::new(pool, config.file_page_budget, config.max_cached_files),
        }
    }

    /// The stat cache, shared so the host can hang a
    /// [`crate::cache::sweeper::CacheSweeper`] off it.
    #[must_use]
    pub fn stat_cache(&self) -> Arc<MetadataCache> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn file_caches(&self) -> &FileCacheDirectory {
        &self.files
    }

    /// Stat `path`, serving from cache and falling back to a remote HEAD.
    pub fn getattr(&self, path: &str) -> Result<FileStat, GatewayError> {
        if let Some(snap) = self.stats.lookup(path) {
            trace!(path, "getattr served from cache");
            return Ok(snap.stat);
        }
        let headers = self.head_and_insert(path)?;
        Ok(crate::attr::stat_from_headers(path, &headers))
    }

    /// Open `path` for reading: the stat entry is pinned against sweeping
    /// and the content cache is held active for as long as the handle stays
    /// open.
    pub fn open(&self, path: &str) -> Result<(), GatewayError> {
        if self.stats.lookup(path).is_none() {
            self.head_and_insert(path)?;
        }
        self.stats.pin(path);
        self.files.open(path);
        Ok(())
    }

    /// Read up to `size` bytes at `offset` through the content cache.
    ///
    /// Returns a short (possibly empty) buffer at end-of-object. When the
    /// page budget is exhausted the read degrades to one direct range fetch
    /// instead of failing.
    pub fn read(&self, path: &str, offset: u64, size: usize) -> Result<Bytes, GatewayError> {
        // EOF short-circuit on a size we may trust without a re-stat.
        let stat = match self.stats.lookup_trusted(path) {
            Some(snap) => snap.stat,
            None => {
                let headers = self.head_and_insert(path)?;
                crate::attr::stat_from_headers(path, &headers)
            }
        };
        if offset >= stat.size {
            trace!(path, offset, size = stat.size, "read past end of object");
            return Ok(Bytes::new());
        }

        let cache = self.files.open(path);
        let result = match cache.load_and_occupy(&self.store, offset, size) {
            Ok(pins) if !pins.is_empty() => {
                let data = cache.extract_content(&pins, offset, size);
                cache.release(pins);
                Ok(data)
            }
            Ok(pins) => {
                // Nothing cacheable (e.g. offset at the tail boundary).
                cache.release(pins);
                Ok(Bytes::new())
            }
            Err(CacheError::PagesExhausted) => {
                debug!(path, offset, "page budget exhausted, bypassing cache");
                self.fetch_direct(path, offset, size)
            }
            Err(CacheError::Fetch(err)) => Err(err.into()),
        };
        self.files.close(path);
        result
    }

    /// Close one read handle: unpin the stat entry and park the content
    /// cache when this was the last handle.
    pub fn release(&self, path: &str) {
        self.stats.unpin(path);
        self.files.close(path);
    }

    /// Drop `path`'s stat entry after a write or rename so the next access
    /// re-stats.
    pub fn invalidate(&self, path: &str) {
        self.stats.delete(path);
    }

    fn head_and_insert(&self, path: &str) -> Result<Headers, GatewayError> {
        let headers = self.store.head_attributes(path).map_err(|err| {
            debug!(path, code = err.code, "remote HEAD failed");
            GatewayError::NotFound
        })?;
        self.stats.insert(path, &headers);
        Ok(headers)
    }

    fn fetch_direct(&self, path: &str, offset: u64, size: usize) -> Result<Bytes, GatewayError> {
        let mut buf = vec![0; size];
        let fetched = self.store.range_fetch(path, &mut buf, offset)?;
        buf.truncate(fetched);
        Ok(Bytes::from(buf))
    }
}
