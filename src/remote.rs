//! Seam to the remote object store.
//!
//! The cache layer never talks HTTP itself; it consumes an [`ObjectStore`]
//! implementation provided by the surrounding gateway. Retry, signing, and
//! timeouts all live behind this trait.

use std::collections::HashMap;

use crate::error::RemoteError;

/// Remote object metadata headers, as returned by a HEAD call.
pub type Headers = HashMap<String, String>;

/// Header names the cache layer cares about.
pub mod header {
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const LAST_MODIFIED: &str = "Last-Modified";
    pub const ETAG: &str = "ETag";

    /// Prefix of bucket-level custom metadata headers.
    pub const META_PREFIX: &str = "x-obj-meta-";
    pub const META_MODE: &str = "x-obj-meta-mode";
    pub const META_MTIME: &str = "x-obj-meta-mtime";
    pub const META_UID: &str = "x-obj-meta-uid";
    pub const META_GID: &str = "x-obj-meta-gid";

    /// Content-Type value marking a directory placeholder object.
    pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";
}

/// Blocking client for the backing object storage.
pub trait ObjectStore: Send + Sync {
    /// Read up to `dest.len()` bytes of `path` starting at `offset` into
    /// `dest`, returning the number of bytes written.
    ///
    /// Returns fewer bytes than requested at end-of-object. On error nothing
    /// is written to `dest`.
    fn range_fetch(&self, path: &str, dest: &mut [u8], offset: u64) -> Result<usize, RemoteError>;

    /// Fetch the metadata headers of `path`.
    fn head_attributes(&self, path: &str) -> Result<Headers, RemoteError>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<S> {
    fn range_fetch(&self, path: &str, dest: &mut [u8], offset: u64) -> Result<usize, RemoteError> {
        (**self).range_fetch(path, dest, offset)
    }

    fn head_attributes(&self, path: &str) -> Result<Headers, RemoteError> {
        (**self).head_attributes(path)
    }
}
