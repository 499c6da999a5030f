//! Error types for the cache layer and its gateway facade.

use thiserror::Error;

/// Failure reported by the remote object store.
///
/// The store performs its own retries and timeouts; by the time a
/// `RemoteError` reaches the cache layer it is final for this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("remote store error (code {code})")]
pub struct RemoteError {
    /// Nonzero backend status code.
    pub code: i32,
}

impl RemoteError {
    #[must_use]
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Errors surfaced by the content cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A range fetch against the remote store failed. The page list is left
    /// unmodified; no partial page is ever inserted.
    #[error("range fetch failed: {0}")]
    Fetch(#[from] RemoteError),

    /// Page budget exhausted even after reclaiming unpinned pages. The caller
    /// should bypass the cache for this request rather than failing the read.
    #[error("page budget exhausted")]
    PagesExhausted,
}

/// Errors returned by [`crate::gateway::Gateway`] operations.
///
/// The filesystem dispatch layer maps these to POSIX codes via the `i32`
/// conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("object not found")]
    NotFound,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl From<GatewayError> for i32 {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound => libc::ENOENT,
            GatewayError::Remote(_) => libc::EIO,
        }
    }
}
