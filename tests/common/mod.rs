//! Shared mock object store for integration tests.
#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bucket_fs::error::RemoteError;
use bucket_fs::remote::{header, Headers, ObjectStore};
use parking_lot::Mutex;

/// Route cache-layer tracing through the test harness when `RUST_LOG` is
/// set. Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory store with fetch/head counters and failure injection.
pub struct MockStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicU64,
    heads: AtomicU64,
    fail_fetch: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
            heads: AtomicU64::new(0),
            fail_fetch: AtomicBool::new(false),
        }
    }

    pub fn put(&self, path: &str, body: Vec<u8>) {
        self.objects.lock().insert(path.to_owned(), body);
    }

    /// Deterministic pseudo-random body of `len` bytes.
    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
    }

    pub fn body(&self, path: &str) -> Vec<u8> {
        self.objects.lock().get(path).cloned().unwrap_or_default()
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn head_count(&self) -> u64 {
        self.heads.load(Ordering::Relaxed)
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::Relaxed);
    }
}

impl ObjectStore for MockStore {
    fn range_fetch(&self, path: &str, dest: &mut [u8], offset: u64) -> Result<usize, RemoteError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if self.fail_fetch.load(Ordering::Relaxed) {
            return Err(RemoteError::new(5));
        }
        let objects = self.objects.lock();
        let body = objects.get(path).ok_or(RemoteError::new(404))?;
        let start = (offset as usize).min(body.len());
        let end = start.saturating_add(dest.len()).min(body.len());
        dest[..end - start].copy_from_slice(&body[start..end]);
        Ok(end - start)
    }

    fn head_attributes(&self, path: &str) -> Result<Headers, RemoteError> {
        self.heads.fetch_add(1, Ordering::Relaxed);
        let objects = self.objects.lock();
        let body = objects.get(path).ok_or(RemoteError::new(404))?;
        let mut headers = Headers::new();
        headers.insert(header::CONTENT_LENGTH.into(), body.len().to_string());
        headers.insert(
            header::CONTENT_TYPE.into(),
            "application/octet-stream".into(),
        );
        headers.insert(header::LAST_MODIFIED.into(), "1700000000".into());
        Ok(headers)
    }
}
