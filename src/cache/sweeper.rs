//! Background sweeper evicting expired, unpinned stat entries.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use super::stat_cache::MetadataCache;

struct Shared {
    stop: Mutex<bool>,
    wake: Condvar,
}

/// Owns the sweeper thread for the process lifetime.
///
/// The loop waits `scan_interval` between scans and honors a cooperative
/// stop signal, so [`CacheSweeper::stop`] (or drop) joins deterministically
/// at unmount. A scan can never fail its caller; it only takes the stat
/// cache's mutex while iterating.
pub struct CacheSweeper {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Spawn the sweeper over `cache`, scanning every `scan_interval`.
    #[must_use]
    pub fn spawn(cache: Arc<MetadataCache>, scan_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            stop: Mutex::new(false),
            wake: Condvar::new(),
        });
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("stat-sweeper".into())
            .spawn(move || Self::run(&cache, &worker, scan_interval))
            // Thread spawn only fails on resource exhaustion; that is fatal
            // for a cache that promises bounded staleness.
            .expect("failed to spawn stat sweeper thread");

        Self {
            shared,
            handle: Some(handle),
        }
    }

    fn run(cache: &MetadataCache, shared: &Shared, scan_interval: Duration) {
        debug!(interval_secs = scan_interval.as_secs(), "sweeper started");
        // The flag is re-checked before every wait: a stop signaled between
        // thread spawn and the first wait must not be lost, or the join
        // would block for a whole scan interval.
        let mut stopped = shared.stop.lock();
        while !*stopped {
            shared.wake.wait_for(&mut stopped, scan_interval);
            if *stopped {
                break;
            }
            // The interval guard also covers external probes; whichever
            // caller wins runs the one scan.
            if cache.sweep_due(scan_interval) {
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "sweep finished");
                }
            }
        }
        info!("sweeper stopped");
    }

    /// Signal the thread to stop and join it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        *self.shared.stop.lock() = true;
        self.shared.wake.notify_all();
        // Join failure means the sweeper panicked; nothing to recover here.
        let _ = handle.join();
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
