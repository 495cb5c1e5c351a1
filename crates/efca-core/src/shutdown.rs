//! Graceful shutdown support via a shared atomic flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Cancellation token shared by the foreground loop, the background service
/// and the signal handlers.
///
/// The flag moves from "not requested" to "requested" exactly once and is
/// never reset. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown was requested
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Request shutdown. Returns `true` only for the call that flipped the flag.
    ///
    /// A single atomic swap: no allocation, no locking.
    pub fn request(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    /// Underlying flag, for registration with OS signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Block the calling thread until shutdown is requested.
    pub fn wait(&self, poll: Duration) {
        while !self.is_requested() {
            std::thread::sleep(poll);
        }
    }

    /// Block until shutdown is requested or `timeout` elapses.
    ///
    /// Returns `true` if shutdown was requested.
    pub fn wait_timeout(&self, poll: Duration, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while !self.is_requested() {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(poll.min(deadline - now));
        }
        true
    }
}
