//! Process-wide shutdown coordination.
//! The Ctrl-C handler sets the flag; size scans, the in-process bulk move and
//! simulated pacing check it between units of work.
//!
//! Notes:
//! - Relaxed atomics are sufficient for a one-way "stop" flag.
//! - An elevated script that is already running is not cancelled by this flag;
//!   only killing that process stops it.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Request a cooperative shutdown (idempotent).
#[inline]
pub fn request() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Check whether a shutdown has been requested.
#[inline]
pub fn is_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Test-only: clear the shutdown flag.
#[cfg(test)]
#[inline]
pub fn reset() {
    SHUTDOWN.store(false, Ordering::Relaxed);
}
