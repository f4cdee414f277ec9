//! Keep the host awake for the duration of a transfer
//!
//! The platform mechanism (an Android wake lock, `systemd-inhibit`, a macOS
//! power assertion) is supplied by the host through [`WakeLock`]. The writer
//! holds a [`WakeLockGuard`] for the whole transfer, refreshing it before
//! every chunk, and the guard releases on drop so every exit path lets go.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Host capability preventing suspend while a transfer runs
pub trait WakeLock {
    /// Acquire or refresh the lock
    ///
    /// Called once per chunk, so implementations must tolerate repeated calls.
    fn acquire(&self);

    /// Release the lock
    fn release(&self);
}

/// Wake lock that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWakeLock;

impl WakeLock for NoopWakeLock {
    fn acquire(&self) {}

    fn release(&self) {}
}

/// Wake lock that counts calls; handy for hosts that only want to observe
#[derive(Debug, Default)]
pub struct CountingWakeLock {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl CountingWakeLock {
    /// Create a new counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `acquire` calls so far
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Number of `release` calls so far
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl WakeLock for CountingWakeLock {
    fn acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scoped hold on a [`WakeLock`], released exactly once on drop
pub struct WakeLockGuard<'a> {
    lock: &'a dyn WakeLock,
}

impl<'a> WakeLockGuard<'a> {
    /// Start holding `lock`
    pub fn new(lock: &'a dyn WakeLock) -> Self {
        Self { lock }
    }

    /// Acquire or refresh the underlying lock
    pub fn refresh(&self) {
        self.lock.acquire();
    }
}

impl Drop for WakeLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = CountingWakeLock::new();
        {
            let guard = WakeLockGuard::new(&lock);
            guard.refresh();
            guard.refresh();
            assert_eq!(lock.released(), 0);
        }
        assert_eq!(lock.acquired(), 2);
        assert_eq!(lock.released(), 1);
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let lock = CountingWakeLock::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let guard = WakeLockGuard::new(&lock);
            guard.refresh();
            panic!("transfer aborted");
        }));

        assert!(result.is_err());
        assert_eq!(lock.released(), 1);
    }

    #[test]
    fn test_noop_lock() {
        let guard = WakeLockGuard::new(&NoopWakeLock);
        guard.refresh();
    }
}
