//! Blocking primitives built on `spin` and the platform's yield.
//!
//! Waiters never spin with a lock held: they drop it, yield the CPU and
//! re-check.

use core::sync::atomic::{AtomicUsize, Ordering};
use spin::{Mutex, MutexGuard};

use crate::platform::Platform;

/// Condition variable paired with a `spin::Mutex`.
///
/// `broadcast` must be called with the paired lock held, so a waiter that
/// sampled the sequence under the lock cannot miss it.
pub struct WaitCondition {
    seq: AtomicUsize,
}

impl WaitCondition {
    pub const fn new() -> Self {
        WaitCondition { seq: AtomicUsize::new(0) }
    }

    /// Release `guard`, block until the next broadcast, and re-acquire `lock`.
    /// Callers loop on their predicate.
    pub fn wait<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        lock: &'a Mutex<T>,
        platform: &dyn Platform,
    ) -> MutexGuard<'a, T> {
        let seen = self.seq.load(Ordering::Acquire);
        drop(guard);
        while self.seq.load(Ordering::Acquire) == seen {
            platform.yield_now();
        }
        lock.lock()
    }

    /// Wake every waiter.
    pub fn broadcast(&self) {
        self.seq.fetch_add(1, Ordering::Release);
    }
}

impl Default for WaitCondition {
    fn default() -> Self {
        Self::new()
    }
}

/// Counting semaphore.
pub struct Semaphore {
    count: Mutex<usize>,
}

impl Semaphore {
    pub const fn new(initial: usize) -> Self {
        Semaphore { count: Mutex::new(initial) }
    }

    /// P: take one unit, blocking while none are available.
    pub fn wait(&self, platform: &dyn Platform) {
        while !self.try_wait() {
            platform.yield_now();
        }
    }

    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// V: release one unit.
    pub fn signal(&self) {
        *self.count.lock() += 1;
    }

    pub fn count(&self) -> usize {
        *self.count.lock()
    }
}
