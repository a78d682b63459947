//! # Test-and-test-and-set spin lock
//!
//! It's the chapter 4 spin lock with one change: a waiter doesn't hammer the flag with
//! `swap`/`compare_exchange`. Every failed read-modify-write needs the cache line in the
//! exclusive state, so N spinners keep stealing the line from each other (and from the owner!).
//!
//! Instead a waiter spins on a plain `load`, which can be served from its own shared copy of
//! the line. Only when the owner's `store(false)` invalidates that copy does the waiter see
//! `false` and try the CAS again.
//!
//! There's no fairness: whoever wins the CAS right after a release takes the lock,
//! so a thread can starve under unlucky scheduling.

use std::sync::atomic::{
    AtomicBool,
    Ordering::{Acquire, Relaxed, Release},
};

use lock_api::{GuardSend, RawMutex};

use crate::spin_wait::SpinWait;

/// The lock itself. Wrap into [TtasSpinLock] to protect data with it.
#[derive(Debug)]
pub struct RawTtasSpinLock {
    locked: AtomicBool,
}

impl RawTtasSpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    // Acquire on success makes the previous owner's critical section happen-before ours.
    // Failure is relaxed - nothing is read under the lock when we fail.
    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange_weak(false, true, Acquire, Relaxed)
            .is_ok()
    }
}

impl Default for RawTtasSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawTtasSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardSend;

    fn lock(&self) {
        let mut spin = SpinWait::new();
        while !self.try_acquire() {
            // relaxed is enough: the CAS above is what synchronizes
            spin.spin_until(|| !self.locked.load(Relaxed));
        }
    }

    fn try_lock(&self) -> bool {
        // a weak CAS may fail spuriously, which would report "held" for a free lock
        self.locked
            .compare_exchange(false, true, Acquire, Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        debug_assert!(self.locked.load(Relaxed), "unlock of an unlocked TTAS lock");
        self.locked.store(false, Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
}

/// A TTAS spin lock protecting a value of type `Y`.
pub type TtasSpinLock<Y> = lock_api::Mutex<RawTtasSpinLock, Y>;
pub type TtasSpinLockGuard<'a, Y> = lock_api::MutexGuard<'a, RawTtasSpinLock, Y>;
