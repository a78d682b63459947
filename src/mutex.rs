//! # Futex mutex
//!
//! Spinning is fine while the lock is held for brief moments. Otherwise the waiters burn CPU
//! the owner could've used to finish. This one puts contended threads to sleep with [futex::wait].
//!
//! Note that wait and wake don't take any part in memory consistency or correctness of the mutex.
//! They just spare us from wasting processor cycles: all the ordering comes from the state word.
//!
//! ## State
//! The word holds one of 3 [State]s, so the unlocking thread knows whether it needs a syscall:
//!
//! ```text
//!            fast lock (CAS)                 contended lock (CAS)
//! Unlocked ------------------> LockedNoWaiters -----------------> LockedHasWaiters
//!    ^  ^    fast unlock (CAS)        |                                  |
//!    |  +-----------------------------+                                  |
//!    +--------------------- store + wake all ----------------------------+
//! ```
//!
//! If nobody ever contends, neither lock nor unlock calls into the kernel.
//!
//! ## Spin, then sleep
//! A contended lock first spins up to [SPIN_LIMIT] times while the state is `LockedNoWaiters`:
//! a short critical section is usually over before a syscall would even return.
//! `LockedHasWaiters` means somebody already gave up on spinning, so we don't try either.
//!
//! ## Re-announcing waiters
//! A woken thread takes the lock with `Unlocked -> LockedHasWaiters`, not `-> LockedNoWaiters`.
//! It doesn't know if it was the only sleeper. Claiming "no waiters" could make its unlock
//! skip the wake and leave the others asleep forever.
//!
//! ## Wake all
//! One bit of "has waiters" can't tell how many are sleeping, so the unlock wakes all of them and
//! lets them race for the lock again. It's a thundering herd under heavy contention, but the state stays one word.
//! A counted-waiters scheme could wake just one.
//!
//! There's no fairness: a fresh thread on the fast path can beat the woken ones.

use std::{
    sync::atomic::{
        AtomicU32, Ordering,
        Ordering::{Acquire, Relaxed, Release},
    },
    time::{Duration, Instant},
};

use lock_api::{GuardSend, RawMutex, RawMutexTimed};
use log::trace;
use strum_macros::{Display, FromRepr};

use crate::{futex, spin_wait::SpinWait};

/// How long a contended lock spins before going to sleep.
pub const SPIN_LIMIT: u64 = 100;

/// Values of the futex word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(u32)]
pub enum State {
    Unlocked = 0,
    LockedNoWaiters = 1,
    LockedHasWaiters = 2,
}

#[derive(Debug)]
pub struct RawFutexMutex {
    state: AtomicU32,
}

impl RawFutexMutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(State::Unlocked as u32),
        }
    }

    /// The current state. A snapshot, may be stale right away.
    pub fn state(&self) -> State {
        // only the 3 values are ever stored
        State::from_repr(self.state.load(Relaxed)).unwrap_or(State::LockedHasWaiters)
    }

    #[inline]
    fn transition(&self, from: State, to: State, success: Ordering) -> bool {
        self.state
            .compare_exchange(from as u32, to as u32, success, Relaxed)
            .is_ok()
    }

    #[cold]
    fn lock_contended(&self) {
        if self.spin_then_try_lock() {
            return;
        }
        while !self.lock_round(None) {}
    }

    /// Spins while the owner has nobody waiting, then makes one fast-path attempt.
    /// Leaves the state alone if it fails.
    fn spin_then_try_lock(&self) -> bool {
        let mut spin = SpinWait::new();
        // plain loads while spinning, the CAS comes once at the end
        spin.spin_while_bounded(|| self.state() == State::LockedNoWaiters, SPIN_LIMIT);
        if self.try_lock() {
            return true;
        }
        trace!("futex mutex still held after {} spins, going to sleep", spin.spins());
        false
    }

    /// One round of the slow path: announce, sleep, try to take the lock.
    /// Returns true if the lock is ours.
    fn lock_round(&self, timeout: Option<Duration>) -> bool {
        // may fail because it's already announced, or because the lock is free now -
        // both are fine, the wait won't block in the latter case
        self.transition(State::LockedNoWaiters, State::LockedHasWaiters, Acquire);

        let announced = State::LockedHasWaiters as u32;
        match timeout {
            None => futex::wait(&self.state, announced),
            Some(timeout) => {
                futex::wait_timeout(&self.state, announced, timeout);
            }
        }

        self.transition(State::Unlocked, State::LockedHasWaiters, Acquire)
    }
}

impl Default for RawFutexMutex {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawFutexMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {
        if !self.try_lock() {
            self.lock_contended();
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.transition(State::Unlocked, State::LockedNoWaiters, Acquire)
    }

    #[inline]
    unsafe fn unlock(&self) {
        debug_assert_ne!(self.state(), State::Unlocked, "unlock of an unlocked mutex");
        if self.transition(State::LockedNoWaiters, State::Unlocked, Release) {
            return;
        }
        self.state.store(State::Unlocked as u32, Release);
        futex::wake_all(&self.state);
    }

    fn is_locked(&self) -> bool {
        self.state() != State::Unlocked
    }
}

/// The timed lock gives up once the deadline passes. The waiters it has announced stay
/// announced: that only costs the next unlock one wake call.
unsafe impl RawMutexTimed for RawFutexMutex {
    type Duration = Duration;
    type Instant = Instant;

    fn try_lock_for(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.try_lock_until(deadline),
            // can't be reached anyway
            None => {
                self.lock();
                true
            }
        }
    }

    fn try_lock_until(&self, deadline: Instant) -> bool {
        if self.try_lock() {
            return true;
        }
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.lock_round(Some(deadline - now)) {
                return true;
            }
        }
    }
}

/// A blocking mutex protecting a value of type `Y`.
pub type FutexMutex<Y> = lock_api::Mutex<RawFutexMutex, Y>;
pub type FutexMutexGuard<'a, Y> = lock_api::MutexGuard<'a, RawFutexMutex, Y>;
