//! # Ticket lock
//!
//! A bakery queue: take a number, wait until it's called.
//!
//! - `next_free_ticket` is the dispenser, every [lock](RawMutex::lock) takes a number out of it
//! - `owner_ticket` is the "now serving" board, every unlock moves it forward by one
//!
//! So threads get the lock strictly in the order they've drawn their tickets - it's FIFO fair.
//!
//! ## Memory ordering
//! Drawing a ticket is relaxed: nothing is published by a draw, it only needs to be unique
//! (and fetch_add on a single atomic is, as by its total modification order).
//! The happens-before between owners comes from the release-increment of `owner_ticket`
//! paired with the acquire-load in the waiting loop.
//!
//! ## Counter overflow
//! u64 is there so the dispenser never wraps around in practice: at a billion locks per second
//! it would take ~584 years. 32-bit tickets could wrap and let two threads in at once.
//!
//! ## Cache lines
//! The counters are written by different parties (waiters vs the owner), hence live on separate lines.
//! All the waiters still spin on the same `owner_ticket` line though - see the MCS lock for a fix.

use std::sync::atomic::{
    AtomicU64,
    Ordering::{Acquire, Relaxed, Release},
};

use crossbeam_utils::CachePadded;
use lock_api::{GuardSend, RawMutex, RawMutexFair};

use crate::spin_wait::SpinWait;

#[derive(Debug)]
pub struct RawTicketLock {
    next_free_ticket: CachePadded<AtomicU64>,
    owner_ticket: CachePadded<AtomicU64>,
}

impl RawTicketLock {
    pub const fn new() -> Self {
        Self {
            next_free_ticket: CachePadded::new(AtomicU64::new(0)),
            owner_ticket: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Number of threads holding or waiting for the lock at the moment of the call.
    /// It's a snapshot - it may be outdated by the time it's returned.
    pub fn queue_len(&self) -> u64 {
        let owner = self.owner_ticket.load(Relaxed);
        let next = self.next_free_ticket.load(Relaxed);
        next.saturating_sub(owner)
    }
}

impl Default for RawTicketLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawTicketLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardSend;

    fn lock(&self) {
        let ticket = self.next_free_ticket.fetch_add(1, Relaxed);
        SpinWait::new().spin_until(|| self.owner_ticket.load(Acquire) == ticket);
    }

    /// Succeeds only if nobody holds or waits for the lock:
    /// the next free ticket is then the one being served.
    fn try_lock(&self) -> bool {
        let owner = self.owner_ticket.load(Relaxed);
        self.next_free_ticket
            .compare_exchange(owner, owner + 1, Acquire, Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        debug_assert!(
            self.owner_ticket.load(Relaxed) < self.next_free_ticket.load(Relaxed),
            "unlock of an unlocked ticket lock"
        );
        self.owner_ticket.fetch_add(1, Release);
    }

    fn is_locked(&self) -> bool {
        self.queue_len() > 0
    }
}

// every unlock is a hand-off to the next ticket already
unsafe impl RawMutexFair for RawTicketLock {
    unsafe fn unlock_fair(&self) {
        self.unlock();
    }
}

/// A FIFO-fair spin lock protecting a value of type `Y`.
pub type TicketLock<Y> = lock_api::Mutex<RawTicketLock, Y>;
pub type TicketLockGuard<'a, Y> = lock_api::MutexGuard<'a, RawTicketLock, Y>;
