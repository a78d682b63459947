//! # Queue spin lock (MCS)
//!
//! TTAS and ticket locks make all the waiters spin on the same cache line.
//! Every release invalidates that line in every waiting core => O(waiters) coherence traffic per hand-off.
//!
//! Mellor-Crummey & Scott's lock gives each waiter its own [Waiter] node to spin on.
//! The nodes form a singly-linked queue, but the lock only knows its tail:
//!
//! ```text
//!  owner            waiter            waiter <- tail
//! [next: *]  --->  [next: *]  --->  [next: null]
//! [owner: 1]       [owner: 0]       [owner: 0]
//! ```
//!
//! A release touches one node - the successor's - so the traffic per hand-off is O(1).
//! As a bonus, an acquisition is a place in a queue => FIFO fairness, like the ticket lock.
//!
//! ## Two-phase enqueue
//! Joining the queue takes 2 steps:
//! 1. swap the tail with our node - now we're in the queue
//! 2. link the previous tail's `next` to our node - now the predecessor can find us
//!
//! The owner may release in between. Its CAS `tail: self -> null` fails (the tail is ours),
//! so it knows there's a successor, but its `next` is still null => it spins until the link shows up.
//! The window is one store long, unless the OS preempts the enqueuing thread right there.
//!
//! ## Node lifetime
//! The predecessor writes into our node and we write into the successor's, so a node must stay
//! exactly where it is until its release is finished. There's no way to hand out a guard with
//! a node inside: returning it moves the node, [std::mem::forget] leaves a dangling node in the queue.
//! So the node is a local of [QueueSpinLock::lock_with], and the guard that releases it is too;
//! the caller only gets `&mut Y` for the duration of a closure. Unwinding out of the closure
//! drops the guard like any other exit.
//!
//! There's no way to cancel an acquisition: once the tail is swapped the node is in the chain
//! and pulling it out would break the queue.

use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    ptr,
    sync::atomic::{
        AtomicBool, AtomicPtr,
        Ordering::{AcqRel, Acquire, Relaxed, Release},
    },
};

use crate::spin_wait::SpinWait;

/// A position in the wait queue. Lives in the acquiring call's stack frame.
#[derive(Debug)]
struct Waiter {
    next: AtomicPtr<Waiter>,
    is_owner: AtomicBool,
}

impl Waiter {
    const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            is_owner: AtomicBool::new(false),
        }
    }

    fn as_ptr(&self) -> *mut Waiter {
        self as *const Waiter as *mut Waiter
    }
}

pub struct QueueSpinLock<Y> {
    tail: AtomicPtr<Waiter>,
    value: UnsafeCell<Y>,
}

// the waiters only ever touch each other through the lock => same rules as any mutex
unsafe impl<Y> Sync for QueueSpinLock<Y> where Y: Send {}
unsafe impl<Y> Send for QueueSpinLock<Y> where Y: Send {}

impl<Y> QueueSpinLock<Y> {
    pub const fn new(value: Y) -> Self {
        Self {
            tail: AtomicPtr::new(ptr::null_mut()),
            value: UnsafeCell::new(value),
        }
    }

    /// Queues up for the lock, runs `f` on the protected value, releases.
    ///
    /// Spins until every waiter queued before us is done.
    /// Calling it again on the same lock from inside `f` deadlocks.
    pub fn lock_with<R>(&self, f: impl FnOnce(&mut Y) -> R) -> R {
        let waiter = Waiter::new();
        let mut guard = self.acquire(&waiter);
        f(&mut guard)
    }

    /// Runs `f` only if the lock is free right now, without joining the queue otherwise.
    pub fn try_lock_with<R>(&self, f: impl FnOnce(&mut Y) -> R) -> Option<R> {
        let waiter = Waiter::new();
        let mut guard = self.try_acquire(&waiter)?;
        Some(f(&mut guard))
    }

    /// Is someone holding or waiting for the lock. A snapshot, may be stale right away.
    pub fn is_locked(&self) -> bool {
        !self.tail.load(Relaxed).is_null()
    }

    pub fn get_mut(&mut self) -> &mut Y {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> Y {
        self.value.into_inner()
    }

    fn acquire<'a>(&'a self, waiter: &'a Waiter) -> Guard<'a, Y> {
        // phase 1: take the tail
        // AcqRel: acquire the previous releaser's CAS, publish our node's init to the successor
        let prev = self.tail.swap(waiter.as_ptr(), AcqRel);
        if prev.is_null() {
            waiter.is_owner.store(true, Release);
            return Guard { lock: self, waiter };
        }

        // phase 2: link the predecessor to us
        // SAFETY: the predecessor can't finish its release until it sees this link
        unsafe { (*prev).next.store(waiter.as_ptr(), Release) };

        // spin on our own node only
        SpinWait::new().spin_until(|| waiter.is_owner.load(Acquire));
        Guard { lock: self, waiter }
    }

    fn try_acquire<'a>(&'a self, waiter: &'a Waiter) -> Option<Guard<'a, Y>> {
        self.tail
            .compare_exchange(ptr::null_mut(), waiter.as_ptr(), AcqRel, Relaxed)
            .ok()?;
        waiter.is_owner.store(true, Release);
        Some(Guard { lock: self, waiter })
    }

    fn release(&self, waiter: &Waiter) {
        if self
            .tail
            .compare_exchange(waiter.as_ptr(), ptr::null_mut(), AcqRel, Relaxed)
            .is_ok()
        {
            // nobody behind us
            return;
        }

        // someone took the tail after us, wait for them to link in
        let mut next = ptr::null_mut();
        SpinWait::new().spin_until(|| {
            next = waiter.next.load(Acquire);
            !next.is_null()
        });

        // SAFETY: the successor spins on this flag and can't leave before it's set
        unsafe { (*next).is_owner.store(true, Release) };
    }
}

impl<Y> Default for QueueSpinLock<Y>
where
    Y: Default,
{
    fn default() -> Self {
        Self::new(Y::default())
    }
}

/// It lives on the same frame as its [Waiter] and drops before it.
struct Guard<'a, Y> {
    lock: &'a QueueSpinLock<Y>,
    waiter: &'a Waiter,
}

impl<Y> Deref for Guard<'_, Y> {
    type Target = Y;
    fn deref(&self) -> &Y {
        // SAFETY: existence of the guard means we own the lock
        unsafe { &*self.lock.value.get() }
    }
}

impl<Y> DerefMut for Guard<'_, Y> {
    fn deref_mut(&mut self) -> &mut Y {
        // SAFETY: existence of the guard means we own the lock
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<Y> Drop for Guard<'_, Y> {
    fn drop(&mut self) {
        self.lock.release(self.waiter);
    }
}

#[cfg(test)]
mod test {
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::atomic::AtomicUsize,
        thread::scope,
    };

    use super::*;

    #[test]
    fn test_lock_with() {
        let lock = QueueSpinLock::new(0);
        assert!(!lock.is_locked());
        let r = lock.lock_with(|v| {
            *v += 41;
            *v + 1
        });
        assert_eq!(r, 42);
        assert!(!lock.is_locked());
        assert_eq!(lock.into_inner(), 41);
    }

    #[test]
    fn test_try_lock_with() {
        let lock = QueueSpinLock::new(1);
        lock.lock_with(|_| {
            scope(|s| {
                s.spawn(|| assert_eq!(lock.try_lock_with(|v| *v), None));
            });
        });
        assert_eq!(lock.try_lock_with(|v| *v), Some(1));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_fifo() {
        const WAITERS: usize = 8;

        let lock = QueueSpinLock::new(Vec::new());
        let held = AtomicBool::new(false);
        let go = AtomicBool::new(false);

        scope(|s| {
            s.spawn(|| {
                lock.lock_with(|_| {
                    held.store(true, Release);
                    SpinWait::new().spin_until(|| go.load(Acquire));
                })
            });
            SpinWait::new().spin_until(|| held.load(Acquire));

            for i in 0..WAITERS {
                let before = lock.tail.load(Acquire);
                let lock = &lock;
                s.spawn(move || lock.lock_with(|order| order.push(i)));
                // the next waiter starts only after this one has taken the tail
                SpinWait::new().spin_until(|| lock.tail.load(Acquire) != before);
            }
            go.store(true, Release);
        });

        assert_eq!(lock.into_inner(), (0..WAITERS).collect::<Vec<_>>());
    }

    #[test]
    fn test_released_on_panic() {
        let lock = QueueSpinLock::new(0u32);
        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            lock.lock_with(|v| {
                *v = 123;
                panic!("boom");
            })
        }));
        assert!(res.is_err(), "expected panic");
        assert!(!lock.is_locked());
        assert_eq!(lock.lock_with(|v| *v), 123);
    }

    #[test]
    fn test_handoff_chain() {
        let lock = QueueSpinLock::new(0usize);
        let in_cs = AtomicUsize::new(0);
        scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1_000 {
                        lock.lock_with(|v| {
                            assert_eq!(in_cs.fetch_add(1, Relaxed), 0);
                            *v += 1;
                            in_cs.fetch_sub(1, Relaxed);
                        });
                    }
                });
            }
        });
        assert_eq!(lock.into_inner(), 8_000);
    }
}
