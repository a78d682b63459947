//! # Spin waiting
//!
//! Every busy loop in the crate goes through [SpinWait], so the plain
//! `spin_loop` hint could be replaced with a backoff strategy in one place.
//!
//! The hint is a `pause` on x86-64 and `yield`/`isb` on ARM64: it tells the core
//! we're waiting, which saves power and lets a hyper-threaded sibling run.
//! It's not a scheduling primitive - the thread stays on the CPU.

use std::hint;

#[derive(Debug, Default)]
pub struct SpinWait {
    spins: u64,
}

impl SpinWait {
    pub const fn new() -> Self {
        Self { spins: 0 }
    }

    /// One iteration of a busy loop.
    #[inline]
    pub fn spin(&mut self) {
        self.spins = self.spins.wrapping_add(1);
        hint::spin_loop();
    }

    /// Spins until `done` returns true; unbounded.
    #[inline]
    pub fn spin_until(&mut self, mut done: impl FnMut() -> bool) {
        while !done() {
            self.spin();
        }
    }

    /// Spins while `busy` holds, but no more than `limit` times.
    /// Returns true if `busy` cleared before the limit ran out.
    #[inline]
    pub fn spin_while_bounded(&mut self, mut busy: impl FnMut() -> bool, limit: u64) -> bool {
        let mut left = limit;
        while busy() {
            if left == 0 {
                return false;
            }
            left -= 1;
            self.spin();
        }
        true
    }

    /// How many times this waiter has spun so far.
    pub fn spins(&self) -> u64 {
        self.spins
    }
}

#[cfg(test)]
mod test {
    use std::{
        cell::Cell,
        sync::atomic::{AtomicBool, Ordering::Relaxed},
        thread,
    };

    use super::*;

    #[test]
    fn test_spin_until_counts() {
        let left = Cell::new(5);
        let mut sw = SpinWait::new();
        sw.spin_until(|| {
            left.set(left.get() - 1);
            left.get() == 0
        });
        // the condition is checked 5 times, the last check doesn't spin
        assert_eq!(sw.spins(), 4);
    }

    #[test]
    fn test_bounded_gives_up() {
        let mut sw = SpinWait::new();
        assert!(!sw.spin_while_bounded(|| true, 10));
        assert_eq!(sw.spins(), 10);

        let mut sw = SpinWait::new();
        assert!(sw.spin_while_bounded(|| false, 10));
        assert_eq!(sw.spins(), 0);
    }

    #[test]
    fn test_spin_until_other_thread() {
        let flag = AtomicBool::new(false);
        thread::scope(|s| {
            s.spawn(|| flag.store(true, Relaxed));
            SpinWait::new().spin_until(|| flag.load(Relaxed));
        });
        assert!(flag.load(Relaxed));
    }
}
