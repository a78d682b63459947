//! # Caching the other side's index
//!
//! In [RingBuffer](super::RingBuffer) every push loads `read` and every pop loads `write`.
//! Those lines are written by the other core all the time, so pretty much every load is a cache miss.
//!
//! But a side only needs the other's index to tell full/empty, and a stale value is on the safe side:
//! - the producer's old copy of `read` can only make the buffer look fuller than it is
//! - the consumer's old copy of `write` can only make it look emptier
//!
//! So each side keeps a private copy on its own cache line and reloads the real atomic only when
//! the copy says "full" / "empty". While the buffer is neither, both sides run on their own lines.

use std::{
    cell::Cell,
    sync::atomic::{
        AtomicUsize,
        Ordering::{Acquire, Relaxed, Release},
    },
};

use crossbeam_utils::CachePadded;

use super::{assert_capacity, next_index, Consumer, Producer, Slots, SpscRing};

pub struct FastRingBuffer<Y> {
    slots: Slots<Y>,
    capacity: usize,
    read: CachePadded<AtomicUsize>,
    /// consumer's copy of `write`
    write_cached: CachePadded<Cell<usize>>,
    write: CachePadded<AtomicUsize>,
    /// producer's copy of `read`
    read_cached: CachePadded<Cell<usize>>,
}

// on top of RingBuffer's reasoning: each Cell is touched by one side only
unsafe impl<Y> Sync for FastRingBuffer<Y> where Y: Send {}

impl<Y> FastRingBuffer<Y> {
    /// A buffer holding up to `capacity - 1` values.
    ///
    /// # Panics
    /// - if `capacity == 0`
    pub fn new(capacity: usize) -> Self {
        assert_capacity(capacity);
        Self {
            slots: Slots::new(capacity),
            capacity,
            read: CachePadded::new(AtomicUsize::new(0)),
            write_cached: CachePadded::new(Cell::new(0)),
            write: CachePadded::new(AtomicUsize::new(0)),
            read_cached: CachePadded::new(Cell::new(0)),
        }
    }

    /// Gives the value back if the buffer is full.
    pub fn push(&mut self, value: Y) -> Result<(), Y> {
        // SAFETY: &mut self => nobody else pushes
        unsafe { self.produce(value) }
    }

    /// `None` if the buffer is empty.
    pub fn pop(&mut self) -> Option<Y> {
        // SAFETY: &mut self => nobody else pops
        unsafe { self.consume() }
    }

    /// Splits into halves, one per thread.
    pub fn split(&mut self) -> (Producer<'_, Self>, Consumer<'_, Self>) {
        SpscRing::split(self)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<Y> SpscRing for FastRingBuffer<Y> {
    type Item = Y;

    unsafe fn produce(&self, value: Y) -> Result<(), Y> {
        let write = self.write.load(Relaxed);
        let next = next_index(write, self.capacity);
        if next == self.read_cached.get() {
            // looks full, see if the consumer has moved on since
            self.read_cached.set(self.read.load(Acquire));
            if next == self.read_cached.get() {
                return Err(value);
            }
        }

        // SAFETY: as in RingBuffer - the slot is free and the consumer can't reach it
        self.slots.write(write, value);
        self.write.store(next, Release);
        Ok(())
    }

    unsafe fn consume(&self) -> Option<Y> {
        let read = self.read.load(Relaxed);
        if read == self.write_cached.get() {
            // looks empty, see if the producer has pushed since
            self.write_cached.set(self.write.load(Acquire));
            if read == self.write_cached.get() {
                return None;
            }
        }

        // SAFETY: as in RingBuffer - the slot is written and the producer won't touch it
        let value = self.slots.take(read);
        self.read.store(next_index(read, self.capacity), Release);
        Some(value)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<Y> Drop for FastRingBuffer<Y> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
