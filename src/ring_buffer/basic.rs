use std::sync::atomic::{
    AtomicUsize,
    Ordering::{Acquire, Relaxed, Release},
};

use crossbeam_utils::CachePadded;

use super::{assert_capacity, next_index, Consumer, Producer, Slots, SpscRing};

// the indices sit on their own cache lines: the producer hammers `write`, the consumer `read`
pub struct RingBuffer<Y> {
    slots: Slots<Y>,
    capacity: usize,
    read: CachePadded<AtomicUsize>,
    write: CachePadded<AtomicUsize>,
}

// the Slots are only reached through produce/consume, whose callers promise one thread per side
unsafe impl<Y> Sync for RingBuffer<Y> where Y: Send {}

impl<Y> RingBuffer<Y> {
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
            write: CachePadded::new(AtomicUsize::new(0)),
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

impl<Y> SpscRing for RingBuffer<Y> {
    type Item = Y;

    unsafe fn produce(&self, value: Y) -> Result<(), Y> {
        // relaxed: we're the only writer of `write`
        let write = self.write.load(Relaxed);
        let next = next_index(write, self.capacity);
        // Acquire: the consumer is done with the slot it has released
        if next == self.read.load(Acquire) {
            return Err(value);
        }

        // SAFETY: the slot is outside of [read, write) => empty, and the consumer can't reach it yet
        self.slots.write(write, value);
        // Release: the value is written before the consumer can see it
        self.write.store(next, Release);
        Ok(())
    }

    unsafe fn consume(&self) -> Option<Y> {
        let read = self.read.load(Relaxed);
        if read == self.write.load(Acquire) {
            return None;
        }

        // SAFETY: the slot is inside [read, write) => written, and the producer won't touch it until we move on
        let value = self.slots.take(read);
        self.read.store(next_index(read, self.capacity), Release);
        Some(value)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<Y> Drop for RingBuffer<Y> {
    fn drop(&mut self) {
        // values that nobody has popped
        while self.pop().is_some() {}
    }
}
