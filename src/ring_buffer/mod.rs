//! # SPSC ring buffers
//!
//! A bounded queue for exactly one producer and one consumer, no locks.
//! Push on a full buffer and pop on an empty one return right away, nothing blocks.
//!
//! ```text
//!        read              write
//!         v                  v
//! [ _ ][ a ][ b ][ c ][ d ][ _ ][ _ ]
//! ```
//!
//! - empty: `read == write`
//! - full: `(write + 1) % capacity == read`
//!
//! One slot is always left empty, otherwise a full buffer would look just like an empty one.
//! So a buffer of capacity 1 is always full: every push gives the value back.
//!
//! Each index has a single writer: the producer owns `write`, the consumer owns `read`.
//! So a side loads its own index relaxed (nobody else changes it), and the other's index with Acquire.
//! A slot is written before `write` moves forward with Release =>
//! a consumer that has seen the new `write` sees the whole value. Same for `read` and the freed slot.
//!
//! 2 flavours:
//! - [RingBuffer] - the above as is
//! - [FastRingBuffer] - caches the other side's index, see [optimization]
//!
//! ## One producer, one consumer
//! The algorithm breaks with a second producer or consumer, so the types don't allow one:
//! pushing and popping need `&mut` to the buffer, or to its [Producer] / [Consumer] half from `split`.
//! The halves aren't `Clone`, but they are `Send` => each can go to its own thread.

pub mod basic;
pub mod optimization;

use std::{cell::UnsafeCell, mem::MaybeUninit};

pub use basic::RingBuffer;
pub use optimization::FastRingBuffer;

/// The algorithm under [Producer] and [Consumer].
pub trait SpscRing {
    type Item;

    /// # Safety
    /// No other thread may call `produce` at the same time.
    unsafe fn produce(&self, value: Self::Item) -> Result<(), Self::Item>;

    /// # Safety
    /// No other thread may call `consume` at the same time.
    unsafe fn consume(&self) -> Option<Self::Item>;

    fn capacity(&self) -> usize;

    /// Splits into halves, one per thread.
    /// `&mut` makes sure there's at most one pair alive per buffer.
    fn split(&mut self) -> (Producer<'_, Self>, Consumer<'_, Self>)
    where
        Self: Sized,
    {
        let ring = &*self;
        (Producer { ring }, Consumer { ring })
    }
}

/// The pushing half of a split buffer.
pub struct Producer<'a, R> {
    ring: &'a R,
}

impl<R: SpscRing> Producer<'_, R> {
    /// Gives the value back if the buffer is full.
    pub fn push(&mut self, value: R::Item) -> Result<(), R::Item> {
        // SAFETY: there's one Producer per split and pushing needs &mut to it
        unsafe { self.ring.produce(value) }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// The popping half of a split buffer.
pub struct Consumer<'a, R> {
    ring: &'a R,
}

impl<R: SpscRing> Consumer<'_, R> {
    /// `None` if the buffer is empty.
    pub fn pop(&mut self) -> Option<R::Item> {
        // SAFETY: there's one Consumer per split and popping needs &mut to it
        unsafe { self.ring.consume() }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

pub(crate) fn next_index(index: usize, capacity: usize) -> usize {
    (index + 1) % capacity
}

/// Storage of a ring buffer. Slots are left uninitialised until a push writes them,
/// so nothing gets constructed up front and `Y` doesn't need a default.
///
/// Which slots hold values is tracked by the indices, not here.
pub(crate) struct Slots<Y> {
    cells: Box<[UnsafeCell<MaybeUninit<Y>>]>,
}

impl<Y> Slots<Y> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            cells: (0..capacity)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
        }
    }

    /// # Safety
    /// The slot must be empty and nobody else may touch it during the call.
    pub(crate) unsafe fn write(&self, index: usize, value: Y) {
        (*self.cells[index].get()).write(value);
    }

    /// Moves the value out, the slot is empty afterwards.
    ///
    /// # Safety
    /// The slot must hold a value and nobody else may touch it during the call.
    pub(crate) unsafe fn take(&self, index: usize) -> Y {
        (*self.cells[index].get()).assume_init_read()
    }
}

pub(crate) fn assert_capacity(capacity: usize) {
    assert!(capacity >= 1, "ring buffer capacity must be at least 1, got {capacity}");
}

#[cfg(test)]
mod test {
    use std::thread::{scope, yield_now};

    use super::*;

    /// One thread pushes 0..items, the other pops until it has them all.
    fn run_spsc<R>(ring: &mut R, items: usize) -> Vec<usize>
    where
        R: SpscRing<Item = usize> + Sync,
    {
        let (mut producer, mut consumer) = ring.split();
        let mut consumed = Vec::with_capacity(items);
        scope(|s| {
            s.spawn(move || {
                for i in 0..items {
                    let mut v = i;
                    while let Err(back) = producer.push(v) {
                        v = back;
                        yield_now();
                    }
                }
            });
            while consumed.len() < items {
                match consumer.pop() {
                    Some(v) => consumed.push(v),
                    None => yield_now(),
                }
            }
            // the producer is done, nothing extra may show up
            assert_eq!(consumer.pop(), None);
        });
        consumed
    }

    #[test]
    fn test_spsc_threads() {
        const ITEMS: usize = 50_000;
        let expected = (0..ITEMS).collect::<Vec<_>>();
        for capacity in [2, 5, 16, 128] {
            assert_eq!(run_spsc(&mut RingBuffer::new(capacity), ITEMS), expected);
            assert_eq!(run_spsc(&mut FastRingBuffer::new(capacity), ITEMS), expected);
        }
    }

    #[test]
    fn test_halves_are_send() {
        fn is_send<T: Send>(_: &T) {}
        let mut ring = FastRingBuffer::<String>::new(4);
        let (p, c) = ring.split();
        is_send(&p);
        is_send(&c);
        assert_eq!(p.capacity(), 4);
        assert_eq!(c.capacity(), 4);
    }

    #[test]
    fn test_capacity_one_always_full() {
        let mut basic = RingBuffer::new(1);
        assert_eq!(basic.push(7u8), Err(7));
        assert_eq!(basic.pop(), None);
        assert_eq!(basic.capacity(), 1);

        let mut fast = FastRingBuffer::new(1);
        assert_eq!(fast.push(7u8), Err(7));
        assert_eq!(fast.pop(), None);
        let (mut p, mut c) = fast.split();
        assert_eq!(p.push(8), Err(8));
        assert_eq!(c.pop(), None);
    }

    #[test]
    #[should_panic(expected = "at least 1")]
    fn test_capacity_zero() {
        RingBuffer::<u8>::new(0);
    }

    #[test]
    #[should_panic(expected = "at least 1")]
    fn test_capacity_zero_fast() {
        FastRingBuffer::<u8>::new(0);
    }
}
