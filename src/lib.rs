pub mod bench;
pub mod futex;
pub mod mcs_spinlock;
pub mod mutex;
pub mod ring_buffer;
pub mod spin_wait;
pub mod ticket_lock;
pub mod ttas_spinlock;

pub use lock_api::{RawMutex, RawMutexTimed};
pub use mcs_spinlock::QueueSpinLock;
pub use mutex::{FutexMutex, FutexMutexGuard, RawFutexMutex};
pub use ring_buffer::{Consumer, FastRingBuffer, Producer, RingBuffer, SpscRing};
pub use ticket_lock::{RawTicketLock, TicketLock, TicketLockGuard};
pub use ttas_spinlock::{RawTtasSpinLock, TtasSpinLock, TtasSpinLockGuard};
