use std::{
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Barrier,
    },
    thread,
};

use locks_n_rings::{QueueSpinLock, RawFutexMutex, RawMutex, RawTicketLock, RawTtasSpinLock};

const THREADS: usize = 8;
const ITERS: usize = 5_000;

/// Every thread checks nobody else is inside while it increments.
fn contended_increments<R>()
where
    R: RawMutex + Sync,
{
    let lock = lock_api::Mutex::<R, usize>::new(0);
    let in_cs = AtomicBool::new(false);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                start.wait();
                for _ in 0..ITERS {
                    let mut g = lock.lock();
                    assert!(!in_cs.swap(true, SeqCst), "mutual exclusion violated");
                    *g += 1;
                    in_cs.store(false, SeqCst);
                }
            });
        }
    });

    assert_eq!(lock.into_inner(), THREADS * ITERS);
    assert!(!in_cs.load(SeqCst));
}

fn try_lock_while_held<R>()
where
    R: RawMutex + Sync,
{
    let raw = R::INIT;
    raw.lock();
    thread::scope(|s| {
        s.spawn(|| assert!(!raw.try_lock()));
    });
    // the failed attempt left it held
    assert!(raw.is_locked());
    unsafe { raw.unlock() };

    // and a successful one is unlocked as usual
    thread::scope(|s| {
        s.spawn(|| {
            assert!(raw.try_lock());
            unsafe { raw.unlock() };
        });
    });
    raw.lock();
    unsafe { raw.unlock() };
    assert!(!raw.is_locked());
}

fn released_on_panic<R>()
where
    R: RawMutex + Sync,
{
    let lock = lock_api::Mutex::<R, u32>::new(0);
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut g = lock.lock();
        *g = 123;
        panic!("boom");
    }));
    assert!(res.is_err());
    assert_eq!(*lock.lock(), 123);
}

#[test]
fn ttas_contended_increments() {
    contended_increments::<RawTtasSpinLock>();
}

#[test]
fn ticket_contended_increments() {
    contended_increments::<RawTicketLock>();
}

#[test]
fn futex_contended_increments() {
    contended_increments::<RawFutexMutex>();
}

#[test]
fn mcs_contended_increments() {
    let lock = QueueSpinLock::new(0usize);
    let in_cs = AtomicBool::new(false);
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                start.wait();
                for _ in 0..ITERS {
                    lock.lock_with(|v| {
                        assert!(!in_cs.swap(true, SeqCst), "mutual exclusion violated");
                        *v += 1;
                        in_cs.store(false, SeqCst);
                    });
                }
            });
        }
    });

    assert_eq!(lock.into_inner(), THREADS * ITERS);
}

#[test]
fn ttas_try_lock() {
    try_lock_while_held::<RawTtasSpinLock>();
}

#[test]
fn ticket_try_lock() {
    try_lock_while_held::<RawTicketLock>();
}

#[test]
fn futex_try_lock() {
    try_lock_while_held::<RawFutexMutex>();
}

#[test]
fn mcs_try_lock() {
    let lock = QueueSpinLock::new(());
    lock.lock_with(|_| {
        thread::scope(|s| {
            s.spawn(|| assert!(lock.try_lock_with(|_| ()).is_none()));
        });
        assert!(lock.is_locked());
    });
    assert!(lock.try_lock_with(|_| ()).is_some());
    lock.lock_with(|_| ());
    assert!(!lock.is_locked());
}

#[test]
fn locks_release_on_panic() {
    released_on_panic::<RawTtasSpinLock>();
    released_on_panic::<RawTicketLock>();
    released_on_panic::<RawFutexMutex>();
}
