//! # Futex-like wait and wake
//!
//! The blocking mutex needs just 2 things from the OS:
//! - "put me to sleep if this word still holds X" - checking and sleeping have to be one atomic step,
//!   otherwise a wake could slip in between and we'd sleep forever
//! - "wake up N threads sleeping on this word"
//!
//! Linux has the futex syscall for it, macOS has ulock, Windows has WaitOnAddress.
//! The untimed wait and the wakes go through the [atomic-wait](https://crates.io/crates/atomic-wait)
//! crate, which picks the right one per OS.
//!
//! atomic-wait has no timeout, so [wait_timeout] does the `FUTEX_WAIT` syscall through libc on Linux.
//! Other platforms get a polling emulation - good enough for the rare timed lock.
//!
//! All the waits may return spuriously: the caller re-checks the word anyway.

use std::{sync::atomic::AtomicU32, time::Duration};

use strum_macros::Display;

/// Why a timed wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WaitOutcome {
    /// Woken up, or the word didn't hold the expected value, or just a spurious return
    Woken,
    /// The timeout elapsed
    TimedOut,
}

/// Blocks while `atomic` holds `expected`. No timeout.
#[inline]
pub fn wait(atomic: &AtomicU32, expected: u32) {
    atomic_wait::wait(atomic, expected);
}

/// Wakes one thread blocked on `atomic`, if any.
#[inline]
pub fn wake_one(atomic: &AtomicU32) {
    atomic_wait::wake_one(atomic);
}

/// Wakes every thread blocked on `atomic`.
#[inline]
pub fn wake_all(atomic: &AtomicU32) {
    atomic_wait::wake_all(atomic);
}

/// Blocks while `atomic` holds `expected`, but no longer than `timeout`.
#[cfg(target_os = "linux")]
pub fn wait_timeout(atomic: &AtomicU32, expected: u32, timeout: Duration) -> WaitOutcome {
    use std::{io, ptr};

    // FUTEX_WAIT takes a relative timeout
    let ts = libc::timespec {
        tv_sec: timeout.as_secs().try_into().unwrap_or(libc::time_t::MAX),
        tv_nsec: timeout.subsec_nanos() as _,
    };

    // SAFETY: the word is a valid, aligned u32 for the whole call; private = not shared between processes
    let r = unsafe {
        libc::syscall(
            libc::SYS_futex,
            atomic as *const AtomicU32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            &ts as *const libc::timespec,
            ptr::null::<u32>(),
            0u32,
        )
    };
    if r == 0 {
        return WaitOutcome::Woken;
    }

    match io::Error::last_os_error().raw_os_error() {
        Some(libc::ETIMEDOUT) => {
            log::trace!("futex wait on {atomic:p} timed out after {timeout:?}");
            WaitOutcome::TimedOut
        }
        // the word has changed already / a signal arrived
        Some(libc::EAGAIN) | Some(libc::EINTR) => WaitOutcome::Woken,
        other => {
            log::warn!("unexpected futex wait error {other:?} on {atomic:p}");
            WaitOutcome::Woken
        }
    }
}

/// Blocks while `atomic` holds `expected`, but no longer than `timeout`.
///
/// There's no portable timed futex, so it's an emulation that yields between polls.
#[cfg(not(target_os = "linux"))]
pub fn wait_timeout(atomic: &AtomicU32, expected: u32, timeout: Duration) -> WaitOutcome {
    use std::{
        sync::atomic::Ordering::Relaxed,
        thread,
        time::Instant,
    };

    let Some(deadline) = Instant::now().checked_add(timeout) else {
        // too far away to ever be reached
        wait(atomic, expected);
        return WaitOutcome::Woken;
    };
    loop {
        if atomic.load(Relaxed) != expected {
            return WaitOutcome::Woken;
        }
        if Instant::now() >= deadline {
            log::trace!("emulated futex wait on {atomic:p} timed out after {timeout:?}");
            return WaitOutcome::TimedOut;
        }
        thread::yield_now();
    }
}
