//! # Shared counter benchmark
//!
//! N threads increment one counter M times each, every increment under the chosen lock.
//! Anything but N×M at the end means the lock has let two threads in at once.

use std::{
    num::ParseIntError,
    str::FromStr,
    thread,
    time::{Duration, Instant},
};

use lock_api::RawMutex;
use log::{debug, info};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::{
    mcs_spinlock::QueueSpinLock, mutex::RawFutexMutex, ticket_lock::RawTicketLock,
    ttas_spinlock::RawTtasSpinLock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Primitive {
    Ttas,
    Ticket,
    Mcs,
    Futex,
}

impl Primitive {
    /// All the names, comma-separated.
    pub fn known() -> String {
        Primitive::iter()
            .map(|p| p.to_string())
            .collect::<Vec<String>>()
            .join(",")
    }
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("no primitive supplied, use one of {0}")]
    MissingPrimitive(String),
    #[error("unknown primitive `{given}', use one of {known}")]
    UnknownPrimitive { given: String, known: String },
    #[error("invalid {what} `{given}'")]
    InvalidNumber {
        what: &'static str,
        given: String,
        #[source]
        source: ParseIntError,
    },
    #[error("at least one thread is needed")]
    ZeroThreads,
    #[error("{threads} threads x {increments} increments don't fit the counter")]
    TooManyIncrements { threads: usize, increments: u64 },
    #[error("counter is {actual}, expected {expected}")]
    CounterMismatch { actual: u64, expected: u64 },
    #[error("a worker thread panicked")]
    WorkerPanicked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub threads: usize,
    pub increments_per_thread: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            increments_per_thread: 100_000,
        }
    }
}

impl BenchConfig {
    /// The final counter value, `None` if it doesn't fit a `u64`.
    pub fn expected(&self) -> Option<u64> {
        u64::try_from(self.threads)
            .ok()?
            .checked_mul(self.increments_per_thread)
    }

    /// Rejects configs that can't run, returns the expected counter otherwise.
    pub fn validate(&self) -> Result<u64, BenchError> {
        if self.threads == 0 {
            return Err(BenchError::ZeroThreads);
        }
        self.expected().ok_or(BenchError::TooManyIncrements {
            threads: self.threads,
            increments: self.increments_per_thread,
        })
    }
}

/// `<primitive> [threads] [increments]`, the program name already skipped.
/// Missing numbers fall back to [BenchConfig::default].
pub fn parse_args<I>(args: I) -> Result<(Primitive, BenchConfig), BenchError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let selector = args
        .next()
        .ok_or_else(|| BenchError::MissingPrimitive(Primitive::known()))?;
    let primitive =
        Primitive::from_str(&selector).map_err(|_| BenchError::UnknownPrimitive {
            given: selector,
            known: Primitive::known(),
        })?;

    let mut config = BenchConfig::default();
    if let Some(threads) = args.next() {
        config.threads = parse_number("thread count", threads)?;
    }
    if let Some(increments) = args.next() {
        config.increments_per_thread = parse_number("increment count", increments)?;
    }
    config.validate()?;
    Ok((primitive, config))
}

fn parse_number<N>(what: &'static str, given: String) -> Result<N, BenchError>
where
    N: FromStr<Err = ParseIntError>,
{
    given
        .parse()
        .map_err(|source| BenchError::InvalidNumber {
            what,
            given,
            source,
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchReport {
    pub primitive: Primitive,
    pub counter: u64,
    pub elapsed: Duration,
}

/// Runs the benchmark and checks the final counter.
pub fn run(primitive: Primitive, config: &BenchConfig) -> Result<BenchReport, BenchError> {
    let expected = config.validate()?;
    info!(
        "starting {primitive} benchmark: {} threads x {} increments",
        config.threads, config.increments_per_thread
    );

    let started = Instant::now();
    let counter = match primitive {
        Primitive::Ttas => count_with_raw::<RawTtasSpinLock>(config)?,
        Primitive::Ticket => count_with_raw::<RawTicketLock>(config)?,
        Primitive::Futex => count_with_raw::<RawFutexMutex>(config)?,
        Primitive::Mcs => count_with_mcs(config)?,
    };
    let elapsed = started.elapsed();

    if counter != expected {
        return Err(BenchError::CounterMismatch {
            actual: counter,
            expected,
        });
    }
    Ok(BenchReport {
        primitive,
        counter,
        elapsed,
    })
}

fn count_with_raw<R>(config: &BenchConfig) -> Result<u64, BenchError>
where
    R: RawMutex + Sync,
{
    let counter = lock_api::Mutex::<R, u64>::new(0);
    spawn_workers(config, || *counter.lock() += 1)?;
    Ok(counter.into_inner())
}

fn count_with_mcs(config: &BenchConfig) -> Result<u64, BenchError> {
    let counter = QueueSpinLock::new(0u64);
    spawn_workers(config, || counter.lock_with(|v| *v += 1))?;
    Ok(counter.into_inner())
}

fn spawn_workers(config: &BenchConfig, increment: impl Fn() + Sync) -> Result<(), BenchError> {
    let increment = &increment;
    thread::scope(|s| {
        let workers = (0..config.threads)
            .map(|i| {
                s.spawn(move || {
                    for _ in 0..config.increments_per_thread {
                        increment();
                    }
                    debug!("thread {i} completed");
                })
            })
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .try_for_each(|w| w.join().map_err(|_| BenchError::WorkerPanicked))
    })
}
