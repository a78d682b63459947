use std::env::args;

use locks_n_rings::bench::{self, BenchError};
use log::info;

fn main() -> Result<(), BenchError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (primitive, config) = bench::parse_args(args().skip(1))?;
    let expected = config.validate()?;
    let report = bench::run(primitive, &config)?;

    info!(
        "{} finished in {:?}, counter = {} (expected {})",
        report.primitive,
        report.elapsed,
        report.counter,
        expected
    );
    Ok(())
}
