// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI tool to run the fan-out scenarios with custom parameters.

use clap::{Parser, ValueEnum};
use fanout::monte_carlo::{estimate_pi_parallel, integrate_parallel, Density, Seed};
use fanout::sort::{parallel_quicksort_with_stats, Cutover, SortConfig, DEFAULT_MIN_PARALLEL_LEN};
use fanout::{CpuPinningPolicy, FanOutBuilder, RangeStrategy, ThreadCount};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;
use std::num::NonZeroUsize;
use std::time::Instant;

fn main() -> fanout::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let fan_out = FanOutBuilder {
        num_threads: match cli.num_threads {
            Some(num_threads) => ThreadCount::Count(num_threads),
            None => ThreadCount::AvailableParallelism,
        },
        range_strategy: match cli.range_strategy {
            RangeStrategyCli::LastAbsorbsRemainder => RangeStrategy::LastAbsorbsRemainder,
            RangeStrategyCli::Balanced => RangeStrategy::Balanced,
        },
        cpu_pinning: if cli.pin_cpus {
            CpuPinningPolicy::IfSupported
        } else {
            CpuPinningPolicy::No
        },
    }
    .build()?;
    let seed = match cli.seed {
        Some(seed) => Seed::Fixed(seed),
        None => Seed::Entropy,
    };

    let start = Instant::now();
    match cli.scenario {
        Scenario::Pi => {
            let estimate = estimate_pi_parallel(&fan_out, cli.samples, seed)?;
            println!("π ≈ {} ({} hits)", estimate.value(), estimate.hits);
        }
        Scenario::Integration => {
            let density = match cli.density {
                DensityCli::ExpFalloff => Density::ExpFalloff,
                DensityCli::Manhattan => Density::Manhattan,
                DensityCli::OffsetQuadratic => Density::OffsetQuadratic,
                DensityCli::Constant => Density::Constant(cli.constant),
            };
            let integration = integrate_parallel(&fan_out, cli.samples, &density.as_fn(), seed)?;
            println!(
                "mass = {}, integral = {}",
                integration.mass(),
                integration.integral()
            );
            let centroid = integration.centroid()?;
            println!("centroid = ({}, {}, {})", centroid.x, centroid.y, centroid.z);
        }
        Scenario::Quicksort => {
            let mut data = (0..cli.samples as u64).collect::<Vec<_>>();
            let mut rng = ChaCha8Rng::seed_from_u64(cli.seed.unwrap_or(42));
            data.shuffle(&mut rng);
            let config = SortConfig {
                cutover: match cli.max_depth {
                    Some(max_depth) => Cutover::Bounded {
                        min_parallel_len: cli.min_parallel_len,
                        max_depth,
                    },
                    None if cli.unbounded => Cutover::Unbounded,
                    None => SortConfig::default().cutover,
                },
            };
            let stats = parallel_quicksort_with_stats(black_box(&mut data), &config)?;
            assert!(data.windows(2).all(|w| w[0] <= w[1]));
            println!(
                "sorted {} items, {} threads spawned, max depth {}",
                data.len(),
                stats.threads_spawned,
                stats.max_depth
            );
        }
    }
    println!("elapsed: {:?}", start.elapsed());
    Ok(())
}

/// CLI tool to run the fan-out scenarios with custom parameters.
#[derive(Parser, Debug, PartialEq)]
#[command(version)]
struct Cli {
    /// Scenario to run in parallel.
    #[arg(long, value_enum)]
    scenario: Scenario,
    /// Number of samples, or number of items to sort.
    #[arg(long, default_value_t = 1_000_000)]
    samples: usize,
    /// Number of worker threads. Default to the available parallelism.
    #[arg(long)]
    num_threads: Option<NonZeroUsize>,
    /// Policy to split samples among threads.
    #[arg(long, value_enum, default_value_t = RangeStrategyCli::LastAbsorbsRemainder)]
    range_strategy: RangeStrategyCli,
    /// Whether to pin worker threads to CPUs.
    #[arg(long, default_value_t = false)]
    pin_cpus: bool,
    /// Base seed of the random number generators. Default to a random seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Density to integrate. Used only for the integration scenario.
    #[arg(long, value_enum, default_value_t = DensityCli::OffsetQuadratic)]
    density: DensityCli,
    /// Value of the constant density.
    #[arg(long, default_value_t = 0.5)]
    constant: f64,
    /// Maximum recursion depth that spawns threads. Used only for the
    /// quicksort scenario.
    #[arg(long)]
    max_depth: Option<usize>,
    /// Minimum slice length that spawns threads, if a maximum depth is given.
    #[arg(long, default_value_t = DEFAULT_MIN_PARALLEL_LEN)]
    min_parallel_len: usize,
    /// Whether to spawn threads at every recursion level. Incompatible with a
    /// maximum depth.
    #[arg(long, default_value_t = false, conflicts_with = "max_depth")]
    unbounded: bool,
}

/// Policy to split samples among threads.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RangeStrategyCli {
    /// The last worker absorbs the remainder.
    LastAbsorbsRemainder,
    /// Range sizes differ by at most one.
    Balanced,
}

/// Density function over the unit ball.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DensityCli {
    /// exp(-‖p‖²).
    ExpFalloff,
    /// |x| + |y| + |z|.
    Manhattan,
    /// (x-1)² + (y-2)² + (z-3)².
    OffsetQuadratic,
    /// A constant value, see --constant.
    Constant,
}

/// Scenario to run.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Scenario {
    /// Estimate π.
    Pi,
    /// Integrate a density over the unit ball.
    Integration,
    /// Sort a shuffled range of integers.
    Quicksort,
}
