// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Estimation of π by counting hits in the unit disk.

use super::{check_samples, coordinate, worker_rng, Seed};
use crate::core::{Accumulator, FanOut, WorkRange, WorkerContext};
use crate::error::Result;
#[cfg(feature = "log_workers")]
use crate::macros::log_info;
use crate::macros::log_debug;
use rand_chacha::ChaCha8Rng;

/// Number of samples that landed in the unit disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PiEstimate {
    /// Samples inside the unit disk.
    pub hits: u64,
    /// Samples drawn in total.
    pub samples: u64,
}

impl PiEstimate {
    /// The estimate of π: four times the fraction of hits.
    pub fn value(&self) -> f64 {
        (self.hits as f64 / self.samples as f64) * 4.0
    }
}

/// Counts hits of a worker's samples.
struct HitCounter {
    base_seed: u64,
}

impl Accumulator for HitCounter {
    type State = (ChaCha8Rng, u64);
    type Partial = u64;

    fn init(&self, worker: &WorkerContext) -> Self::State {
        (worker_rng(self.base_seed, worker.id), 0)
    }

    fn process_item(&self, (rng, hits): &mut Self::State, _index: usize) {
        let x = coordinate(rng);
        let y = coordinate(rng);
        if x * x + y * y <= 1.0 {
            *hits += 1;
        }
    }

    fn finalize(&self, (_rng, hits): Self::State) -> u64 {
        #[cfg(feature = "log_workers")]
        log_info!("Worker counted {hits} hits");
        hits
    }
}

/// Estimates π with `nsamples` samples on the current thread.
pub fn estimate_pi(nsamples: usize, seed: Seed) -> Result<PiEstimate> {
    check_samples(nsamples)?;
    let counter = HitCounter {
        base_seed: seed.resolve(),
    };
    let worker = WorkerContext {
        id: 0,
        range: WorkRange::new(0, nsamples),
    };
    let mut state = counter.init(&worker);
    for i in worker.range.iter() {
        counter.process_item(&mut state, i);
    }
    Ok(PiEstimate {
        hits: counter.finalize(state),
        samples: nsamples as u64,
    })
}

/// Estimates π with `nsamples` samples split among the workers of the given
/// fan-out.
///
/// ```
/// # use fanout::monte_carlo::{estimate_pi_parallel, Seed};
/// # use fanout::FanOutBuilder;
/// let fan_out = FanOutBuilder::default().build().unwrap();
/// let pi = estimate_pi_parallel(&fan_out, 100_000, Seed::Fixed(42)).unwrap();
/// assert!((pi.value() - std::f64::consts::PI).abs() < 0.1);
/// ```
pub fn estimate_pi_parallel(fan_out: &FanOut, nsamples: usize, seed: Seed) -> Result<PiEstimate> {
    check_samples(nsamples)?;
    let counter = HitCounter {
        base_seed: seed.resolve(),
    };
    let hits = fan_out.reduce(nsamples, &counter, |a, b| a + b)?;
    let estimate = PiEstimate {
        hits,
        samples: nsamples as u64,
    };
    log_debug!(
        "π ≈ {} ({hits} hits out of {nsamples} samples, {} workers)",
        estimate.value(),
        fan_out.num_threads()
    );
    Ok(estimate)
}
