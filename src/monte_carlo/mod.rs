// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Monte Carlo estimators built on the fixed fan-out reducer.
//!
//! Samples are drawn uniformly in the square `[-1, 1)²` (for π) or the cube
//! `[-1, 1)³` (for integration). Every worker owns a [`ChaCha8Rng`] seeded
//! with a common base seed and its own stream (the worker index), so no
//! generator is ever shared between threads, and a run with a fixed seed and
//! thread count is reproducible. The serial estimators use stream 0, so they
//! match a parallel run on a single thread.

mod density;
mod integration;
mod pi;

pub use density::{weighted, Axis, Density, Point3};
pub use integration::{integrate, integrate_parallel, Integration, MassMoments};
pub use pi::{estimate_pi, estimate_pi_parallel, PiEstimate};

use crate::error::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Base seed of the per-worker random number generators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Seed {
    /// Draw a fresh base seed from the thread-local generator of the caller.
    #[default]
    Entropy,
    /// Use the given base seed, for reproducible runs.
    Fixed(u64),
}

impl Seed {
    /// Resolves the base seed. Called once per estimation, on the calling
    /// thread.
    fn resolve(self) -> u64 {
        match self {
            Seed::Entropy => rand::random(),
            Seed::Fixed(seed) => seed,
        }
    }
}

/// Creates the generator of the given worker.
fn worker_rng(base_seed: u64, worker: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(base_seed);
    rng.set_stream(worker as u64);
    rng
}

/// Draws a coordinate uniformly in `[-1, 1)`.
fn coordinate(rng: &mut impl Rng) -> f64 {
    rng.random_range(-1.0..1.0)
}

/// Rejects an empty estimation before anything is spawned.
fn check_samples(nsamples: usize) -> Result<()> {
    if nsamples == 0 {
        Err(Error::invalid_argument(
            "a Monte Carlo estimation needs at least 1 sample",
        ))
    } else {
        Ok(())
    }
}
