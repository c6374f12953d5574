// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Mass and center of mass of a density over the unit ball.
//!
//! Points are drawn uniformly in the cube `[-1, 1)³` and rejected unless they
//! fall in the closed unit ball. Accepted points contribute their density to
//! the mass, and their density weighted by each coordinate to the first
//! moments.

use super::density::{weighted, Axis, Point3};
use super::{check_samples, coordinate, worker_rng, Seed};
use crate::core::{Accumulator, FanOut, WorkRange, WorkerContext};
use crate::error::{Error, Result};
#[cfg(feature = "log_workers")]
use crate::macros::log_info;
use crate::macros::log_debug;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::ops::{Add, AddAssign};

/// Running sums of the density and its first moments over accepted samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MassMoments {
    /// Number of accepted samples.
    pub hits: u64,
    /// Sum of `f(p)`.
    pub mass: f64,
    /// Sum of `p.x * f(p)`.
    pub moment_x: f64,
    /// Sum of `p.y * f(p)`.
    pub moment_y: f64,
    /// Sum of `p.z * f(p)`.
    pub moment_z: f64,
}

impl MassMoments {
    /// Accumulates an accepted point with the given density value.
    pub fn record(&mut self, p: Point3, density: f64) {
        self.hits += 1;
        self.mass += density;
        for axis in Axis::ALL {
            *self.moment_mut(axis) += weighted(axis, |_| density)(p);
        }
    }

    /// Returns the moment along the given axis.
    pub fn moment(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.moment_x,
            Axis::Y => self.moment_y,
            Axis::Z => self.moment_z,
        }
    }

    fn moment_mut(&mut self, axis: Axis) -> &mut f64 {
        match axis {
            Axis::X => &mut self.moment_x,
            Axis::Y => &mut self.moment_y,
            Axis::Z => &mut self.moment_z,
        }
    }
}

impl Add for MassMoments {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for MassMoments {
    fn add_assign(&mut self, rhs: Self) {
        self.hits += rhs.hits;
        self.mass += rhs.mass;
        self.moment_x += rhs.moment_x;
        self.moment_y += rhs.moment_y;
        self.moment_z += rhs.moment_z;
    }
}

/// Result of a Monte Carlo integration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Integration {
    /// Sums over the accepted samples.
    pub moments: MassMoments,
    /// Samples drawn in total, accepted or not.
    pub samples: u64,
}

impl Integration {
    /// Total mass: the sum of the density over accepted samples.
    pub fn mass(&self) -> f64 {
        self.moments.mass
    }

    /// Center of mass of the accepted samples.
    ///
    /// Fails with [`Error::ZeroMass`] if the total mass is zero, and with
    /// [`Error::NonFiniteMass`] if the density produced a NaN or an infinity.
    pub fn centroid(&self) -> Result<Point3> {
        let mass = self.moments.mass;
        if mass == 0.0 {
            return Err(Error::ZeroMass {
                samples: self.samples,
            });
        }
        if !mass.is_finite() {
            return Err(Error::NonFiniteMass {
                mass,
                samples: self.samples,
            });
        }
        Ok(Point3::new(
            self.moments.moment_x / mass,
            self.moments.moment_y / mass,
            self.moments.moment_z / mass,
        ))
    }

    /// Estimate of the integral of the density over the unit ball, scaling
    /// the mean over all samples by the volume of the sampled cube.
    pub fn integral(&self) -> f64 {
        8.0 * self.moments.mass / self.samples as f64
    }
}

/// Accumulates the mass and moments of a worker's samples.
struct MomentAccumulator<'a, F> {
    density: &'a F,
    base_seed: u64,
}

impl<F> MomentAccumulator<'_, F>
where
    F: Fn(Point3) -> f64,
{
    fn sample(&self, rng: &mut impl Rng, moments: &mut MassMoments) {
        let p = Point3::new(coordinate(rng), coordinate(rng), coordinate(rng));
        if p.norm2() <= 1.0 {
            moments.record(p, (self.density)(p));
        }
    }
}

impl<F> Accumulator for MomentAccumulator<'_, F>
where
    F: Fn(Point3) -> f64,
{
    type State = (ChaCha8Rng, MassMoments);
    type Partial = MassMoments;

    fn init(&self, worker: &WorkerContext) -> Self::State {
        (
            worker_rng(self.base_seed, worker.id),
            MassMoments::default(),
        )
    }

    fn process_item(&self, (rng, moments): &mut Self::State, _index: usize) {
        self.sample(rng, moments);
    }

    fn finalize(&self, (_rng, moments): Self::State) -> MassMoments {
        #[cfg(feature = "log_workers")]
        log_info!(
            "Worker accepted {} samples, mass {}",
            moments.hits,
            moments.mass
        );
        moments
    }
}

/// Integrates the density with `nsamples` samples on the current thread.
pub fn integrate<F>(nsamples: usize, density: &F, seed: Seed) -> Result<Integration>
where
    F: Fn(Point3) -> f64,
{
    check_samples(nsamples)?;
    let accumulator = MomentAccumulator {
        density,
        base_seed: seed.resolve(),
    };
    let worker = WorkerContext {
        id: 0,
        range: WorkRange::new(0, nsamples),
    };
    let mut state = accumulator.init(&worker);
    for i in worker.range.iter() {
        accumulator.process_item(&mut state, i);
    }
    Ok(Integration {
        moments: accumulator.finalize(state),
        samples: nsamples as u64,
    })
}

/// Integrates the density with `nsamples` samples split among the workers of
/// the given fan-out.
///
/// ```
/// # use fanout::monte_carlo::{integrate_parallel, Density, Seed};
/// # use fanout::FanOutBuilder;
/// let fan_out = FanOutBuilder::default().build().unwrap();
/// let integration =
///     integrate_parallel(&fan_out, 100_000, &Density::Constant(1.0).as_fn(), Seed::Fixed(7))
///         .unwrap();
/// // Volume of the unit ball.
/// assert!((integration.integral() - 4.0 / 3.0 * std::f64::consts::PI).abs() < 0.1);
/// let centroid = integration.centroid().unwrap();
/// assert!(centroid.x.abs() < 0.05);
/// ```
pub fn integrate_parallel<F>(
    fan_out: &FanOut,
    nsamples: usize,
    density: &F,
    seed: Seed,
) -> Result<Integration>
where
    F: Fn(Point3) -> f64 + Sync,
{
    check_samples(nsamples)?;
    let accumulator = MomentAccumulator {
        density,
        base_seed: seed.resolve(),
    };
    let moments = fan_out.reduce(nsamples, &accumulator, |a, b| a + b)?;
    log_debug!(
        "Integrated {nsamples} samples over {} workers: {} accepted, mass {}",
        fan_out.num_threads(),
        moments.hits,
        moments.mass
    );
    Ok(Integration {
        moments,
        samples: nsamples as u64,
    })
}
