// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Simple program that computes the mass and center of mass of a density over
//! the unit ball, for increasing numbers of samples.

use fanout::monte_carlo::{integrate_parallel, Density, Seed};
use fanout::{CpuPinningPolicy, FanOutBuilder, RangeStrategy, ThreadCount};

fn main() -> fanout::Result<()> {
    env_logger::init();

    let fan_out = FanOutBuilder {
        num_threads: ThreadCount::AvailableParallelism,
        range_strategy: RangeStrategy::LastAbsorbsRemainder,
        cpu_pinning: CpuPinningPolicy::IfSupported,
    }
    .build()?;
    println!("threads: {}", fan_out.num_threads());

    let density = Density::OffsetQuadratic.as_fn();
    for nsamples in [1_000, 10_000, 100_000, 1_000_000] {
        let integration = integrate_parallel(&fan_out, nsamples, &density, Seed::Entropy)?;
        let centroid = integration.centroid()?;
        println!(
            "{nsamples} samples: mass = {}, integral = {}",
            integration.mass(),
            integration.integral()
        );
        println!("cx: {}", centroid.x);
        println!("cy: {}", centroid.y);
        println!("cz: {}", centroid.z);
    }
    Ok(())
}
