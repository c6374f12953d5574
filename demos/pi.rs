// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Simple program that estimates π serially, then over all available threads.

use fanout::monte_carlo::{estimate_pi, estimate_pi_parallel, Seed};
use fanout::{CpuPinningPolicy, FanOutBuilder, RangeStrategy, ThreadCount};

fn main() -> fanout::Result<()> {
    env_logger::init();

    let fan_out = FanOutBuilder {
        num_threads: ThreadCount::AvailableParallelism,
        range_strategy: RangeStrategy::LastAbsorbsRemainder,
        cpu_pinning: CpuPinningPolicy::IfSupported,
    }
    .build()?;

    let serial = estimate_pi(1_000, Seed::Entropy)?;
    println!("serial estimate of π: {}", serial.value());

    for nsamples in [1_000, 100_000, 10_000_000] {
        let estimate = estimate_pi_parallel(&fan_out, nsamples, Seed::Entropy)?;
        println!(
            "estimate of π with {nsamples} samples over {} threads: {} ({} hits)",
            fan_out.num_threads(),
            estimate.value(),
            estimate.hits
        );
    }
    Ok(())
}
