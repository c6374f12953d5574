// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Core engine: work partitioning, worker handles and the fixed fan-out
//! reducer.

mod fan_out;
mod range;
mod worker;

pub(crate) use fan_out::available_parallelism;
pub use fan_out::{
    Accumulator, CpuPinningPolicy, FanOut, FanOutBuilder, FnAccumulator, ThreadCount,
    WorkerContext,
};
pub use range::{partition, Partitioner, RangeStrategy, WorkRange};
#[cfg(test)]
pub(crate) use worker::with_spawn_limit;
pub use worker::{join_all, WorkerHandle};
