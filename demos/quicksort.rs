// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Simple program that sorts two copies of random data, sequentially and with
//! the parallel quicksort spawning threads at every level.

use fanout::sort::{parallel_quicksort_with_stats, quicksort, Cutover, SortConfig};
use rand::Rng;

const VECTOR_SIZE: usize = 10;

fn main() -> fanout::Result<()> {
    env_logger::init();

    let mut rng = rand::rng();
    let mut v1 = (0..VECTOR_SIZE)
        .map(|_| rng.random_range(0..i32::MAX))
        .collect::<Vec<_>>();
    let mut v2 = v1.clone();
    println!("before sorting: {v1:?}");

    quicksort(&mut v1);
    println!("after sorting, v1: {v1:?}");

    // Spawn threads down to single elements.
    let config = SortConfig {
        cutover: Cutover::Unbounded,
    };
    let stats = parallel_quicksort_with_stats(&mut v2, &config)?;
    println!("after sorting, v2: {v2:?}");
    println!(
        "spawned {} threads, max depth {}",
        stats.threads_spawned, stats.max_depth
    );
    assert_eq!(v1, v2);
    Ok(())
}
