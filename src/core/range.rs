// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Splitting a number of work items into per-worker ranges.

use crate::error::{Error, Result};
use crate::macros::log_debug;
use std::num::NonZeroUsize;

/// A half-open range `[start, end)` of work items assigned to one worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WorkRange {
    /// First item of the range (inclusive).
    pub start: usize,
    /// End of the range (exclusive).
    pub end: usize,
}

impl WorkRange {
    /// Creates the range `[start, end)`.
    ///
    /// Panics if `start > end`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "invalid work range {start}..{end}");
        Self { start, end }
    }

    /// Number of items in this range.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Checks if this range contains no items.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns an iterator over the item indices of this range.
    pub fn iter(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl From<WorkRange> for std::ops::Range<usize> {
    fn from(range: WorkRange) -> Self {
        range.start..range.end
    }
}

/// Strategy to distribute a number of items among workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RangeStrategy {
    /// Each worker but the last receives `total / workers` items, and the last
    /// worker absorbs the remainder of the division.
    #[default]
    LastAbsorbsRemainder,
    /// Worker `i` receives the items `[i * total / workers, (i + 1) * total /
    /// workers)`, so that range sizes differ by at most one.
    Balanced,
}

/// Hands out the ranges of a given number of workers.
///
/// For any number of items, the ranges of workers `0..num_workers` are
/// ordered, disjoint, and their union is `0..total`.
#[derive(Clone, Copy, Debug)]
pub struct Partitioner {
    /// Number of workers to split the items into.
    num_workers: NonZeroUsize,
    /// Policy for remainder items.
    strategy: RangeStrategy,
}

impl Partitioner {
    /// Creates a partitioner for the given number of workers.
    pub fn new(num_workers: NonZeroUsize, strategy: RangeStrategy) -> Self {
        Self {
            num_workers,
            strategy,
        }
    }

    /// Number of ranges handed out by this partitioner.
    pub fn num_workers(&self) -> NonZeroUsize {
        self.num_workers
    }

    /// Returns the range of the given worker, for a total of `total` items.
    ///
    /// Panics if `worker` isn't less than the number of workers.
    pub fn range(&self, worker: usize, total: usize) -> WorkRange {
        let num_workers: usize = self.num_workers.into();
        assert!(
            worker < num_workers,
            "worker {worker} out of bounds for {num_workers} workers"
        );
        match self.strategy {
            RangeStrategy::LastAbsorbsRemainder => {
                let base = total / num_workers;
                let start = worker * base;
                let end = if worker == num_workers - 1 {
                    total
                } else {
                    start + base
                };
                WorkRange { start, end }
            }
            RangeStrategy::Balanced => {
                // Widen to u128 so that `worker * total` cannot overflow.
                let bound = |i: usize| ((i as u128 * total as u128) / num_workers as u128) as usize;
                WorkRange {
                    start: bound(worker),
                    end: bound(worker + 1),
                }
            }
        }
    }

    /// Returns the ranges of all the workers, in worker order.
    pub fn split(&self, total: usize) -> Vec<WorkRange> {
        let ranges: Vec<WorkRange> = (0..self.num_workers.get())
            .map(|worker| self.range(worker, total))
            .collect();
        log_debug!(
            "Split {total} items into {} ranges ({:?})",
            ranges.len(),
            self.strategy
        );
        ranges
    }
}

/// Splits `total` items among `workers` ranges, the last range absorbing the
/// remainder.
///
/// ```
/// # use fanout::{partition, WorkRange};
/// let ranges = partition(10, 3).unwrap();
/// assert_eq!(
///     ranges,
///     vec![WorkRange::new(0, 3), WorkRange::new(3, 6), WorkRange::new(6, 10)]
/// );
/// ```
pub fn partition(total: usize, workers: usize) -> Result<Vec<WorkRange>> {
    let workers = NonZeroUsize::new(workers)
        .ok_or_else(|| Error::invalid_argument("cannot partition work among 0 workers"))?;
    Ok(Partitioner::new(workers, RangeStrategy::LastAbsorbsRemainder).split(total))
}
