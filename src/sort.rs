// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Recursive fan-out: in-place quicksort with the Lomuto partition scheme,
//! where each partition step can hand its two halves to two new threads.
//!
//! The halves produced by a partition step are disjoint sub-slices (obtained
//! with [`split_at_mut()`](slice::split_at_mut)), so concurrent tasks never
//! touch the same index and no locking is needed.
//!
//! Spawning two threads per partition step without any bound creates one
//! thread per element in the worst case (already sorted or reverse sorted
//! input), which quickly exhausts the system. [`Cutover::Bounded`] (the
//! default) switches to the sequential algorithm below a slice length or
//! beyond a recursion depth. [`Cutover::Unbounded`] keeps the unbounded
//! behavior for demonstration purposes; spawn failures are then reported as
//! [`Error::ResourceExhausted`](crate::Error::ResourceExhausted).

use crate::core::{available_parallelism, join_all, WorkerHandle};
use crate::error::Result;
#[cfg(feature = "log_workers")]
use crate::macros::log_trace;
use crate::macros::log_debug;

/// Minimal slice length that is sorted in parallel with the default cutover.
pub const DEFAULT_MIN_PARALLEL_LEN: usize = 4096;

/// Policy deciding when the parallel quicksort stops spawning threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cutover {
    /// Sort sequentially any slice shorter than `min_parallel_len`, or whose
    /// recursion depth is at least `max_depth`. At most `2^(max_depth + 1) -
    /// 2` threads are spawned.
    Bounded {
        /// Slices shorter than this are sorted on the current thread.
        min_parallel_len: usize,
        /// Partition steps at this depth or deeper don't spawn threads.
        max_depth: usize,
    },
    /// Spawn two threads at every partition step, down to single elements.
    Unbounded,
}

impl Default for Cutover {
    /// Bounded cutover with a depth large enough to occupy all available CPUs
    /// even with unbalanced pivots.
    fn default() -> Self {
        let cpus = available_parallelism().get();
        // ceil(log2(cpus)), plus one level of slack for unbalanced partitions.
        let depth = (usize::BITS - (cpus - 1).leading_zeros()) as usize + 1;
        Cutover::Bounded {
            min_parallel_len: DEFAULT_MIN_PARALLEL_LEN,
            max_depth: depth,
        }
    }
}

impl Cutover {
    /// Whether a partition step on a slice of the given length at the given
    /// depth should dispatch its halves to new threads.
    fn spawns(&self, len: usize, depth: usize) -> bool {
        match *self {
            Cutover::Bounded {
                min_parallel_len,
                max_depth,
            } => len >= min_parallel_len && depth < max_depth,
            Cutover::Unbounded => true,
        }
    }
}

/// Configuration of [`parallel_quicksort()`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortConfig {
    /// When to stop spawning threads.
    pub cutover: Cutover,
}

/// Statistics about a parallel sort.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Number of threads spawned, in total.
    pub threads_spawned: usize,
    /// Deepest recursion level reached by the parallel recursion. The root
    /// call is at depth 0.
    pub max_depth: usize,
}

impl SortStats {
    fn leaf(depth: usize) -> Self {
        Self {
            threads_spawned: 0,
            max_depth: depth,
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            threads_spawned: self.threads_spawned + other.threads_spawned,
            max_depth: self.max_depth.max(other.max_depth),
        }
    }
}

/// Partitions the slice around its last element and returns the final index
/// of that pivot, or [`None`] if the slice is empty.
///
/// After the call, every element before the returned index is `<=` the pivot
/// and every element after it is `>=` the pivot (Lomuto scheme).
///
/// ```
/// # use fanout::sort::partition;
/// let mut data = [5, 3, 8, 1, 9, 2];
/// let pivot = partition(&mut data).unwrap();
/// assert_eq!(pivot, 1);
/// assert_eq!(data[pivot], 2);
/// ```
pub fn partition<T: PartialOrd>(data: &mut [T]) -> Option<usize> {
    if data.is_empty() {
        None
    } else {
        Some(lomuto(data))
    }
}

/// Lomuto partition of a non-empty slice.
fn lomuto<T: PartialOrd>(data: &mut [T]) -> usize {
    let high = data.len() - 1;
    let mut boundary = 0;
    for i in 0..high {
        if data[i] <= data[high] {
            data.swap(i, boundary);
            boundary += 1;
        }
    }
    data.swap(boundary, high);
    boundary
}

/// Sorts the slice in place on the current thread.
///
/// The smaller half is sorted recursively and the larger one iteratively, so
/// the stack depth stays logarithmic even when the running time degrades to
/// quadratic on sorted inputs.
pub fn quicksort<T: PartialOrd>(data: &mut [T]) {
    let mut data = data;
    while data.len() > 1 {
        let pivot = lomuto(data);
        let (left, right) = std::mem::take(&mut data).split_at_mut(pivot);
        let right = &mut right[1..];
        if left.len() < right.len() {
            quicksort(left);
            data = right;
        } else {
            quicksort(right);
            data = left;
        }
    }
}

/// Sorts the slice in place, dispatching both halves of each partition step to
/// two new threads until the cutover is reached.
///
/// Each parent thread waits for both of its children before returning. A panic
/// in a child (for example in a [`PartialOrd`] implementation) is returned as
/// [`Error::WorkerPanicked`](crate::Error::WorkerPanicked), and the slice is
/// then left partially sorted.
///
/// ```
/// # use fanout::sort::{parallel_quicksort, SortConfig};
/// let mut data = vec![5, 3, 8, 1, 9, 2];
/// parallel_quicksort(&mut data, &SortConfig::default()).unwrap();
/// assert_eq!(data, [1, 2, 3, 5, 8, 9]);
/// ```
pub fn parallel_quicksort<T: PartialOrd + Send>(
    data: &mut [T],
    config: &SortConfig,
) -> Result<()> {
    parallel_quicksort_with_stats(data, config).map(|_| ())
}

/// Same as [`parallel_quicksort()`], returning statistics about the spawned
/// threads.
pub fn parallel_quicksort_with_stats<T: PartialOrd + Send>(
    data: &mut [T],
    config: &SortConfig,
) -> Result<SortStats> {
    log_debug!(
        "Sorting {} items in parallel with {:?}",
        data.len(),
        config.cutover
    );
    let stats = sort_recursive(data, config.cutover, 0)?;
    log_debug!(
        "Sorted {} items: spawned {} threads, reached depth {}",
        data.len(),
        stats.threads_spawned,
        stats.max_depth
    );
    Ok(stats)
}

fn sort_recursive<T: PartialOrd + Send>(
    data: &mut [T],
    cutover: Cutover,
    depth: usize,
) -> Result<SortStats> {
    if data.len() <= 1 {
        return Ok(SortStats::leaf(depth));
    }
    if !cutover.spawns(data.len(), depth) {
        #[cfg(feature = "log_workers")]
        log_trace!("[depth {depth}] Sorting {} items sequentially", data.len());
        quicksort(data);
        return Ok(SortStats::leaf(depth));
    }

    let pivot = lomuto(data);
    let (left, right) = data.split_at_mut(pivot);
    let right = &mut right[1..];
    #[cfg(feature = "log_workers")]
    log_trace!(
        "[depth {depth}] Partitioned at {pivot}, dispatching {} + {} items",
        left.len(),
        right.len()
    );

    std::thread::scope(|scope| {
        let left = WorkerHandle::spawn(scope, format!("quicksort-{}-left", depth + 1), move || {
            sort_recursive(left, cutover, depth + 1)
        })?;
        let right = match WorkerHandle::spawn(
            scope,
            format!("quicksort-{}-right", depth + 1),
            move || sort_recursive(right, cutover, depth + 1),
        ) {
            Ok(right) => right,
            Err(e) => {
                // The spawn failure takes precedence over anything the left half reports.
                let _ = left.join();
                return Err(e);
            }
        };

        let mut stats = SortStats {
            threads_spawned: 2,
            max_depth: depth,
        };
        for child in join_all([left, right])? {
            stats = stats.merge(child?);
        }
        Ok(stats)
    })
}
