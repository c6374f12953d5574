// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Fixed fan-out: one worker thread per range, each with a private
//! accumulator, combined after a single join barrier.

use super::range::{Partitioner, RangeStrategy, WorkRange};
use super::worker::WorkerHandle;
use crate::error::{Error, Result};
#[cfg(feature = "log_workers")]
use crate::macros::log_info;
use crate::macros::{log_debug, log_warn};
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
use std::convert::TryFrom;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Number of worker threads to fan out to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThreadCount {
    /// Use the number returned by [`std::thread::available_parallelism()`],
    /// or a single thread if the host doesn't report it.
    #[default]
    AvailableParallelism,
    /// Use the given number of threads.
    Count(NonZeroUsize),
}

impl TryFrom<usize> for ThreadCount {
    type Error = <NonZeroUsize as TryFrom<usize>>::Error;

    fn try_from(thread_count: usize) -> std::result::Result<Self, Self::Error> {
        let count = NonZeroUsize::try_from(thread_count)?;
        Ok(ThreadCount::Count(count))
    }
}

impl ThreadCount {
    /// Returns the concrete number of threads.
    pub fn resolve(self) -> NonZeroUsize {
        match self {
            ThreadCount::AvailableParallelism => available_parallelism(),
            ThreadCount::Count(count) => count,
        }
    }
}

/// Detected hardware parallelism, falling back to 1.
pub(crate) fn available_parallelism() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or_else(|_e| {
        log_warn!("Getting the available parallelism failed, using 1 thread: {_e}");
        NonZeroUsize::MIN
    })
}

/// Policy to pin worker threads to CPUs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CpuPinningPolicy {
    /// Don't pin worker threads to CPUs.
    #[default]
    No,
    /// Pin each worker thread to a CPU, if CPU pinning is supported and
    /// implemented on this platform.
    IfSupported,
    /// Pin each worker thread to a CPU. Building a [`FanOut`] fails if CPU
    /// pinning isn't supported on this platform, and a worker that fails to
    /// pin itself panics (reported as [`Error::WorkerPanicked`]).
    Always,
}

/// Configuration of a [`FanOut`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FanOutBuilder {
    /// Number of worker threads to spawn per reduction.
    pub num_threads: ThreadCount,
    /// Strategy to distribute items among workers.
    pub range_strategy: RangeStrategy,
    /// Policy to pin worker threads to CPUs.
    pub cpu_pinning: CpuPinningPolicy,
}

impl FanOutBuilder {
    /// Validates the configuration and creates a [`FanOut`].
    ///
    /// ```
    /// # use fanout::{CpuPinningPolicy, FanOutBuilder, RangeStrategy, ThreadCount};
    /// let fan_out = FanOutBuilder {
    ///     num_threads: ThreadCount::try_from(4).unwrap(),
    ///     range_strategy: RangeStrategy::LastAbsorbsRemainder,
    ///     cpu_pinning: CpuPinningPolicy::No,
    /// }
    /// .build()
    /// .unwrap();
    ///
    /// let sum = fan_out
    ///     .reduce_with(
    ///         101,
    ///         |_worker| 0u64,
    ///         |acc, i| *acc += i as u64,
    ///         |acc| acc,
    ///         |a, b| a + b,
    ///     )
    ///     .unwrap();
    /// assert_eq!(sum, 50 * 101);
    /// ```
    pub fn build(&self) -> Result<FanOut> {
        #[cfg(any(
            miri,
            not(any(
                target_os = "android",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux"
            ))
        ))]
        match self.cpu_pinning {
            CpuPinningPolicy::No => (),
            CpuPinningPolicy::IfSupported => {
                log_warn!("Pinning threads to CPUs is not implemented on this platform.")
            }
            CpuPinningPolicy::Always => {
                return Err(Error::invalid_argument(
                    "pinning threads to CPUs is not implemented on this platform",
                ));
            }
        }

        let num_threads = self.num_threads.resolve();
        log_debug!(
            "Fan-out over {num_threads} threads, {:?} ranges, {:?} pinning",
            self.range_strategy,
            self.cpu_pinning
        );
        Ok(FanOut {
            partitioner: Partitioner::new(num_threads, self.range_strategy),
            cpu_pinning: self.cpu_pinning,
            num_cpus: available_parallelism(),
        })
    }
}

/// Identity of a worker within one reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerContext {
    /// Index of this worker, in `0..num_threads`.
    pub id: usize,
    /// Items assigned to this worker.
    pub range: WorkRange,
}

/// Per-worker map-and-reduce logic for [`FanOut::reduce()`].
///
/// Each worker calls [`init()`](Self::init) once, then
/// [`process_item()`](Self::process_item) for each index of its range, in
/// increasing order, then [`finalize()`](Self::finalize). The state never
/// leaves the worker thread; only the partial result is sent back.
pub trait Accumulator {
    /// Thread-local state, for example a running total and a random number
    /// generator.
    type State;
    /// Partial result produced by one worker.
    type Partial;

    /// Creates the state of the given worker.
    fn init(&self, worker: &WorkerContext) -> Self::State;

    /// Accumulates the item at the given index.
    fn process_item(&self, state: &mut Self::State, index: usize);

    /// Converts the state into the worker's partial result.
    fn finalize(&self, state: Self::State) -> Self::Partial;
}

/// An [`Accumulator`] made of three closures.
pub struct FnAccumulator<State, Partial, Init, ProcessItem, Finalize> {
    init: Init,
    process_item: ProcessItem,
    finalize: Finalize,
    _phantom: PhantomData<fn(State) -> Partial>,
}

impl<State, Partial, Init, ProcessItem, Finalize>
    FnAccumulator<State, Partial, Init, ProcessItem, Finalize>
where
    Init: Fn(&WorkerContext) -> State,
    ProcessItem: Fn(&mut State, usize),
    Finalize: Fn(State) -> Partial,
{
    /// Creates an accumulator from the given closures.
    pub fn new(init: Init, process_item: ProcessItem, finalize: Finalize) -> Self {
        Self {
            init,
            process_item,
            finalize,
            _phantom: PhantomData,
        }
    }
}

impl<State, Partial, Init, ProcessItem, Finalize> Accumulator
    for FnAccumulator<State, Partial, Init, ProcessItem, Finalize>
where
    Init: Fn(&WorkerContext) -> State,
    ProcessItem: Fn(&mut State, usize),
    Finalize: Fn(State) -> Partial,
{
    type State = State;
    type Partial = Partial;

    fn init(&self, worker: &WorkerContext) -> State {
        (self.init)(worker)
    }

    fn process_item(&self, state: &mut State, index: usize) {
        (self.process_item)(state, index)
    }

    fn finalize(&self, state: State) -> Partial {
        (self.finalize)(state)
    }
}

/// Runs reductions over `0..total` with a fixed number of worker threads.
///
/// Threads are spawned per call to [`reduce()`](Self::reduce) and are all
/// joined before it returns. There is no cancellation: once spawned, a worker
/// runs its whole range.
#[derive(Debug)]
pub struct FanOut {
    /// Splits items into per-worker ranges.
    partitioner: Partitioner,
    /// Policy to pin worker threads to CPUs.
    cpu_pinning: CpuPinningPolicy,
    /// Number of CPUs that workers are pinned to, round-robin.
    num_cpus: NonZeroUsize,
}

/// Slot holding the eventual partial result of one worker.
enum Slot<'scope, P> {
    /// The worker has an empty range and was finalized on the calling thread.
    Inline(Result<P>),
    /// The worker runs on its own thread.
    Spawned(WorkerHandle<'scope, P>),
}

impl<P: Send> Slot<'_, P> {
    /// Waits for the partial result of this worker.
    fn join(self) -> Result<P> {
        match self {
            Slot::Inline(result) => result,
            Slot::Spawned(handle) => handle.join(),
        }
    }
}

impl FanOut {
    /// Returns the number of workers of each reduction.
    pub fn num_threads(&self) -> NonZeroUsize {
        self.partitioner.num_workers()
    }

    /// Returns the ranges that a reduction over `total` items would assign to
    /// the workers.
    pub fn ranges(&self, total: usize) -> Vec<WorkRange> {
        self.partitioner.split(total)
    }

    /// Processes the items `0..total` in parallel and combines the partial
    /// results of the workers in worker order.
    ///
    /// Workers with an empty range are not spawned: their partial result is
    /// `finalize(init())`, computed on the calling thread. If any worker
    /// panics, the remaining workers are still joined and the first failure
    /// (in worker order) is returned.
    pub fn reduce<A>(
        &self,
        total: usize,
        accumulator: &A,
        combine: impl Fn(A::Partial, A::Partial) -> A::Partial,
    ) -> Result<A::Partial>
    where
        A: Accumulator + Sync,
        A::Partial: Send,
    {
        let ranges = self.partitioner.split(total);

        let partials = std::thread::scope(|scope| {
            let mut slots = Vec::with_capacity(ranges.len());
            let mut spawn_error = None;
            for (id, range) in ranges.into_iter().enumerate() {
                let worker = WorkerContext { id, range };
                if range.is_empty() {
                    slots.push(Slot::Inline(run_inline(accumulator, &worker)));
                    continue;
                }
                let cpu_pinning = self.cpu_pinning;
                let cpu = id % self.num_cpus;
                match WorkerHandle::spawn(scope, format!("fanout-{id}"), move || {
                    pin_to_cpu(cpu_pinning, id, cpu);
                    run_worker(accumulator, &worker)
                }) {
                    Ok(handle) => slots.push(Slot::Spawned(handle)),
                    Err(e) => {
                        // Workers already spawned are joined below.
                        spawn_error = Some(e);
                        break;
                    }
                }
            }
            log_debug!("[main thread] Waiting for {} workers", slots.len());

            // Collecting eagerly joins every worker, even after a failure.
            let results: Vec<Result<A::Partial>> = slots.into_iter().map(Slot::join).collect();
            match spawn_error {
                Some(e) => Err(e),
                None => results.into_iter().collect::<Result<Vec<_>>>(),
            }
        })?;
        log_debug!(
            "[main thread] Joined all workers, combining {} partial results",
            partials.len()
        );

        partials
            .into_iter()
            .reduce(combine)
            .ok_or_else(|| Error::invalid_argument("a reduction needs at least one worker"))
    }

    /// Same as [`reduce()`](Self::reduce), with an accumulator made of the
    /// given closures.
    pub fn reduce_with<State, Partial: Send>(
        &self,
        total: usize,
        init: impl Fn(&WorkerContext) -> State + Sync,
        process_item: impl Fn(&mut State, usize) + Sync,
        finalize: impl Fn(State) -> Partial + Sync,
        combine: impl Fn(Partial, Partial) -> Partial,
    ) -> Result<Partial> {
        self.reduce(
            total,
            &FnAccumulator::new(init, process_item, finalize),
            combine,
        )
    }
}

/// Body of a worker thread.
fn run_worker<A: Accumulator>(accumulator: &A, worker: &WorkerContext) -> A::Partial {
    #[cfg(feature = "log_workers")]
    log_info!(
        "[fanout-{}] Processing items {:?}",
        worker.id,
        worker.range.iter()
    );
    let mut state = accumulator.init(worker);
    for i in worker.range.iter() {
        accumulator.process_item(&mut state, i);
    }
    let partial = accumulator.finalize(state);
    #[cfg(feature = "log_workers")]
    log_info!("[fanout-{}] Done", worker.id);
    partial
}

/// Computes the partial result of an empty range on the calling thread,
/// reporting panics the same way as for spawned workers.
fn run_inline<A: Accumulator>(accumulator: &A, worker: &WorkerContext) -> Result<A::Partial> {
    catch_unwind(AssertUnwindSafe(|| run_worker(accumulator, worker)))
        .map_err(|payload| Error::worker_panicked(format!("fanout-{}", worker.id), payload))
}

#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn pin_to_cpu(cpu_pinning: CpuPinningPolicy, id: usize, cpu: usize) {
    let pin = || -> nix::Result<()> {
        let mut cpu_set = CpuSet::new();
        cpu_set.set(cpu)?;
        sched_setaffinity(Pid::from_raw(0), &cpu_set)
    };
    match cpu_pinning {
        CpuPinningPolicy::No => (),
        CpuPinningPolicy::IfSupported => match pin() {
            Ok(()) => log_debug!("Pinned worker #{id} to CPU #{cpu}"),
            Err(_e) => log_warn!("Failed to set CPU affinity for worker #{id}: {_e}"),
        },
        CpuPinningPolicy::Always => match pin() {
            Ok(()) => log_debug!("Pinned worker #{id} to CPU #{cpu}"),
            Err(e) => panic!("Failed to set CPU affinity for worker #{id}: {e}"),
        },
    }
}

#[cfg(any(
    miri,
    not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    ))
))]
fn pin_to_cpu(_cpu_pinning: CpuPinningPolicy, _id: usize, _cpu: usize) {}

#[cfg(test)]
mod test {
    use super::*;
    #[cfg(target_pointer_width = "64")]
    use crate::core::with_spawn_limit;

    fn fan_out(num_threads: usize, range_strategy: RangeStrategy) -> FanOut {
        FanOutBuilder {
            num_threads: ThreadCount::try_from(num_threads).unwrap(),
            range_strategy,
            cpu_pinning: CpuPinningPolicy::No,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn test_thread_count_try_from_usize() {
        assert!(ThreadCount::try_from(0).is_err());
        assert_eq!(
            ThreadCount::try_from(1),
            Ok(ThreadCount::Count(NonZeroUsize::try_from(1).unwrap()))
        );
    }

    #[test]
    fn test_thread_count_resolve() {
        assert_eq!(
            ThreadCount::AvailableParallelism.resolve(),
            std::thread::available_parallelism().unwrap()
        );
        assert_eq!(
            ThreadCount::try_from(3).unwrap().resolve(),
            NonZeroUsize::try_from(3).unwrap()
        );
    }

    #[test]
    fn test_default_builder() {
        let fan_out = FanOutBuilder::default().build().unwrap();
        assert_eq!(
            fan_out.num_threads(),
            std::thread::available_parallelism().unwrap()
        );
    }

    #[test]
    fn test_workers_see_their_own_range() {
        let fan_out = fan_out(4, RangeStrategy::LastAbsorbsRemainder);
        let seen = fan_out
            .reduce_with(
                10,
                |worker| (*worker, Vec::new()),
                |(_, items), i| items.push(i),
                |(worker, items)| vec![(worker, items)],
                |mut a, b| {
                    a.extend(b);
                    a
                },
            )
            .unwrap();
        assert_eq!(seen.len(), 4);
        for (id, (worker, items)) in seen.iter().enumerate() {
            assert_eq!(worker.id, id);
            assert_eq!(*items, worker.range.iter().collect::<Vec<_>>());
        }
        assert_eq!(seen[3].0.range, WorkRange::new(6, 10));
    }

    #[test]
    fn test_workers_run_on_named_threads() {
        let fan_out = fan_out(3, RangeStrategy::Balanced);
        let names = fan_out
            .reduce_with(
                3,
                |_| Vec::new(),
                |names, _| names.push(std::thread::current().name().map(str::to_owned)),
                |names| names,
                |mut a, b| {
                    a.extend(b);
                    a
                },
            )
            .unwrap();
        assert_eq!(
            names,
            vec![
                Some("fanout-0".to_owned()),
                Some("fanout-1".to_owned()),
                Some("fanout-2".to_owned())
            ]
        );
    }

    #[test]
    fn test_empty_ranges_are_not_spawned() {
        // With 2 items over 4 workers, only the last worker has a range.
        let fan_out = fan_out(4, RangeStrategy::LastAbsorbsRemainder);
        let main_thread = std::thread::current().id();
        let on_main = fan_out
            .reduce_with(
                2,
                |_| std::thread::current().id() == main_thread,
                |_, _| (),
                |on_main| vec![on_main],
                |mut a, b| {
                    a.extend(b);
                    a
                },
            )
            .unwrap();
        assert_eq!(on_main, vec![true, true, true, false]);
    }

    #[test]
    fn test_panic_in_empty_range_is_reported() {
        let fan_out = fan_out(4, RangeStrategy::LastAbsorbsRemainder);
        let result = fan_out.reduce_with(
            0,
            |worker| {
                if worker.id == 2 {
                    panic!("init failed");
                }
            },
            |_, _| (),
            |_| 0u32,
            |a, b| a + b,
        );
        match result {
            Err(Error::WorkerPanicked { worker, message }) => {
                assert_eq!(worker, "fanout-2");
                assert_eq!(message, "init failed");
            }
            r => panic!("unexpected result: {r:?}"),
        }
    }

    /// Counts the workers whose range was fully processed.
    #[cfg(target_pointer_width = "64")]
    fn counting_fan_out_reduce(
        fan_out: &FanOut,
        total: usize,
        finished: &std::sync::atomic::AtomicUsize,
    ) -> Result<usize> {
        fan_out.reduce_with(
            total,
            |_| 0usize,
            |count, _| *count += 1,
            |count| {
                std::thread::sleep(std::time::Duration::from_millis(20));
                finished.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                count
            },
            |a, b| a + b,
        )
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_spawn_failure_joins_spawned_workers() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let fan_out = fan_out(4, RangeStrategy::Balanced);
        let finished = AtomicUsize::new(0);
        let result = with_spawn_limit(2, || counting_fan_out_reduce(&fan_out, 100, &finished));
        match result {
            Err(Error::ResourceExhausted { worker, .. }) => assert_eq!(worker, "fanout-2"),
            r => panic!("unexpected result: {r:?}"),
        }
        // Workers 0 and 1 ran to completion before the error was returned, and
        // no worker was spawned after the failure.
        assert_eq!(finished.load(Ordering::SeqCst), 2);

        // Nothing is left over for the next reduction.
        let finished = AtomicUsize::new(0);
        assert_eq!(counting_fan_out_reduce(&fan_out, 100, &finished).unwrap(), 100);
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_spawn_failure_of_first_worker() {
        let fan_out = fan_out(3, RangeStrategy::LastAbsorbsRemainder);
        let finished = std::sync::atomic::AtomicUsize::new(0);
        let result = with_spawn_limit(0, || counting_fan_out_reduce(&fan_out, 10, &finished));
        assert!(matches!(
            result,
            Err(Error::ResourceExhausted { ref worker, .. }) if worker == "fanout-0"
        ));
        assert_eq!(finished.into_inner(), 0);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_spawn_failure_takes_priority_over_panics() {
        let fan_out = fan_out(4, RangeStrategy::Balanced);
        let result = with_spawn_limit(3, || {
            fan_out.reduce_with(
                8,
                |worker| {
                    if worker.id == 1 {
                        panic!("worker 1 failed");
                    }
                },
                |_, _| (),
                |_| 0u32,
                |a, b| a + b,
            )
        });
        match result {
            Err(Error::ResourceExhausted { worker, .. }) => assert_eq!(worker, "fanout-3"),
            r => panic!("unexpected result: {r:?}"),
        }
    }

    #[test]
    fn test_build_cpu_pinning_if_supported() {
        let fan_out = FanOutBuilder {
            num_threads: ThreadCount::AvailableParallelism,
            range_strategy: RangeStrategy::Balanced,
            cpu_pinning: CpuPinningPolicy::IfSupported,
        }
        .build()
        .unwrap();
        let sum = fan_out
            .reduce_with(11, |_| 0u64, |acc, i| *acc += i as u64, |acc| acc, |a, b| a + b)
            .unwrap();
        assert_eq!(sum, 55);
    }

    #[cfg(any(
        miri,
        not(any(
            target_os = "android",
            target_os = "dragonfly",
            target_os = "freebsd",
            target_os = "linux"
        ))
    ))]
    #[test]
    fn test_build_cpu_pinning_always_not_supported() {
        let result = FanOutBuilder {
            num_threads: ThreadCount::AvailableParallelism,
            range_strategy: RangeStrategy::LastAbsorbsRemainder,
            cpu_pinning: CpuPinningPolicy::Always,
        }
        .build();
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }
}
