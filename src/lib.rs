// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![doc = include_str!("../README.md")]
#![forbid(missing_docs, unsafe_code)]

mod core;
mod error;
mod macros;
pub mod monte_carlo;
pub mod sort;

pub use self::core::{
    join_all, partition, Accumulator, CpuPinningPolicy, FanOut, FanOutBuilder, FnAccumulator,
    Partitioner, RangeStrategy, ThreadCount, WorkRange, WorkerContext, WorkerHandle,
};
pub use error::{Error, Result};

#[cfg(test)]
mod test {
    use super::*;

    /// Sums the indices, panicking on the indices selected by the predicate.
    struct SumAccumulator<P> {
        panics_on: P,
    }

    impl<P: Fn(usize) -> bool> Accumulator for SumAccumulator<P> {
        type State = u64;
        type Partial = u64;

        fn init(&self, _worker: &WorkerContext) -> u64 {
            0
        }

        fn process_item(&self, sum: &mut u64, index: usize) {
            if (self.panics_on)(index) {
                panic!("arithmetic panic");
            } else {
                *sum += index as u64;
            }
        }

        fn finalize(&self, sum: u64) -> u64 {
            sum
        }
    }

    fn fan_out(num_threads: usize, range_strategy: RangeStrategy) -> FanOut {
        FanOutBuilder {
            num_threads: ThreadCount::try_from(num_threads).unwrap(),
            range_strategy,
            cpu_pinning: CpuPinningPolicy::No,
        }
        .build()
        .unwrap()
    }

    macro_rules! expand_tests {
        ( $range_strategy:expr, ) => {};
        ( $range_strategy:expr, $case:ident, $( $others:tt )* ) => {
            #[test]
            fn $case() {
                $crate::test::$case($range_strategy);
            }

            expand_tests!($range_strategy, $($others)*);
        };
        ( $range_strategy:expr, $case:ident => fail($msg:expr), $( $others:tt )* ) => {
            #[test]
            fn $case() {
                match $crate::test::$case($range_strategy) {
                    Err($crate::Error::WorkerPanicked { message, .. }) => assert_eq!(message, $msg),
                    r => panic!("expected a worker panic, got {r:?}"),
                }
            }

            expand_tests!($range_strategy, $($others)*);
        };
    }

    macro_rules! fan_out_tests {
        ( $mod:ident, $range_strategy:expr, $( $tests:tt )* ) => {
            mod $mod {
                use super::*;

                expand_tests!($range_strategy, $($tests)*);
            }
        };
    }

    macro_rules! all_fan_out_tests {
        ( $mod:ident, $range_strategy:expr ) => {
            fan_out_tests!(
                $mod,
                $range_strategy,
                test_sum_integers,
                test_sum_twice,
                test_sum_matches_sequential,
                test_more_workers_than_items,
                test_ranges_cover_items,
                test_one_panic => fail("arithmetic panic"),
                test_some_panics => fail("arithmetic panic"),
                test_many_panics => fail("arithmetic panic"),
            );
        };
    }

    all_fan_out_tests!(last_absorbs_remainder, RangeStrategy::LastAbsorbsRemainder);
    all_fan_out_tests!(balanced, RangeStrategy::Balanced);

    fn test_sum_integers(range_strategy: RangeStrategy) {
        let fan_out = fan_out(4, range_strategy);
        let sum = fan_out
            .reduce(
                10_001,
                &SumAccumulator {
                    panics_on: |_| false,
                },
                |a, b| a + b,
            )
            .unwrap();
        assert_eq!(sum, 5_000 * 10_001);
    }

    fn test_sum_twice(range_strategy: RangeStrategy) {
        let fan_out = fan_out(4, range_strategy);
        let accumulator = SumAccumulator {
            panics_on: |_| false,
        };
        // The same fan-out can run multiple reductions.
        let sum1 = fan_out.reduce(10_001, &accumulator, |a, b| a + b).unwrap();
        let sum2 = fan_out.reduce(10_001, &accumulator, |a, b| a + b).unwrap();
        assert_eq!(sum1, 5_000 * 10_001);
        assert_eq!(sum2, 5_000 * 10_001);
    }

    fn test_sum_matches_sequential(range_strategy: RangeStrategy) {
        let f = |i: usize| (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(17);
        let expected = (0..12_345).map(f).fold(0u64, u64::wrapping_add);
        for num_threads in [1, 2, 3, 7, 16] {
            let fan_out = fan_out(num_threads, range_strategy);
            let sum = fan_out
                .reduce_with(
                    12_345,
                    |_| 0u64,
                    |acc, i| *acc = acc.wrapping_add(f(i)),
                    |acc| acc,
                    u64::wrapping_add,
                )
                .unwrap();
            assert_eq!(sum, expected, "{num_threads} threads");
        }
    }

    fn test_more_workers_than_items(range_strategy: RangeStrategy) {
        let fan_out = fan_out(8, range_strategy);
        for total in 0..8 {
            let sum = fan_out
                .reduce(
                    total,
                    &SumAccumulator {
                        panics_on: |_| false,
                    },
                    |a, b| a + b,
                )
                .unwrap();
            assert_eq!(sum, (0..total as u64).sum::<u64>());
        }
    }

    fn test_ranges_cover_items(range_strategy: RangeStrategy) {
        let fan_out = fan_out(3, range_strategy);
        let ranges = fan_out.ranges(100);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[2].end, 100);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    fn test_one_panic(range_strategy: RangeStrategy) -> Result<u64> {
        let fan_out = fan_out(4, range_strategy);
        fan_out.reduce(
            10_001,
            &SumAccumulator {
                panics_on: |i| i == 0,
            },
            |a, b| a + b,
        )
    }

    fn test_some_panics(range_strategy: RangeStrategy) -> Result<u64> {
        let fan_out = fan_out(4, range_strategy);
        fan_out.reduce(
            10_001,
            &SumAccumulator {
                panics_on: |i| i % 123 == 0,
            },
            |a, b| a + b,
        )
    }

    fn test_many_panics(range_strategy: RangeStrategy) -> Result<u64> {
        let fan_out = fan_out(4, range_strategy);
        fan_out.reduce(
            10_001,
            &SumAccumulator {
                panics_on: |i| i % 2 == 0,
            },
            |a, b| a + b,
        )
    }

    #[test]
    fn test_first_panic_in_worker_order() {
        // Workers 1 and 3 panic, the error names worker 1.
        let fan_out = fan_out(4, RangeStrategy::LastAbsorbsRemainder);
        let result = fan_out.reduce(
            400,
            &SumAccumulator {
                panics_on: |i| (100..200).contains(&i) || (300..400).contains(&i),
            },
            |a, b| a + b,
        );
        match result {
            Err(Error::WorkerPanicked { worker, .. }) => assert_eq!(worker, "fanout-1"),
            r => panic!("expected a worker panic, got {r:?}"),
        }
    }
}
