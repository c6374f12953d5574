// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Points, axes and density functions over 3-D space.

/// A point in 3-D space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point3 {
    /// First coordinate.
    pub x: f64,
    /// Second coordinate.
    pub y: f64,
    /// Third coordinate.
    pub z: f64,
}

impl Point3 {
    /// Creates a point from its coordinates.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean norm.
    pub fn norm2(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }
}

/// A coordinate axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// The `x` axis.
    X,
    /// The `y` axis.
    Y,
    /// The `z` axis.
    Z,
}

impl Axis {
    /// All axes, in order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Returns the coordinate of the point along this axis.
    pub fn coordinate(self, p: Point3) -> f64 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
            Axis::Z => p.z,
        }
    }
}

/// Weights a function by one coordinate: the returned function evaluates to
/// `p.axis * f(p)`.
///
/// Integrating `weighted(axis, density)` yields the first moment of the
/// density along that axis.
///
/// ```
/// # use fanout::monte_carlo::{weighted, Axis, Point3};
/// let f = weighted(Axis::Y, |p: Point3| p.x + 1.0);
/// assert_eq!(f(Point3::new(2.0, 3.0, 0.0)), 9.0);
/// ```
pub fn weighted<F>(axis: Axis, f: F) -> impl Fn(Point3) -> f64
where
    F: Fn(Point3) -> f64,
{
    move |p| axis.coordinate(p) * f(p)
}

/// Built-in density functions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Density {
    /// `exp(-‖p‖²)` inside the unit ball, 0 outside.
    ExpFalloff,
    /// `|x| + |y| + |z|`.
    Manhattan,
    /// `(x - 1)² + (y - 2)² + (z - 3)²`.
    OffsetQuadratic,
    /// The same value everywhere.
    Constant(f64),
}

impl Density {
    /// Evaluates the density at the given point.
    pub fn eval(&self, p: Point3) -> f64 {
        match *self {
            Density::ExpFalloff => {
                let norm2 = p.norm2();
                if norm2 > 1.0 {
                    0.0
                } else {
                    (-norm2).exp()
                }
            }
            Density::Manhattan => p.x.abs() + p.y.abs() + p.z.abs(),
            Density::OffsetQuadratic => {
                (p.x - 1.0).powi(2) + (p.y - 2.0).powi(2) + (p.z - 3.0).powi(2)
            }
            Density::Constant(c) => c,
        }
    }

    /// Returns the density as a plain function.
    pub fn as_fn(self) -> impl Fn(Point3) -> f64 + Copy + Send + Sync {
        move |p| self.eval(p)
    }
}
