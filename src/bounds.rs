// Copyright 2017 Matthew Plant. This file is part of PDFEM.
//
// PDFEM is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// PDFEM is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PDFEM. If not, see <http://www.gnu.org/licenses/>.

use std::ops::Add;

use cgmath::{Vector3, Zero};
use serde::{Deserialize, Serialize};

use crate::geom::{Real, Triangle};

/// A type that can be tested for overlap against `RHS`. Touching counts as
/// overlapping.
pub trait Overlaps<RHS> {
    fn overlaps(&self, rhs: &RHS) -> bool;
}

/// A type that can overlap and be combined with one another.
pub trait Bound: Copy + Add<Real, Output = Self> + Overlaps<Self> {
    /// Produce a bound that encloses the two arguments.
    fn combine(a: &Self, b: &Self) -> Self;

    /// Return a measure of the area of the object.
    fn surface_area(&self) -> Real;
}

/// A type that can be decomposed into a bound.
pub trait BoundedBy<B: Bound> {
    fn bounds(&self) -> B;
}

/// All geometries that satisfy Bound are bounded by themselves.
impl<B: Bound> BoundedBy<B> for B {
    #[inline(always)]
    fn bounds(&self) -> B {
        *self
    }
}

/// Axis Aligned Bounding Boxes are closed boxes aligned to the axes of the
/// coordinate system, described by a center and three half widths.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AABB {
    pub c: Vector3<Real>,
    pub r: Vector3<Real>,
}

impl AABB {
    /// A degenerate box at the origin.
    pub fn empty() -> Self {
        AABB {
            c: Vector3::zero(),
            r: Vector3::zero(),
        }
    }

    pub fn from_min_max(min: Vector3<Real>, max: Vector3<Real>) -> Self {
        AABB {
            c: (min + max) / 2.0,
            r: (max - min) / 2.0,
        }
    }

    /// The tightest box around `points`, or `None` if there are none.
    pub fn from_points<I: IntoIterator<Item = Vector3<Real>>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), p| {
            (
                Vector3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                Vector3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
            )
        });
        Some(AABB::from_min_max(min, max))
    }

    #[inline]
    pub fn min(&self) -> Vector3<Real> {
        self.c - self.r
    }

    #[inline]
    pub fn max(&self) -> Vector3<Real> {
        self.c + self.r
    }

    pub fn contains_point(&self, p: &Vector3<Real>) -> bool {
        (self.c.x - p.x).abs() <= self.r.x
            && (self.c.y - p.y).abs() <= self.r.y
            && (self.c.z - p.z).abs() <= self.r.z
    }
}

impl Add<Real> for AABB {
    type Output = Self;

    /// Extend AABB
    fn add(self, s: Real) -> AABB {
        AABB {
            r: self.r + Vector3::new(s, s, s),
            ..self
        }
    }
}

impl Overlaps<AABB> for AABB {
    fn overlaps(&self, rhs: &AABB) -> bool {
        (self.c.x - rhs.c.x).abs() <= self.r.x + rhs.r.x
            && (self.c.y - rhs.c.y).abs() <= self.r.y + rhs.r.y
            && (self.c.z - rhs.c.z).abs() <= self.r.z + rhs.r.z
    }
}

impl Bound for AABB {
    /// The smallest box enclosing both arguments.
    fn combine(a: &AABB, b: &AABB) -> AABB {
        let (amin, amax) = (a.min(), a.max());
        let (bmin, bmax) = (b.min(), b.max());
        let lower = Vector3::new(amin.x.min(bmin.x), amin.y.min(bmin.y), amin.z.min(bmin.z));
        let upper = Vector3::new(amax.x.max(bmax.x), amax.y.max(bmax.y), amax.z.max(bmax.z));
        let combined = AABB::from_min_max(lower, upper);
        debug_assert!(combined.r.x >= 0.0 && combined.r.y >= 0.0 && combined.r.z >= 0.0);
        combined
    }

    fn surface_area(&self) -> Real {
        self.r.x * self.r.y + self.r.y * self.r.z + self.r.z * self.r.x
    }
}

impl BoundedBy<AABB> for Triangle {
    /// Exact extent of the three corners. Degenerate triangles yield flat or
    /// zero-volume boxes.
    fn bounds(&self) -> AABB {
        let min = Vector3::new(
            self.a.x.min(self.b.x).min(self.c.x),
            self.a.y.min(self.b.y).min(self.c.y),
            self.a.z.min(self.b.z).min(self.c.z),
        );
        let max = Vector3::new(
            self.a.x.max(self.b.x).max(self.c.x),
            self.a.y.max(self.b.y).max(self.c.y),
            self.a.z.max(self.b.z).max(self.c.z),
        );
        AABB::from_min_max(min, max)
    }
}

#[cfg(test)]
mod tests {
    mod aabbs {
        use cgmath::Vector3;
        use crate::bounds::{Bound, BoundedBy, Overlaps, AABB};
        use crate::geom::Triangle;

        #[test]
        fn test_combine() {
            let a = AABB::from_min_max(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
            let b = AABB::from_min_max(Vector3::new(2.0, -1.0, 0.5), Vector3::new(3.0, 0.5, 0.75));
            let c = AABB::combine(&a, &b);
            assert_eq!(c.min(), Vector3::new(0.0, -1.0, 0.0));
            assert_eq!(c.max(), Vector3::new(3.0, 1.0, 1.0));
            assert!(c.overlaps(&a) && c.overlaps(&b));
            assert!(!a.overlaps(&b));
        }

        #[test]
        fn test_touching_overlaps() {
            let a = AABB::from_min_max(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
            let b = AABB::from_min_max(Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 1.0, 1.0));
            assert!(a.overlaps(&b));
            let apart = AABB::from_min_max(Vector3::new(1.5, 0.0, 0.0), Vector3::new(2.0, 1.0, 1.0));
            assert!(!a.overlaps(&apart));
            assert!(a.overlaps(&(apart + 0.5)));
        }

        #[test]
        fn test_triangle_bounds() {
            let t = Triangle {
                a: Vector3::new(0.0, 0.0, 0.0),
                b: Vector3::new(2.0, 1.0, 0.0),
                c: Vector3::new(-1.0, 3.0, 0.0),
            };
            let b: AABB = t.bounds();
            assert_eq!(b.min(), Vector3::new(-1.0, 0.0, 0.0));
            assert_eq!(b.max(), Vector3::new(2.0, 3.0, 0.0));
            for p in [t.a, t.b, t.c].iter() {
                assert!(b.contains_point(p));
            }
        }
    }
}
