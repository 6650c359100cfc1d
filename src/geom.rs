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

use cgmath::{Deg, ElementWise, InnerSpace, Quaternion, Rotation, Rotation3, Vector3, Zero};
use serde::{Deserialize, Serialize};

/// Scalar type used throughout the crate.
pub type Real = f64;

/// Tolerance for plane classification and near-parallel tests.
pub const COLLISION_EPSILON: Real = 1e-8;

/// Returns the normalized vector, or the zero vector when `v` is too short to
/// normalize.
#[inline]
pub fn normalize_or_zero(v: Vector3<Real>) -> Vector3<Real> {
    let m2 = v.magnitude2();
    if m2 < COLLISION_EPSILON * COLLISION_EPSILON {
        Vector3::zero()
    } else {
        v / m2.sqrt()
    }
}

/// A line segment between two points.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Segment {
    pub a: Vector3<Real>,
    pub b: Vector3<Real>,
}

impl From<(Vector3<Real>, Vector3<Real>)> for Segment {
    fn from(p: (Vector3<Real>, Vector3<Real>)) -> Self {
        Segment { a: p.0, b: p.1 }
    }
}

impl Segment {
    pub fn length(&self) -> Real {
        (self.b - self.a).magnitude()
    }
}

/// Triangles are three points in space. Counter-clockwise winding gives the
/// outward normal.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triangle {
    pub a: Vector3<Real>,
    pub b: Vector3<Real>,
    pub c: Vector3<Real>,
}

impl From<(Vector3<Real>, Vector3<Real>, Vector3<Real>)> for Triangle {
    fn from(p: (Vector3<Real>, Vector3<Real>, Vector3<Real>)) -> Self {
        Triangle {
            a: p.0,
            b: p.1,
            c: p.2,
        }
    }
}

impl Triangle {
    #[inline]
    pub fn vertex(&self, i: usize) -> Vector3<Real> {
        match i {
            0 => self.a,
            1 => self.b,
            _ => self.c,
        }
    }

    /// Unnormalized normal, twice the area in magnitude.
    #[inline]
    pub fn area_normal(&self) -> Vector3<Real> {
        (self.b - self.a).cross(self.c - self.a)
    }

    /// Unit normal, or zero for a degenerate triangle.
    #[inline]
    pub fn normal(&self) -> Vector3<Real> {
        normalize_or_zero(self.area_normal())
    }

    pub fn area(&self) -> Real {
        self.area_normal().magnitude() * 0.5
    }

    pub fn centroid(&self) -> Vector3<Real> {
        (self.a + self.b + self.c) / 3.0
    }
}

/// Load-time placement of reference geometry: scale, then rotate about an axis,
/// then translate.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub scale: Vector3<Real>,
    pub axis: Vector3<Real>,
    /// Rotation about `axis`, in degrees.
    pub angle: Real,
    pub translation: Vector3<Real>,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            scale: Vector3::new(1.0, 1.0, 1.0),
            axis: Vector3::new(0.0, 1.0, 0.0),
            angle: 0.0,
            translation: Vector3::zero(),
        }
    }
}

impl Transform {
    pub fn translation(t: Vector3<Real>) -> Self {
        Transform {
            translation: t,
            ..Transform::default()
        }
    }

    fn rotation(&self) -> Option<Quaternion<Real>> {
        let axis = normalize_or_zero(self.axis);
        if self.angle == 0.0 || axis == Vector3::zero() {
            None
        } else {
            Some(Quaternion::from_axis_angle(axis, Deg(self.angle)))
        }
    }

    pub fn apply(&self, p: Vector3<Real>) -> Vector3<Real> {
        let scaled = p.mul_element_wise(self.scale);
        let rotated = match self.rotation() {
            Some(q) => q.rotate_vector(scaled),
            None => scaled,
        };
        rotated + self.translation
    }

    pub fn apply_all(&self, points: &mut [Vector3<Real>]) {
        if *self == Transform::default() {
            return;
        }
        let q = self.rotation();
        for p in points.iter_mut() {
            let scaled = p.mul_element_wise(self.scale);
            *p = match q {
                Some(q) => q.rotate_vector(scaled),
                None => scaled,
            } + self.translation;
        }
    }
}
