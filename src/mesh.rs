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

use std::collections::HashMap;

use cgmath::{InnerSpace, Vector2, Vector3, Zero};
use smallvec::SmallVec;

use crate::bounds::AABB;
use crate::error::{Error, Result};
use crate::geom::{normalize_or_zero, Real, Transform, Triangle};
use crate::tritri::{ray_triangle, RayHit};

/// A mesh vertex. `elements` lists the faces (for surfaces) or tetrahedra (for
/// volumes) that reference this vertex.
#[derive(Clone, Debug)]
pub struct Vertex {
    pub p: Vector3<Real>,
    pub n: Vector3<Real>,
    pub color: [f32; 4],
    pub uv: Vector2<Real>,
    pub tangent: Vector3<Real>,
    pub elements: SmallVec<[usize; 8]>,
}

impl Vertex {
    pub fn new(p: Vector3<Real>) -> Self {
        Vertex {
            p,
            n: Vector3::zero(),
            color: [1.0, 1.0, 1.0, 1.0],
            uv: Vector2::zero(),
            tangent: Vector3::zero(),
            elements: SmallVec::new(),
        }
    }
}

/// Three vertex indices and the cached face normal.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Face {
    pub v: [usize; 3],
    pub n: Vector3<Real>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tetrahedron {
    pub v: [usize; 4],
}

/// A triangle surface. There are no requirements on the convexity of the
/// surface; collision response assumes it is closed and wound outward.
#[derive(Clone, Debug)]
pub struct TriSurface {
    pub verts: Vec<Vertex>,
    pub faces: Vec<Face>,
    /// Cached extent, refreshed by `update_bounds`.
    pub bounds: AABB,
}

impl Default for TriSurface {
    fn default() -> Self {
        TriSurface::new()
    }
}

impl TriSurface {
    pub fn new() -> Self {
        TriSurface {
            verts: Vec::new(),
            faces: Vec::new(),
            bounds: AABB::empty(),
        }
    }

    pub fn with_capacity(cap_verts: usize, cap_faces: usize) -> Self {
        TriSurface {
            verts: Vec::with_capacity(cap_verts),
            faces: Vec::with_capacity(cap_faces),
            bounds: AABB::empty(),
        }
    }

    /// Builds a surface from raw arrays and computes normals and bounds.
    pub fn from_arrays(positions: &[Vector3<Real>], faces: &[[usize; 3]]) -> Result<Self> {
        let mut surface = TriSurface::with_capacity(positions.len(), faces.len());
        for &p in positions {
            surface.push_vert(p);
        }
        for &f in faces {
            surface.push_face(f)?;
        }
        surface.update_normals();
        surface.update_bounds();
        Ok(surface)
    }

    pub fn push_vert(&mut self, p: Vector3<Real>) -> usize {
        let id = self.verts.len();
        self.verts.push(Vertex::new(p));
        id
    }

    pub fn push_face(&mut self, v: [usize; 3]) -> Result<usize> {
        let len = self.verts.len();
        if let Some(&bad) = v.iter().find(|&&i| i >= len) {
            return Err(Error::out_of_range("vertex", bad, len));
        }
        let index = self.faces.len();
        let n = self.make_triangle(v).normal();
        self.faces.push(Face { v, n });
        for &i in &v {
            self.verts[i].elements.push(index);
        }
        Ok(index)
    }

    #[inline]
    pub fn num_verts(&self) -> usize {
        self.verts.len()
    }

    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    #[inline]
    pub fn position(&self, i: usize) -> Vector3<Real> {
        self.verts[i].p
    }

    fn make_triangle(&self, v: [usize; 3]) -> Triangle {
        Triangle {
            a: self.verts[v[0]].p,
            b: self.verts[v[1]].p,
            c: self.verts[v[2]].p,
        }
    }

    /// The current geometry of face `f`.
    #[inline]
    pub fn triangle(&self, f: usize) -> Triangle {
        self.make_triangle(self.faces[f].v)
    }

    /// Recomputes face normals and area-weighted vertex normals.
    pub fn update_normals(&mut self) {
        for v in self.verts.iter_mut() {
            v.n = Vector3::zero();
        }
        for i in 0..self.faces.len() {
            let face = self.faces[i].v;
            let an = self.make_triangle(face).area_normal();
            self.faces[i].n = normalize_or_zero(an);
            for &v in &face {
                self.verts[v].n += an;
            }
        }
        for v in self.verts.iter_mut() {
            v.n = normalize_or_zero(v.n);
        }
    }

    pub fn update_bounds(&mut self) {
        self.bounds = AABB::from_points(self.verts.iter().map(|v| v.p)).unwrap_or_else(AABB::empty);
    }

    pub fn transform(&mut self, t: &Transform) {
        for v in self.verts.iter_mut() {
            v.p = t.apply(v.p);
        }
        self.update_normals();
        self.update_bounds();
    }

    /// Nearest face hit by a ray, if any.
    pub fn raycast(&self, origin: Vector3<Real>, dir: Vector3<Real>) -> Option<(usize, RayHit)> {
        (0..self.faces.len())
            .filter_map(|f| ray_triangle(origin, dir, &self.triangle(f)).map(|hit| (f, hit)))
            .min_by(|a, b| a.1.t.total_cmp(&b.1.t))
    }
}

/// A tetrahedral volume mesh.
#[derive(Clone, Debug)]
pub struct TetVolume {
    pub verts: Vec<Vertex>,
    pub tets: Vec<Tetrahedron>,
    pub bounds: AABB,
}

impl TetVolume {
    pub fn new(positions: &[Vector3<Real>], tets: &[[usize; 4]]) -> Result<Self> {
        let mut verts: Vec<Vertex> = positions.iter().map(|&p| Vertex::new(p)).collect();
        let len = verts.len();
        let mut out = Vec::with_capacity(tets.len());
        for (index, t) in tets.iter().enumerate() {
            if let Some(&bad) = t.iter().find(|&&i| i >= len) {
                return Err(Error::out_of_range("node", bad, len));
            }
            for &i in t {
                verts[i].elements.push(index);
            }
            out.push(Tetrahedron { v: *t });
        }
        let bounds = AABB::from_points(positions.iter().cloned()).unwrap_or_else(AABB::empty);
        Ok(TetVolume {
            verts,
            tets: out,
            bounds,
        })
    }

    pub fn tet_positions(&self, t: usize) -> [Vector3<Real>; 4] {
        let v = self.tets[t].v;
        [
            self.verts[v[0]].p,
            self.verts[v[1]].p,
            self.verts[v[2]].p,
            self.verts[v[3]].p,
        ]
    }

    /// Faces used by exactly one tetrahedron, wound so their normals point
    /// away from the owning element. Order follows first appearance.
    pub fn boundary_faces(&self) -> Vec<[usize; 3]> {
        let mut seen: HashMap<[usize; 3], (usize, [usize; 3])> = HashMap::new();
        let mut order = Vec::new();
        for t in 0..self.tets.len() {
            let v = self.tets[t].v;
            let p = self.tet_positions(t);
            for opp in 0..4 {
                let mut f = [v[(opp + 1) % 4], v[(opp + 2) % 4], v[(opp + 3) % 4]];
                let (a, b, c) = (p[(opp + 1) % 4], p[(opp + 2) % 4], p[(opp + 3) % 4]);
                if (b - a).cross(c - a).dot(p[opp] - a) > 0.0 {
                    f.swap(1, 2);
                }
                let mut key = f;
                key.sort_unstable();
                let entry = seen.entry(key).or_insert_with(|| {
                    order.push(key);
                    (0, f)
                });
                entry.0 += 1;
            }
        }
        order
            .into_iter()
            .filter_map(|key| match seen.get(&key) {
                Some(&(1, f)) => Some(f),
                _ => None,
            })
            .collect()
    }
}
