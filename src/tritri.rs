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

//! Triangle/triangle intersection with the intersection segment, after
//! Möller's interval test, and ray/triangle intersection.

use cgmath::{InnerSpace, Vector2, Vector3, Zero};

use crate::geom::{Real, Segment, Triangle, COLLISION_EPSILON};

/// Names the edge of one of the two input triangles that produced a segment
/// endpoint. Edge `e` is the edge opposite vertex `e`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeRef {
    pub triangle: usize,
    pub edge: usize,
}

/// Result of a successful triangle/triangle test. Index 0 refers to the first
/// argument, index 1 to the second.
#[derive(Copy, Clone, Debug)]
pub struct TriTriIntersection {
    pub coplanar: bool,
    /// Bit `i` set when vertex `i` lies strictly behind the other plane.
    pub inside: [u8; 2],
    /// Bit `i` set when vertex `i` lies on the other plane.
    pub on_plane: [u8; 2],
    pub normals: [Vector3<Real>; 2],
    /// Degenerates to a point for coplanar contacts.
    pub segment: Segment,
    /// Producer of each segment endpoint; `None` for coplanar contacts.
    pub sources: [Option<EdgeRef>; 2],
}

impl TriTriIntersection {
    /// Mask of the edges of `triangle` that produced a segment endpoint.
    pub fn code(&self, triangle: usize) -> u8 {
        self.sources
            .iter()
            .flatten()
            .filter(|s| s.triangle == triangle)
            .fold(0, |mask, s| mask | (1u8 << s.edge))
    }

    /// Segment endpoints paired with their producing edge.
    pub fn endpoints(&self) -> [(Vector3<Real>, Option<EdgeRef>); 2] {
        [(self.segment.a, self.sources[0]), (self.segment.b, self.sources[1])]
    }

    /// The same intersection as seen with the arguments exchanged.
    pub fn swapped(&self) -> Self {
        let flip = |s: Option<EdgeRef>| {
            s.map(|e| EdgeRef {
                triangle: 1 - e.triangle,
                edge: e.edge,
            })
        };
        TriTriIntersection {
            coplanar: self.coplanar,
            inside: [self.inside[1], self.inside[0]],
            on_plane: [self.on_plane[1], self.on_plane[0]],
            normals: [self.normals[1], self.normals[0]],
            segment: self.segment,
            sources: [flip(self.sources[0]), flip(self.sources[1])],
        }
    }
}

fn signed_distances(t: &Triangle, n: Vector3<Real>, origin: Vector3<Real>) -> [Real; 3] {
    let mut d = [n.dot(t.a - origin), n.dot(t.b - origin), n.dot(t.c - origin)];
    for di in d.iter_mut() {
        if di.abs() < COLLISION_EPSILON {
            *di = 0.0;
        }
    }
    d
}

#[inline]
fn same_side(d: &[Real; 3]) -> bool {
    d[0] * d[1] > 0.0 && d[0] * d[2] > 0.0
}

fn masks(d: &[Real; 3]) -> (u8, u8) {
    d.iter().enumerate().fold((0, 0), |(inside, on), (i, &di)| {
        if di < 0.0 {
            (inside | (1 << i), on)
        } else if di == 0.0 {
            (inside, on | (1 << i))
        } else {
            (inside, on)
        }
    })
}

/// Where a triangle crosses the other plane: two points ordered by their
/// projection `t` on the intersection line, and the edge that produced each.
struct Crossing {
    t: [Real; 2],
    p: [Vector3<Real>; 2],
    edge: [usize; 2],
}

fn edge_point(a: Vector3<Real>, b: Vector3<Real>, da: Real, db: Real) -> Vector3<Real> {
    let denom = da - db;
    if denom.abs() < Real::EPSILON {
        a
    } else {
        a + (b - a) * (da / denom)
    }
}

fn crossing(tri: &Triangle, d: &[Real; 3], dir: Vector3<Real>) -> Crossing {
    // The apex is the vertex alone on its side of the plane.
    let apex = if d[0] * d[1] > 0.0 {
        2
    } else if d[0] * d[2] > 0.0 {
        1
    } else if d[1] * d[2] > 0.0 || d[0] != 0.0 {
        0
    } else if d[1] != 0.0 {
        1
    } else {
        2
    };
    let (o1, o2) = ((apex + 1) % 3, (apex + 2) % 3);
    let va = tri.vertex(apex);
    let p1 = edge_point(va, tri.vertex(o1), d[apex], d[o1]);
    let p2 = edge_point(va, tri.vertex(o2), d[apex], d[o2]);
    let (t1, t2) = (dir.dot(p1), dir.dot(p2));
    if t1 <= t2 {
        Crossing {
            t: [t1, t2],
            p: [p1, p2],
            edge: [o2, o1],
        }
    } else {
        Crossing {
            t: [t2, t1],
            p: [p2, p1],
            edge: [o1, o2],
        }
    }
}

/// Tests two triangles for intersection. Returns `None` when they are
/// disjoint or either is degenerate.
pub fn tri_tri_intersect(t1: &Triangle, t2: &Triangle) -> Option<TriTriIntersection> {
    let n1 = t1.normal();
    let n2 = t2.normal();
    if n1 == Vector3::zero() || n2 == Vector3::zero() {
        return None;
    }

    let d2 = signed_distances(t2, n1, t1.a);
    if same_side(&d2) {
        return None;
    }
    let d1 = signed_distances(t1, n2, t2.a);
    if same_side(&d1) {
        return None;
    }

    let (inside1, on1) = masks(&d1);
    let (inside2, on2) = masks(&d2);
    let dir = n1.cross(n2);

    if on1 == 0b111 || on2 == 0b111 || dir.magnitude2() < COLLISION_EPSILON * COLLISION_EPSILON {
        let p = coplanar_contact(t1, t2, n1, n2)?;
        return Some(TriTriIntersection {
            coplanar: true,
            inside: [inside1, inside2],
            on_plane: [on1, on2],
            normals: [n1, n2],
            segment: Segment { a: p, b: p },
            sources: [None, None],
        });
    }

    let c1 = crossing(t1, &d1, dir);
    let c2 = crossing(t2, &d2, dir);
    if c1.t[1] < c2.t[0] || c2.t[1] < c1.t[0] {
        return None;
    }

    let (a, sa) = if c1.t[0] >= c2.t[0] {
        (c1.p[0], EdgeRef { triangle: 0, edge: c1.edge[0] })
    } else {
        (c2.p[0], EdgeRef { triangle: 1, edge: c2.edge[0] })
    };
    let (b, sb) = if c1.t[1] <= c2.t[1] {
        (c1.p[1], EdgeRef { triangle: 0, edge: c1.edge[1] })
    } else {
        (c2.p[1], EdgeRef { triangle: 1, edge: c2.edge[1] })
    };

    Some(TriTriIntersection {
        coplanar: false,
        inside: [inside1, inside2],
        on_plane: [on1, on2],
        normals: [n1, n2],
        segment: Segment { a, b },
        sources: [Some(sa), Some(sb)],
    })
}

#[inline]
fn cross2(a: Vector2<Real>, b: Vector2<Real>) -> Real {
    a.x * b.y - a.y * b.x
}

/// Parameter along `a0 -> a1` where it crosses `b0 -> b1`.
fn segments_2d(
    a0: Vector2<Real>,
    a1: Vector2<Real>,
    b0: Vector2<Real>,
    b1: Vector2<Real>,
) -> Option<Real> {
    let r = a1 - a0;
    let s = b1 - b0;
    let denom = cross2(r, s);
    if denom.abs() < COLLISION_EPSILON * COLLISION_EPSILON {
        return None;
    }
    let qp = b0 - a0;
    let t = cross2(qp, s) / denom;
    let u = cross2(qp, r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

fn point_in_triangle_2d(p: Vector2<Real>, t: &[Vector2<Real>; 3]) -> bool {
    let e0 = cross2(t[1] - t[0], p - t[0]);
    let e1 = cross2(t[2] - t[1], p - t[1]);
    let e2 = cross2(t[0] - t[2], p - t[2]);
    (e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0) || (e0 <= 0.0 && e1 <= 0.0 && e2 <= 0.0)
}

/// Single contact point for triangles sharing a plane: the first edge/edge
/// crossing, else a vertex of one contained in the other.
fn coplanar_contact(
    t1: &Triangle,
    t2: &Triangle,
    n1: Vector3<Real>,
    n2: Vector3<Real>,
) -> Option<Vector3<Real>> {
    let n = Vector3::new(n1.x.abs() + n2.x.abs(), n1.y.abs() + n2.y.abs(), n1.z.abs() + n2.z.abs());
    let project = |v: Vector3<Real>| -> Vector2<Real> {
        if n.x >= n.y && n.x >= n.z {
            Vector2::new(v.y, v.z)
        } else if n.y >= n.z {
            Vector2::new(v.x, v.z)
        } else {
            Vector2::new(v.x, v.y)
        }
    };
    let p1 = [project(t1.a), project(t1.b), project(t1.c)];
    let p2 = [project(t2.a), project(t2.b), project(t2.c)];

    for i in 0..3 {
        let (i0, i1) = (i, (i + 1) % 3);
        for j in 0..3 {
            let (j0, j1) = (j, (j + 1) % 3);
            if let Some(s) = segments_2d(p1[i0], p1[i1], p2[j0], p2[j1]) {
                let (a, b) = (t1.vertex(i0), t1.vertex(i1));
                return Some(a + (b - a) * s);
            }
        }
    }
    if point_in_triangle_2d(p1[0], &p2) {
        return Some(t1.a);
    }
    if point_in_triangle_2d(p2[0], &p1) {
        return Some(t2.a);
    }
    None
}

/// Ray parameter and barycentric coordinates of a ray/triangle hit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayHit {
    pub t: Real,
    pub u: Real,
    pub v: Real,
}

/// Two-sided ray/triangle test (Möller-Trumbore). Hits behind the origin are
/// rejected.
pub fn ray_triangle(origin: Vector3<Real>, dir: Vector3<Real>, tri: &Triangle) -> Option<RayHit> {
    let e1 = tri.b - tri.a;
    let e2 = tri.c - tri.a;
    let pvec = dir.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < COLLISION_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = origin - tri.a;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(e1);
    let v = dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(qvec) * inv_det;
    if t < 0.0 {
        return None;
    }
    Some(RayHit { t, u, v })
}
