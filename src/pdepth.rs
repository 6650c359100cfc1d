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

//! Penetration depth estimation between two intersecting closed surfaces.
//!
//! A resolution pass runs in stages over the triangle pairs reported by the
//! narrow phase:
//!
//! 1. Seeding. Each intersecting face is flagged and its vertices collect
//!    intersection samples and inside/outside votes.
//! 2. Classification. Vertices with a positive vote become `Border`, the
//!    rest `NonColliding`. Unclassified faces touching a non-colliding vertex
//!    are fenced off as `Outside`.
//! 3. Border depths from an inverse squared distance weighted average of
//!    the samples.
//! 4. Propagation. A breadth-first flood from the intersecting faces carries
//!    depth into the penetrated region.
//! 5. Artificial border. Intersecting faces that received no depth at all
//!    borrow it from the other surface.
//! 6. Balancing. Corrective forces are split so the pair's net correction
//!    is zero.
//!
//! Write-back then turns each corrective force into a Dirichlet target.

use cgmath::{InnerSpace, Vector3, Zero};
use smallvec::SmallVec;
use tracing::trace;

use crate::boundary::{Boundary, BoundaryType, HasBoundaryConditions, HasCollisionResponse};
use crate::collision::FaceOwner;
use crate::geom::{normalize_or_zero, Real, COLLISION_EPSILON};
use crate::mesh::TriSurface;
use crate::tritri::TriTriIntersection;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VertexState {
    Unknown,
    NonColliding,
    Border,
    Processing,
    Inside,
    ArtificialBorder,
}

impl VertexState {
    /// States that carry a propagated or seeded depth.
    #[inline]
    pub fn has_depth(self) -> bool {
        matches!(
            self,
            VertexState::Border | VertexState::Processing | VertexState::Inside
        )
    }

    /// States whose corrective force enters the balance.
    #[inline]
    pub fn contributes(self) -> bool {
        self.has_depth() || self == VertexState::ArtificialBorder
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaceState {
    Unknown,
    Intersect,
    Inside,
    Outside,
}

/// An estimate of where the other surface is: a point on it, its normal
/// there, and the depth already accumulated at that point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DepthSample {
    pub point: Vector3<Real>,
    pub normal: Vector3<Real>,
    pub depth: Real,
}

#[derive(Clone, Debug)]
pub struct VertexCollisionInfo {
    pub vertex: usize,
    pub position: Vector3<Real>,
    pub state: VertexState,
    pub counter: i32,
    pub samples: SmallVec<[DepthSample; 4]>,
    pub depth: Real,
    pub direction: Vector3<Real>,
    pub force: Vector3<Real>,
    /// Set when the vertex was reached by the flood fill rather than seeded.
    pub propagated: bool,
    touched: bool,
}

impl VertexCollisionInfo {
    fn new(vertex: usize) -> Self {
        VertexCollisionInfo {
            vertex,
            position: Vector3::zero(),
            state: VertexState::Unknown,
            counter: 0,
            samples: SmallVec::new(),
            depth: 0.0,
            direction: Vector3::zero(),
            force: Vector3::zero(),
            propagated: false,
            touched: false,
        }
    }

    fn reset(&mut self) {
        let vertex = self.vertex;
        *self = VertexCollisionInfo::new(vertex);
    }

    fn add_sample(&mut self, point: Vector3<Real>, normal: Vector3<Real>, depth: Real) {
        self.samples.push(DepthSample {
            point,
            normal,
            depth,
        });
    }

    /// Penetration force before balancing: depth along direction.
    #[inline]
    pub fn penetration(&self) -> Vector3<Real> {
        self.direction * self.depth
    }

    /// Weighted average of the samples with weights `1 / |x - p|^2`.
    /// Coincident samples weigh nothing. The depth is divided by `share`.
    pub fn compute_depth(&mut self, share: Real) {
        let mut weight = 0.0;
        let mut normal = Vector3::zero();
        let mut depth = 0.0;
        for s in self.samples.iter() {
            let diff = s.point - self.position;
            let dist2 = diff.magnitude2();
            if dist2 < COLLISION_EPSILON * COLLISION_EPSILON {
                continue;
            }
            let w = 1.0 / dist2;
            weight += w;
            normal += s.normal * w;
            depth += w * (s.normal.dot(diff) + s.depth);
        }
        if weight == 0.0 {
            self.depth = 0.0;
            self.direction = Vector3::zero();
            return;
        }
        self.direction = normalize_or_zero(normal / weight);
        self.depth = depth / weight / share;
    }
}

/// Number of contributing edges touching each vertex, keyed on the
/// contributing edge mask of a face. Edge `e` is opposite vertex `e`, so
/// vertex `v` touches every contributing edge except `e == v`.
pub const SEED_EDGES: [[u8; 3]; 8] = [
    [0, 0, 0], // none
    [0, 1, 1], // 1-2
    [1, 0, 1], // 2-0
    [1, 1, 2], // 1-2, 2-0
    [1, 1, 0], // 0-1
    [1, 2, 1], // 1-2, 0-1
    [2, 1, 1], // 2-0, 0-1
    [2, 2, 2], // all, in-plane edges only
];

/// What seeding does to one vertex of an intersecting face.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeedAction {
    /// Intersection points recorded as samples.
    pub points: u8,
    /// Vote added to the vertex counter.
    pub vote: i32,
}

/// Seeding action for vertex `v` of a face with contributing edge mask
/// `code`, given the narrow-phase inside and on-plane masks of that face.
pub fn seed_action(code: u8, inside: u8, on_plane: u8, v: usize) -> SeedAction {
    let touching = SEED_EDGES[(code & 0b111) as usize][v];
    let bit = 1u8 << v;
    if touching == 0 {
        SeedAction { points: 0, vote: 0 }
    } else if on_plane & bit != 0 {
        SeedAction {
            points: touching,
            vote: 0,
        }
    } else if inside & bit != 0 {
        SeedAction {
            points: touching,
            vote: 1,
        }
    } else {
        SeedAction { points: 0, vote: -1 }
    }
}

/// Resolution state for one of the two surfaces of a pair.
#[derive(Clone, Debug)]
pub struct SideInfo {
    pub face_state: Vec<FaceState>,
    /// Faces of the other surface each face was found intersecting.
    pub face_refs: Vec<SmallVec<[usize; 2]>>,
    pub vertices: Vec<VertexCollisionInfo>,
    /// Sum of penetration forces before balancing.
    pub total_force: Vector3<Real>,
    pub contributors: usize,
    touched_faces: Vec<usize>,
    touched_vertices: Vec<usize>,
}

impl SideInfo {
    fn new(num_verts: usize, num_faces: usize) -> Self {
        SideInfo {
            face_state: vec![FaceState::Unknown; num_faces],
            face_refs: vec![SmallVec::new(); num_faces],
            vertices: (0..num_verts).map(VertexCollisionInfo::new).collect(),
            total_force: Vector3::zero(),
            contributors: 0,
            touched_faces: Vec::new(),
            touched_vertices: Vec::new(),
        }
    }

    fn fits(&self, surface: &TriSurface) -> bool {
        self.vertices.len() == surface.num_verts() && self.face_state.len() == surface.num_faces()
    }

    fn reset(&mut self) {
        for &f in &self.touched_faces {
            self.face_state[f] = FaceState::Unknown;
            self.face_refs[f].clear();
        }
        for &v in &self.touched_vertices {
            self.vertices[v].reset();
        }
        self.touched_faces.clear();
        self.touched_vertices.clear();
        self.total_force = Vector3::zero();
        self.contributors = 0;
    }

    fn mark_face(&mut self, f: usize, state: FaceState) {
        if self.face_state[f] == FaceState::Unknown && self.face_refs[f].is_empty() {
            self.touched_faces.push(f);
        }
        self.face_state[f] = state;
    }

    fn touch_vertex(&mut self, v: usize, position: Vector3<Real>) -> &mut VertexCollisionInfo {
        if !self.vertices[v].touched {
            self.vertices[v].touched = true;
            self.vertices[v].position = position;
            self.touched_vertices.push(v);
        }
        &mut self.vertices[v]
    }

    /// Faces currently flagged as intersecting.
    pub fn intersecting_faces(&self) -> impl Iterator<Item = usize> + '_ {
        self.touched_faces
            .iter()
            .cloned()
            .filter(move |&f| self.face_state[f] == FaceState::Intersect)
    }

    /// Vertices whose force enters the balance.
    pub fn contributing(&self) -> impl Iterator<Item = &VertexCollisionInfo> + '_ {
        self.touched_vertices
            .iter()
            .map(move |&v| &self.vertices[v])
            .filter(|info| info.state.contributes())
    }

    fn seed(
        &mut self,
        surface: &TriSurface,
        face: usize,
        other_face: usize,
        hit: &TriTriIntersection,
        side: usize,
    ) {
        self.mark_face(face, FaceState::Intersect);
        if !self.face_refs[face].contains(&other_face) {
            self.face_refs[face].push(other_face);
        }
        let code = hit.code(side);
        let normal = hit.normals[1 - side];
        let endpoints = hit.endpoints();
        let verts = surface.faces[face].v;
        for (slot, &v) in verts.iter().enumerate() {
            let action = seed_action(code, hit.inside[side], hit.on_plane[side], slot);
            if action.points == 0 && action.vote == 0 {
                continue;
            }
            let info = self.touch_vertex(v, surface.verts[v].p);
            info.counter += action.vote;
            if action.points == 0 {
                continue;
            }
            for &(point, source) in endpoints.iter() {
                match source {
                    Some(e) if e.triangle == side && e.edge != slot => {
                        info.add_sample(point, normal, 0.0);
                    }
                    _ => {}
                }
            }
        }
    }

    fn classify(&mut self, owner: &FaceOwner) {
        for i in 0..self.touched_vertices.len() {
            let info = &mut self.vertices[self.touched_vertices[i]];
            info.state = if info.counter > 0 {
                VertexState::Border
            } else {
                VertexState::NonColliding
            };
        }
        for i in 0..self.touched_vertices.len() {
            let v = self.touched_vertices[i];
            if self.vertices[v].state != VertexState::NonColliding {
                continue;
            }
            for &f in owner.faces_of(v) {
                if self.face_state[f] == FaceState::Unknown {
                    self.mark_face(f, FaceState::Outside);
                }
            }
        }
    }

    fn compute_border_depths(&mut self) {
        for &v in &self.touched_vertices {
            let info = &mut self.vertices[v];
            if info.state == VertexState::Border {
                info.compute_depth(1.0);
            }
        }
    }

    fn propagate(&mut self, surface: &TriSurface, owner: &FaceOwner) {
        let mut frontier: Vec<usize> = self.intersecting_faces().collect();
        let mut processing = Vec::new();
        let mut fresh = Vec::new();
        while !frontier.is_empty() {
            processing.clear();
            for &f in &frontier {
                for &v in &surface.faces[f].v {
                    if self.vertices[v].state == VertexState::Border {
                        self.vertices[v].state = VertexState::Processing;
                        processing.push(v);
                    }
                }
            }

            let mut next = Vec::new();
            fresh.clear();
            for &v in &processing {
                let (p, dir, depth) = {
                    let info = &self.vertices[v];
                    (info.position, info.direction, info.depth)
                };
                for &g in owner.faces_of(v) {
                    if self.face_state[g] != FaceState::Unknown {
                        continue;
                    }
                    self.mark_face(g, FaceState::Inside);
                    next.push(g);
                    for &w in &surface.faces[g].v {
                        if self.vertices[w].touched && !self.vertices[w].propagated {
                            continue;
                        }
                        let info = self.touch_vertex(w, surface.verts[w].p);
                        if info.state == VertexState::Unknown {
                            info.state = VertexState::Border;
                            info.propagated = true;
                            fresh.push(w);
                        }
                        if info.state == VertexState::Border {
                            info.add_sample(p, dir, depth);
                        }
                    }
                }
                self.vertices[v].state = VertexState::Inside;
            }
            for &w in &fresh {
                self.vertices[w].compute_depth(1.0);
            }
            trace!(
                processed = processing.len(),
                bordered = fresh.len(),
                "propagation round"
            );
            frontier = next;
        }
    }

    fn resolve_artificial(&mut self, surface: &TriSurface, other: &SideInfo, other_surface: &TriSurface) {
        let mut promoted: Vec<usize> = Vec::new();
        for i in 0..self.touched_faces.len() {
            let f = self.touched_faces[i];
            if self.face_state[f] != FaceState::Intersect {
                continue;
            }
            let verts = surface.faces[f].v;
            if verts.iter().any(|&v| self.vertices[v].state.has_depth()) {
                continue;
            }
            for &v in &verts {
                let info = self.touch_vertex(v, surface.verts[v].p);
                if info.state != VertexState::ArtificialBorder {
                    info.state = VertexState::ArtificialBorder;
                    info.samples.clear();
                    promoted.push(v);
                }
            }
            let refs = self.face_refs[f].clone();
            for &g in &refs {
                for &u in &other_surface.faces[g].v {
                    let src = &other.vertices[u];
                    if !src.state.has_depth() {
                        continue;
                    }
                    for &w in &verts {
                        let info = &mut self.vertices[w];
                        if info.samples.iter().any(|s| s.point == src.position) {
                            continue;
                        }
                        info.add_sample(src.position, -src.direction, 0.0);
                    }
                }
            }
        }
        let share = promoted.len() as Real;
        for &v in &promoted {
            self.vertices[v].compute_depth(share);
        }
    }

    fn accumulate(&mut self) {
        let mut total = Vector3::zero();
        let mut count = 0;
        for info in self.contributing() {
            total += info.penetration();
            count += 1;
        }
        self.total_force = total;
        self.contributors = count;
    }

    fn distribute(&mut self, share: Vector3<Real>) {
        if self.contributors == 0 {
            return;
        }
        let per_vertex = share / self.contributors as Real;
        for &v in &self.touched_vertices {
            let info = &mut self.vertices[v];
            if info.state.contributes() {
                info.force = per_vertex;
            }
        }
    }
}

/// Per-pair collision record, kept across frames while the pair persists.
#[derive(Clone, Debug)]
pub struct PDepthCollisionInfo {
    pub sides: [SideInfo; 2],
    /// Intersecting face pairs found this pass.
    pub pairs: Vec<(usize, usize)>,
}

impl PDepthCollisionInfo {
    pub fn new(surfaces: [&TriSurface; 2]) -> Self {
        PDepthCollisionInfo {
            sides: [
                SideInfo::new(surfaces[0].num_verts(), surfaces[0].num_faces()),
                SideInfo::new(surfaces[1].num_verts(), surfaces[1].num_faces()),
            ],
            pairs: Vec::new(),
        }
    }

    /// Whether this record was allocated for surfaces of these sizes.
    pub fn fits(&self, surfaces: [&TriSurface; 2]) -> bool {
        self.sides[0].fits(surfaces[0]) && self.sides[1].fits(surfaces[1])
    }

    /// Clears the state touched by the previous pass.
    pub fn reset(&mut self) {
        self.sides[0].reset();
        self.sides[1].reset();
        self.pairs.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Records one intersecting face pair: face `faces.0` of surface 0 and
    /// `faces.1` of surface 1.
    pub fn add_intersection(
        &mut self,
        surfaces: [&TriSurface; 2],
        faces: (usize, usize),
        hit: &TriTriIntersection,
    ) {
        self.pairs.push(faces);
        self.sides[0].seed(surfaces[0], faces.0, faces.1, hit, 0);
        self.sides[1].seed(surfaces[1], faces.1, faces.0, hit, 1);
    }

    /// Runs classification through balancing over everything recorded by
    /// `add_intersection`.
    pub fn resolve(&mut self, surfaces: [&TriSurface; 2], owners: [&FaceOwner; 2]) {
        for k in 0..2 {
            let side = &mut self.sides[k];
            side.classify(owners[k]);
            side.compute_border_depths();
            side.propagate(surfaces[k], owners[k]);
        }

        let [s0, s1] = &mut self.sides;
        s0.resolve_artificial(surfaces[0], s1, surfaces[1]);
        s1.resolve_artificial(surfaces[1], s0, surfaces[0]);

        self.balance();
    }

    /// Splits the pair correction `P = (F0 - F1) / 2` as `+P/2` over side 0
    /// and `-P/2` over side 1.
    fn balance(&mut self) {
        self.sides[0].accumulate();
        self.sides[1].accumulate();
        let pair = (self.sides[0].total_force - self.sides[1].total_force) * 0.5;
        self.sides[0].distribute(pair * 0.5);
        self.sides[1].distribute(-pair * 0.5);
    }

    /// Writes a Dirichlet target `p + f` for every contributing vertex of
    /// each responding boundary. Returns the number of conditions written.
    pub fn apply(&self, boundaries: [&mut Boundary; 2]) -> usize {
        let mut written = 0;
        for (k, boundary) in boundaries.into_iter().enumerate() {
            if !boundary.response() {
                continue;
            }
            for info in self.sides[k].contributing() {
                boundary.set(
                    info.vertex,
                    BoundaryType::Dirichlet,
                    info.position + info.force,
                    0.0,
                    Vector3::zero(),
                );
                written += 1;
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    mod table {
        use crate::pdepth::{seed_action, SeedAction, SEED_EDGES};

        #[test]
        fn test_edge_counts() {
            for code in 0..8u8 {
                for v in 0..3 {
                    let expected = (0..3)
                        .filter(|&e| e != v && code & (1 << e) != 0)
                        .count() as u8;
                    assert_eq!(SEED_EDGES[code as usize][v], expected);
                }
            }
        }

        #[test]
        fn test_actions() {
            // Apex inside with both of its edges crossing: two points, one vote.
            assert_eq!(seed_action(0b110, 0b001, 0, 0), SeedAction { points: 2, vote: 1 });
            assert_eq!(seed_action(0b110, 0b001, 0, 1), SeedAction { points: 0, vote: -1 });
            assert_eq!(seed_action(0b110, 0b001, 0, 2), SeedAction { points: 0, vote: -1 });
            // Two inside vertices, each with its own crossing edge.
            assert_eq!(seed_action(0b110, 0b110, 0, 1), SeedAction { points: 1, vote: 1 });
            // On-plane vertex keeps its counter.
            assert_eq!(seed_action(0b100, 0, 0b001, 0), SeedAction { points: 1, vote: 0 });
            // Faces pierced by the other triangle's edges are not voted on.
            for v in 0..3 {
                assert_eq!(seed_action(0, 0b111, 0, v), SeedAction { points: 0, vote: 0 });
            }
        }
    }

    mod depth {
        use approx::assert_relative_eq;
        use cgmath::{Vector3, Zero};
        use crate::pdepth::VertexCollisionInfo;

        #[test]
        fn test_weighted_average() {
            let mut info = VertexCollisionInfo::new(0);
            info.position = Vector3::new(0.0, -0.5, 0.0);
            let up = Vector3::new(0.0, 1.0, 0.0);
            info.add_sample(Vector3::new(1.0, 0.0, 0.0), up, 0.0);
            info.add_sample(Vector3::new(-1.0, 0.0, 0.0), up, 0.0);
            info.compute_depth(1.0);
            assert_relative_eq!(info.depth, 0.5, epsilon = 1e-12);
            assert_eq!(info.direction, up);

            info.compute_depth(2.0);
            assert_relative_eq!(info.depth, 0.25, epsilon = 1e-12);
        }

        #[test]
        fn test_degenerate_samples() {
            let mut info = VertexCollisionInfo::new(0);
            info.position = Vector3::new(1.0, 2.0, 3.0);
            info.compute_depth(1.0);
            assert_eq!(info.depth, 0.0);
            assert_eq!(info.direction, Vector3::zero());

            // Coincident samples carry no weight.
            info.add_sample(info.position, Vector3::new(0.0, 1.0, 0.0), 4.0);
            info.compute_depth(1.0);
            assert_eq!(info.depth, 0.0);

            // Opposing normals cancel to a zero direction.
            info.add_sample(Vector3::new(2.0, 2.0, 3.0), Vector3::new(0.0, 1.0, 0.0), 0.0);
            info.add_sample(Vector3::new(0.0, 2.0, 3.0), Vector3::new(0.0, -1.0, 0.0), 0.0);
            info.compute_depth(1.0);
            assert_eq!(info.direction, Vector3::zero());
            assert!(info.depth.is_finite());
        }
    }

    mod resolution {
        use approx::assert_relative_eq;
        use cgmath::{InnerSpace, Vector3, Zero};
        use crate::boundary::{Boundary, BoundaryType, HasBoundaryConditions};
        use crate::collision::FaceOwner;
        use crate::mesh::TriSurface;
        use crate::pdepth::{PDepthCollisionInfo, VertexState};
        use crate::tritri::tri_tri_intersect;

        fn v(x: f64, y: f64, z: f64) -> Vector3<f64> {
            Vector3::new(x, y, z)
        }

        /// Closed box with outward winding.
        fn cuboid(min: Vector3<f64>, max: Vector3<f64>) -> TriSurface {
            let p = |i: usize| {
                Vector3::new(
                    if i & 1 != 0 { max.x } else { min.x },
                    if i & 2 != 0 { max.y } else { min.y },
                    if i & 4 != 0 { max.z } else { min.z },
                )
            };
            let pts: Vec<_> = (0..8).map(p).collect();
            let faces = [
                [0, 4, 6], [0, 6, 2], // -x
                [1, 3, 7], [1, 7, 5], // +x
                [0, 1, 5], [0, 5, 4], // -y
                [2, 6, 7], [2, 7, 3], // +y
                [0, 2, 3], [0, 3, 1], // -z
                [4, 5, 7], [4, 7, 6], // +z
            ];
            TriSurface::from_arrays(&pts, &faces).unwrap()
        }

        fn detect(a: &TriSurface, b: &TriSurface) -> PDepthCollisionInfo {
            let mut info = PDepthCollisionInfo::new([a, b]);
            for i in 0..a.num_faces() {
                for j in 0..b.num_faces() {
                    if let Some(hit) = tri_tri_intersect(&a.triangle(i), &b.triangle(j)) {
                        info.add_intersection([a, b], (i, j), &hit);
                    }
                }
            }
            let (oa, ob) = (FaceOwner::build(a), FaceOwner::build(b));
            info.resolve([a, b], [&oa, &ob]);
            info
        }

        fn net_force(info: &PDepthCollisionInfo) -> Vector3<f64> {
            info.sides
                .iter()
                .flat_map(|s| s.contributing())
                .fold(Vector3::zero(), |acc, i| acc + i.force)
        }

        #[test]
        fn test_cuboid_winding() {
            let c = cuboid(v(0.0, 0.0, 0.0), v(1.0, 1.0, 1.0));
            let center = v(0.5, 0.5, 0.5);
            for f in 0..c.num_faces() {
                let t = c.triangle(f);
                assert!(t.normal().dot(t.centroid() - center) > 0.0);
            }
        }

        #[test]
        fn test_two_triangles() {
            // A vertical triangle pokes 0.3 below a horizontal one.
            let a = TriSurface::from_arrays(
                &[v(0.0, -0.3, 0.0), v(0.5, 0.7, 0.0), v(-0.5, 0.7, 0.0)],
                &[[0, 1, 2]],
            ).unwrap();
            let b = TriSurface::from_arrays(
                &[v(-2.0, 0.0, -1.0), v(0.0, 0.0, 2.0), v(2.0, 0.0, -1.0)],
                &[[0, 1, 2]],
            ).unwrap();
            let info = detect(&a, &b);
            assert_eq!(info.pairs, vec![(0, 0)]);

            let apex = &info.sides[0].vertices[0];
            assert_eq!(apex.state, VertexState::Inside);
            assert_relative_eq!(apex.depth, 0.3, epsilon = 1e-9);
            assert_relative_eq!(apex.direction.y, 1.0, epsilon = 1e-9);
            assert_eq!(info.sides[0].vertices[1].state, VertexState::NonColliding);

            // The pierced triangle borrows the apex depth, shared three ways.
            for w in info.sides[1].vertices.iter() {
                assert_eq!(w.state, VertexState::ArtificialBorder);
                assert_relative_eq!(w.depth, 0.1, epsilon = 1e-9);
                assert_relative_eq!(w.direction.y, -1.0, epsilon = 1e-9);
            }

            let fa: Vector3<f64> = info.sides[0].contributing().fold(Vector3::zero(), |s, i| s + i.force);
            let fb: Vector3<f64> = info.sides[1].contributing().fold(Vector3::zero(), |s, i| s + i.force);
            assert_relative_eq!(fa.y, 0.15, epsilon = 1e-9);
            assert_relative_eq!(fb.y, -0.15, epsilon = 1e-9);
            assert_relative_eq!(fa.x, 0.0, epsilon = 1e-9);
            assert_relative_eq!(fa.z, 0.0, epsilon = 1e-9);
            assert_relative_eq!(net_force(&info).magnitude(), 0.0, epsilon = 1e-12);
        }

        #[test]
        fn test_write_back() {
            let a = TriSurface::from_arrays(
                &[v(0.0, -0.3, 0.0), v(0.5, 0.7, 0.0), v(-0.5, 0.7, 0.0)],
                &[[0, 1, 2]],
            ).unwrap();
            let b = TriSurface::from_arrays(
                &[v(-2.0, 0.0, -1.0), v(0.0, 0.0, 2.0), v(2.0, 0.0, -1.0)],
                &[[0, 1, 2]],
            ).unwrap();
            let info = detect(&a, &b);
            let mut ba = Boundary::from_surface(a);
            let mut bb = Boundary::from_surface(b);
            bb.set_response(false);
            let written = info.apply([&mut ba, &mut bb]);
            assert_eq!(written, 1);
            let c = ba.condition(0);
            assert_eq!(c.kind, BoundaryType::Dirichlet);
            assert_relative_eq!(c.value.y, -0.15, epsilon = 1e-9);
            assert_eq!(ba.condition(1).kind, BoundaryType::Neumann);
            assert_eq!(bb.condition(0).kind, BoundaryType::Neumann);
        }

        #[test]
        fn test_overlapping_boxes() {
            // `b` is narrower than `a` and enters its +x face by 0.3.
            let a = cuboid(v(0.0, 0.0, 0.0), v(1.0, 1.0, 1.0));
            let b = cuboid(v(0.7, 0.2, 0.3), v(1.7, 0.7, 0.8));
            let info = detect(&a, &b);
            assert!(!info.is_empty());

            for (i, w) in info.sides[1].vertices.iter().enumerate() {
                if i & 1 == 0 {
                    // x = 0.7 corners are inside `a`.
                    assert!(w.state.has_depth());
                    assert!(!w.propagated);
                    assert_relative_eq!(w.depth, 0.3, epsilon = 1e-9);
                    assert_relative_eq!(w.direction.x, 1.0, epsilon = 1e-9);
                } else {
                    assert!(!w.state.contributes());
                }
            }

            for side in info.sides.iter() {
                for w in side.contributing() {
                    if w.state.has_depth() && !w.propagated {
                        assert!(w.depth >= 0.0);
                    }
                }
            }
            assert_relative_eq!(net_force(&info).magnitude(), 0.0, epsilon = 1e-12);
        }

        #[test]
        fn test_reset_reuses_record() {
            let a = cuboid(v(0.0, 0.0, 0.0), v(1.0, 1.0, 1.0));
            let b = cuboid(v(0.7, 0.2, 0.3), v(1.7, 0.7, 0.8));
            let mut info = detect(&a, &b);
            assert!(info.fits([&a, &b]));
            info.reset();
            assert!(info.is_empty());
            for side in info.sides.iter() {
                assert_eq!(side.contributing().count(), 0);
                assert!(side.vertices.iter().all(|w| w.state == VertexState::Unknown && w.samples.is_empty()));
            }
        }
    }
}
