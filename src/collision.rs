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

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::boundary::{Boundary, HasBoundaryConditions};
use crate::bounds::{BoundedBy, AABB};
use crate::bvh::BVH;
use crate::geom::Real;
use crate::mesh::TriSurface;
use crate::pdepth::PDepthCollisionInfo;
use crate::tritri::{tri_tri_intersect, TriTriIntersection};

/// Padding added to every leaf box so that touching faces are reported.
pub const BOUND_MARGIN: Real = 1e-6;

/// Faces incident to each vertex of a surface.
#[derive(Clone, Debug, Default)]
pub struct FaceOwner {
    faces: Vec<SmallVec<[usize; 8]>>,
}

impl FaceOwner {
    pub fn build(surface: &TriSurface) -> Self {
        let mut faces = vec![SmallVec::new(); surface.num_verts()];
        for (f, face) in surface.faces.iter().enumerate() {
            for &v in &face.v {
                faces[v].push(f);
            }
        }
        for (v, owned) in faces.iter().enumerate() {
            if owned.is_empty() {
                warn!(vertex = v, "surface vertex has no incident faces");
            }
        }
        FaceOwner { faces }
    }

    #[inline]
    pub fn faces_of(&self, v: usize) -> &[usize] {
        &self.faces[v]
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// Which pairs of objects are tested against each other. Every pair of
/// distinct objects is tested unless disabled.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CollisionRule {
    disabled: HashSet<(usize, usize)>,
}

#[inline]
fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl CollisionRule {
    pub fn new() -> Self {
        CollisionRule::default()
    }

    pub fn enable(&mut self, a: usize, b: usize) {
        self.disabled.remove(&ordered(a, b));
    }

    pub fn disable(&mut self, a: usize, b: usize) {
        self.disabled.insert(ordered(a, b));
    }

    pub fn is_collision_test(&self, a: usize, b: usize) -> bool {
        a != b && !self.disabled.contains(&ordered(a, b))
    }
}

/// Candidate face pairs reported by one overlap test.
#[derive(Clone, Debug, Default)]
pub struct BoundingVolumeInfo {
    pub pairs: Vec<(usize, usize)>,
}

/// Broad phase for one boundary: a tree of padded face boxes plus the
/// vertex to face index used during resolution.
#[derive(Clone)]
pub struct AabbCollider {
    bvh: BVH<AABB, usize>,
    pub face_owner: FaceOwner,
    num_verts: usize,
    num_faces: usize,
}

fn face_bounds(surface: &TriSurface, f: usize) -> AABB {
    let b: AABB = surface.triangle(f).bounds();
    b + BOUND_MARGIN
}

impl AabbCollider {
    pub fn build(surface: &TriSurface) -> Self {
        let mut bvh = BVH::with_capacity(surface.num_faces());
        for f in 0..surface.num_faces() {
            bvh.insert(&face_bounds(surface, f), f);
        }
        AabbCollider {
            bvh,
            face_owner: FaceOwner::build(surface),
            num_verts: surface.num_verts(),
            num_faces: surface.num_faces(),
        }
    }

    /// Whether `surface` has the vertex and face counts this collider was
    /// built from.
    pub fn fits(&self, surface: &TriSurface) -> bool {
        self.num_verts == surface.num_verts() && self.num_faces == surface.num_faces()
    }

    /// Updates the boxes for moved vertices. The surface topology must be the
    /// one this collider was built from.
    pub fn refit(&mut self, surface: &TriSurface) {
        self.bvh.refit(|&f| face_bounds(surface, f));
    }

    pub fn bounds(&self) -> Option<AABB> {
        self.bvh.root_bounds()
    }

    /// Collects overlapping face pairs into `info`, or only the first one
    /// found when `first_contact_only` is set.
    pub fn overlapping_test(
        &self,
        other: &AabbCollider,
        info: &mut BoundingVolumeInfo,
        first_contact_only: bool,
    ) -> bool {
        info.pairs.clear();
        self.bvh
            .overlaps_with(&other.bvh, first_contact_only, |&a, &b| info.pairs.push((a, b)))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Stop the broad phase at the first candidate pair.
    pub first_contact_only: bool,
    /// Refit the trees between steps instead of rebuilding them.
    pub refit: bool,
}

/// Runs detection and response over a set of boundaries, keeping one
/// collision record per colliding pair across steps.
pub struct CollisionSystem {
    pub config: CollisionConfig,
    colliders: Vec<AabbCollider>,
    infos: HashMap<(usize, usize), PDepthCollisionInfo>,
    candidates: BoundingVolumeInfo,
    hits: Vec<((usize, usize), TriTriIntersection)>,
}

impl CollisionSystem {
    pub fn new(config: CollisionConfig) -> Self {
        CollisionSystem {
            config,
            colliders: Vec::new(),
            infos: HashMap::new(),
            candidates: BoundingVolumeInfo::default(),
            hits: Vec::new(),
        }
    }

    /// The record for a pair that collided during the last step.
    pub fn info(&self, a: usize, b: usize) -> Option<&PDepthCollisionInfo> {
        self.infos.get(&(a, b))
    }

    fn update_colliders(&mut self, boundaries: &[&mut Boundary]) {
        if !self.config.refit {
            self.colliders = boundaries.iter().map(|b| AabbCollider::build(&b.surface)).collect();
            return;
        }
        self.colliders.truncate(boundaries.len());
        for (i, b) in boundaries.iter().enumerate() {
            match self.colliders.get_mut(i) {
                Some(collider) if collider.fits(&b.surface) => collider.refit(&b.surface),
                Some(collider) => {
                    debug!(index = i, "surface changed shape, rebuilding collider");
                    *collider = AabbCollider::build(&b.surface);
                }
                None => self.colliders.push(AabbCollider::build(&b.surface)),
            }
        }
    }

    /// One detection and response pass. Every boundary first gets its
    /// configured conditions back, then each enabled colliding pair writes
    /// its corrections. Returns the number of colliding pairs.
    pub fn step(&mut self, boundaries: &mut [&mut Boundary], rule: &CollisionRule) -> usize {
        for b in boundaries.iter_mut() {
            b.reset_conditions();
        }
        self.update_colliders(boundaries);

        let mut colliding = 0;
        for j in 1..boundaries.len() {
            let (lo, hi) = boundaries.split_at_mut(j);
            let b = &mut *hi[0];
            for (i, a) in lo.iter_mut().enumerate() {
                if !rule.is_collision_test(i, j) {
                    continue;
                }
                let (ca, cb) = (&self.colliders[i], &self.colliders[j]);
                if !ca.overlapping_test(cb, &mut self.candidates, self.config.first_contact_only) {
                    self.infos.remove(&(i, j));
                    continue;
                }

                self.hits.clear();
                for &(fa, fb) in &self.candidates.pairs {
                    if let Some(hit) = tri_tri_intersect(&a.surface.triangle(fa), &b.surface.triangle(fb)) {
                        self.hits.push(((fa, fb), hit));
                    }
                }
                if self.hits.is_empty() {
                    self.infos.remove(&(i, j));
                    continue;
                }

                let surfaces = [&a.surface, &b.surface];
                let info = self
                    .infos
                    .entry((i, j))
                    .or_insert_with(|| PDepthCollisionInfo::new(surfaces));
                if info.fits(surfaces) {
                    info.reset();
                } else {
                    *info = PDepthCollisionInfo::new(surfaces);
                }
                for (faces, hit) in &self.hits {
                    info.add_intersection(surfaces, *faces, hit);
                }
                info.resolve(surfaces, [&ca.face_owner, &cb.face_owner]);
                let written = info.apply([&mut **a, &mut *b]);
                debug!(
                    first = i,
                    second = j,
                    candidates = self.candidates.pairs.len(),
                    intersections = self.hits.len(),
                    corrected = written,
                    "collision pair resolved"
                );
                colliding += 1;
            }
        }
        colliding
    }
}

#[cfg(test)]
mod tests {
    mod rules {
        use crate::collision::CollisionRule;

        #[test]
        fn test_toggle() {
            let mut rule = CollisionRule::new();
            assert!(rule.is_collision_test(0, 1));
            assert!(!rule.is_collision_test(2, 2));
            rule.disable(3, 1);
            assert!(!rule.is_collision_test(1, 3));
            assert!(!rule.is_collision_test(3, 1));
            assert!(rule.is_collision_test(1, 2));
            rule.enable(1, 3);
            assert!(rule.is_collision_test(3, 1));
        }
    }

    mod colliders {
        use cgmath::Vector3;
        use crate::collision::{AabbCollider, BoundingVolumeInfo, FaceOwner};
        use crate::mesh::TriSurface;

        fn strip(offset: f64) -> TriSurface {
            let pts: Vec<_> = (0..6)
                .map(|i| Vector3::new((i / 2) as f64 + offset, (i % 2) as f64, 0.0))
                .collect();
            TriSurface::from_arrays(&pts, &[[0, 2, 1], [1, 2, 3], [2, 4, 3], [3, 4, 5]]).unwrap()
        }

        #[test]
        fn test_face_owner() {
            let owner = FaceOwner::build(&strip(0.0));
            assert_eq!(owner.len(), 6);
            assert_eq!(owner.faces_of(0), &[0]);
            assert_eq!(owner.faces_of(2), &[0, 1, 2]);
            assert_eq!(owner.faces_of(5), &[3]);
        }

        #[test]
        fn test_overlapping_pairs() {
            let a = AabbCollider::build(&strip(0.0));
            let b = AabbCollider::build(&strip(1.5));
            let mut info = BoundingVolumeInfo::default();
            assert!(a.overlapping_test(&b, &mut info, false));
            // Faces of `a` spanning x in [1, 2] meet faces of `b` in [1.5, 2.5].
            let mut pairs = info.pairs.clone();
            pairs.sort();
            assert!(pairs.contains(&(2, 0)));
            assert!(pairs.iter().all(|&(fa, _)| fa >= 2));

            assert!(a.overlapping_test(&b, &mut info, true));
            assert_eq!(info.pairs.len(), 1);

            let far = AabbCollider::build(&strip(10.0));
            assert!(!a.overlapping_test(&far, &mut info, false));
            assert!(info.pairs.is_empty());
        }

        #[test]
        fn test_refit_follows_vertices() {
            let mut surface = strip(0.0);
            let mut collider = AabbCollider::build(&surface);
            for v in surface.verts.iter_mut() {
                v.p.x += 10.0;
            }
            collider.refit(&surface);
            let bounds = collider.bounds().unwrap();
            assert!(bounds.min().x > 9.9);
            let far = AabbCollider::build(&strip(10.0));
            let mut info = BoundingVolumeInfo::default();
            assert!(collider.overlapping_test(&far, &mut info, false));
        }
    }

    mod soundness {
        use std::collections::HashSet;

        use cgmath::Vector3;
        use proptest::prelude::*;
        use crate::collision::{AabbCollider, BoundingVolumeInfo};
        use crate::mesh::TriSurface;
        use crate::tritri::tri_tri_intersect;

        fn soup() -> impl Strategy<Value = TriSurface> {
            prop::collection::vec(
                prop::array::uniform3((-1.0f64..1.0, -1.0f64..1.0, -1.0f64..1.0)),
                1..12,
            )
            .prop_map(|tris| {
                let mut pts = Vec::new();
                let mut faces = Vec::new();
                for t in tris {
                    let base = pts.len();
                    for &(x, y, z) in t.iter() {
                        pts.push(Vector3::new(x, y, z));
                    }
                    faces.push([base, base + 1, base + 2]);
                }
                TriSurface::from_arrays(&pts, &faces).unwrap()
            })
        }

        proptest! {
            #[test]
            fn test_no_false_negatives(a in soup(), b in soup()) {
                let (ca, cb) = (AabbCollider::build(&a), AabbCollider::build(&b));
                let mut info = BoundingVolumeInfo::default();
                ca.overlapping_test(&cb, &mut info, false);
                let candidates: HashSet<_> = info.pairs.iter().cloned().collect();
                for i in 0..a.num_faces() {
                    for j in 0..b.num_faces() {
                        if tri_tri_intersect(&a.triangle(i), &b.triangle(j)).is_some() {
                            prop_assert!(candidates.contains(&(i, j)));
                        }
                    }
                }
            }
        }
    }

    mod system {
        use cgmath::Vector3;
        use crate::boundary::{Boundary, BoundaryCondition, BoundaryType, HasBoundaryConditions};
        use crate::collision::{CollisionConfig, CollisionRule, CollisionSystem};
        use crate::mesh::TriSurface;

        fn pair() -> (Boundary, Boundary) {
            let a = TriSurface::from_arrays(
                &[
                    Vector3::new(0.0, -0.3, 0.0),
                    Vector3::new(0.5, 0.7, 0.0),
                    Vector3::new(-0.5, 0.7, 0.0),
                ],
                &[[0, 1, 2]],
            )
            .unwrap();
            let b = TriSurface::from_arrays(
                &[
                    Vector3::new(-2.0, 0.0, -1.0),
                    Vector3::new(0.0, 0.0, 2.0),
                    Vector3::new(2.0, 0.0, -1.0),
                ],
                &[[0, 1, 2]],
            )
            .unwrap();
            (Boundary::from_surface(a), Boundary::from_surface(b))
        }

        #[test]
        fn test_step_writes_corrections() {
            let (mut a, mut b) = pair();
            a.set_base(1, BoundaryCondition::dirichlet(Vector3::new(0.5, 0.7, 0.0))).unwrap();
            let mut system = CollisionSystem::new(CollisionConfig::default());
            let rule = CollisionRule::new();

            assert_eq!(system.step(&mut [&mut a, &mut b], &rule), 1);
            assert!(system.info(0, 1).is_some());
            assert_eq!(a.condition(0).kind, BoundaryType::Dirichlet);
            assert!((a.condition(0).value.y + 0.15).abs() < 1e-9);
            assert_eq!(b.condition(1).kind, BoundaryType::Dirichlet);

            // Moving `b` away clears the pair and restores configured conditions.
            for v in b.surface.verts.iter_mut() {
                v.p.y -= 5.0;
            }
            assert_eq!(system.step(&mut [&mut a, &mut b], &rule), 0);
            assert!(system.info(0, 1).is_none());
            assert_eq!(a.condition(0).kind, BoundaryType::Neumann);
            assert_eq!(a.condition(1).kind, BoundaryType::Dirichlet);
            assert_eq!(b.condition(1).kind, BoundaryType::Neumann);
        }

        #[test]
        fn test_disabled_pair() {
            let (mut a, mut b) = pair();
            let mut system = CollisionSystem::new(CollisionConfig { refit: true, ..Default::default() });
            let mut rule = CollisionRule::new();
            rule.disable(0, 1);
            assert_eq!(system.step(&mut [&mut a, &mut b], &rule), 0);
            assert_eq!(a.condition(0).kind, BoundaryType::Neumann);

            rule.enable(0, 1);
            assert_eq!(system.step(&mut [&mut a, &mut b], &rule), 1);
        }

        /// Square in the plane `y = 0` split into two upward facing triangles.
        fn square(dy: f64) -> Boundary {
            let s = TriSurface::from_arrays(
                &[
                    Vector3::new(-2.0, dy, -1.0),
                    Vector3::new(2.0, dy, -1.0),
                    Vector3::new(2.0, dy, 3.0),
                    Vector3::new(-2.0, dy, 3.0),
                ],
                &[[0, 2, 1], [0, 3, 2]],
            )
            .unwrap();
            Boundary::from_surface(s)
        }

        #[test]
        fn test_refit_rebuilds_changed_surface() {
            let mut system = CollisionSystem::new(CollisionConfig { refit: true, ..Default::default() });
            let rule = CollisionRule::new();
            let mut ground = square(0.0);
            let mut other = square(5.0);
            assert_eq!(system.step(&mut [&mut ground, &mut other], &rule), 0);

            // Same slot, fewer faces and vertices.
            let (mut tri, _) = pair();
            assert_eq!(system.step(&mut [&mut ground, &mut tri], &rule), 1);
            assert_eq!(tri.condition(0).kind, BoundaryType::Dirichlet);
            assert!(tri.condition(0).value.y > -0.3);

            // Back to the original shape, moved far away.
            assert_eq!(system.step(&mut [&mut ground, &mut other], &rule), 0);
            assert!(system.info(0, 1).is_none());
        }
    }
}
