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

//! Deformable body simulation with penetration-depth collision response.
//!
//! # Overview
//!
//! A [`Simulation`] owns deformable objects ([`FemObject`], linear tetrahedral
//! finite elements advanced by an explicit [`IntegratorKind`]) and fixed
//! collision geometry. Every step:
//!
//! 1. Each deformable object is integrated. Boundary conditions on its
//!    surface nodes pin, project or load them.
//! 2. The surfaces of all objects are tested pairwise: an AABB tree per
//!    surface yields candidate triangle pairs, which are checked exactly by
//!    [`tri_tri_intersect`].
//! 3. For each colliding pair a [`PDepthCollisionInfo`] classifies the
//!    vertices of both surfaces, floods the classification through the
//!    penetrating region and computes a penetration depth and direction per
//!    vertex. The corrections of the two sides are balanced and written back
//!    as Dirichlet conditions, which the next integration honours.
//!
//! Surfaces can be handed to another thread with [`snapshot::channel`], and
//! [`FemObject::haptic_model`] linearizes an object around a surface node for
//! a high rate force feedback loop.

pub extern crate cgmath;

mod error;
pub use error::{Error, Result};

mod geom;
pub use geom::*;

mod linalg;
pub use linalg::*;

mod bounds;
pub use bounds::*;

mod bvh;
pub use bvh::*;

mod mesh;
pub use mesh::*;

mod tritri;
pub use tritri::*;

mod boundary;
pub use boundary::*;

mod pdepth;
pub use pdepth::*;

mod collision;
pub use collision::*;

mod integrator;
pub use integrator::*;

mod fem;
pub use fem::*;

mod haptic;
pub use haptic::*;

pub mod snapshot;

mod simulation;
pub use simulation::*;
