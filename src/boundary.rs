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

use std::convert::TryFrom;

use cgmath::{Vector3, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geom::Real;
use crate::mesh::TriSurface;

/// How a boundary node is constrained.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryType {
    /// Traction specified; `value` is added as a nodal force.
    Neumann = 0,
    /// Position pinned to `value`.
    Dirichlet = 1,
    /// Displacement along `value2` pinned relative to `value`; tangential
    /// motion free.
    Mixed = 2,
}

impl TryFrom<i32> for BoundaryType {
    type Error = Error;

    fn try_from(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(BoundaryType::Neumann),
            1 => Ok(BoundaryType::Dirichlet),
            2 => Ok(BoundaryType::Mixed),
            other => Err(Error::UnknownBoundaryType(other)),
        }
    }
}

/// One boundary condition record.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCondition {
    pub kind: BoundaryType,
    pub value: Vector3<Real>,
    pub scalar: Real,
    pub value2: Vector3<Real>,
}

impl Default for BoundaryCondition {
    fn default() -> Self {
        BoundaryCondition::free()
    }
}

impl BoundaryCondition {
    /// A Neumann condition with no load.
    pub fn free() -> Self {
        BoundaryCondition {
            kind: BoundaryType::Neumann,
            value: Vector3::zero(),
            scalar: 0.0,
            value2: Vector3::zero(),
        }
    }

    pub fn dirichlet(position: Vector3<Real>) -> Self {
        BoundaryCondition {
            kind: BoundaryType::Dirichlet,
            value: position,
            ..BoundaryCondition::free()
        }
    }

    pub fn neumann(force: Vector3<Real>) -> Self {
        BoundaryCondition {
            kind: BoundaryType::Neumann,
            value: force,
            ..BoundaryCondition::free()
        }
    }

    pub fn mixed(position: Vector3<Real>, normal: Vector3<Real>) -> Self {
        BoundaryCondition {
            kind: BoundaryType::Mixed,
            value: position,
            value2: normal,
            ..BoundaryCondition::free()
        }
    }
}

/// Per-node boundary condition slots.
pub trait HasBoundaryConditions {
    fn num_conditions(&self) -> usize;

    fn condition(&self, index: usize) -> &BoundaryCondition;

    fn set(
        &mut self,
        index: usize,
        kind: BoundaryType,
        value: Vector3<Real>,
        scalar: Real,
        value2: Vector3<Real>,
    );

    /// Drops every condition written since the last reset and restores the
    /// configured ones.
    fn reset_conditions(&mut self);
}

/// Whether a surface accepts corrective displacements from collisions.
pub trait HasCollisionResponse {
    fn response(&self) -> bool;
}

/// A collision-enabled surface with one boundary condition record per
/// vertex. `global_id` maps surface vertices to nodes of the owning object.
#[derive(Clone, Debug)]
pub struct Boundary {
    pub surface: TriSurface,
    global_id: Vec<usize>,
    base: Vec<BoundaryCondition>,
    conditions: Vec<BoundaryCondition>,
    response: bool,
}

impl Boundary {
    pub fn new(surface: TriSurface, global_id: Vec<usize>) -> Result<Self> {
        if global_id.len() != surface.num_verts() {
            return Err(Error::mismatched(format!(
                "{} global ids for {} boundary vertices",
                global_id.len(),
                surface.num_verts()
            )));
        }
        let n = global_id.len();
        Ok(Boundary {
            surface,
            global_id,
            base: vec![BoundaryCondition::free(); n],
            conditions: vec![BoundaryCondition::free(); n],
            response: true,
        })
    }

    /// A boundary whose vertices are their own nodes, as for fixed geometry.
    pub fn from_surface(surface: TriSurface) -> Self {
        let n = surface.num_verts();
        Boundary {
            surface,
            global_id: (0..n).collect(),
            base: vec![BoundaryCondition::free(); n],
            conditions: vec![BoundaryCondition::free(); n],
            response: true,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.global_id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.global_id.is_empty()
    }

    #[inline]
    pub fn global_id(&self, index: usize) -> usize {
        self.global_id[index]
    }

    pub fn global_ids(&self) -> &[usize] {
        &self.global_id
    }

    /// Boundary-local index of a global node, if it lies on the surface.
    pub fn local_index(&self, node: usize) -> Option<usize> {
        self.global_id.iter().position(|&g| g == node)
    }

    pub fn set_response(&mut self, response: bool) {
        self.response = response;
    }

    /// Configures a condition that survives `reset_conditions`.
    pub fn set_base(&mut self, index: usize, condition: BoundaryCondition) -> Result<()> {
        if index >= self.len() {
            return Err(Error::out_of_range("boundary vertex", index, self.len()));
        }
        self.base[index] = condition;
        self.conditions[index] = condition;
        Ok(())
    }

    pub fn conditions(&self) -> &[BoundaryCondition] {
        &self.conditions
    }

    /// Copies node positions of the owning object onto the surface and
    /// refreshes normals and bounds.
    pub fn sync_positions(&mut self, node_positions: &[Vector3<Real>]) {
        for (vert, &g) in self.surface.verts.iter_mut().zip(self.global_id.iter()) {
            vert.p = node_positions[g];
        }
        self.surface.update_normals();
        self.surface.update_bounds();
    }
}

impl HasBoundaryConditions for Boundary {
    fn num_conditions(&self) -> usize {
        self.conditions.len()
    }

    fn condition(&self, index: usize) -> &BoundaryCondition {
        &self.conditions[index]
    }

    fn set(
        &mut self,
        index: usize,
        kind: BoundaryType,
        value: Vector3<Real>,
        scalar: Real,
        value2: Vector3<Real>,
    ) {
        self.conditions[index] = BoundaryCondition {
            kind,
            value,
            scalar,
            value2,
        };
    }

    fn reset_conditions(&mut self) {
        self.conditions.copy_from_slice(&self.base);
    }
}

impl HasCollisionResponse for Boundary {
    fn response(&self) -> bool {
        self.response
    }
}
