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

//! Linear tetrahedral finite elements and the deformable object built from
//! them.

use cgmath::{InnerSpace, Matrix, Matrix3, SquareMatrix, Vector3, Zero};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::boundary::{Boundary, BoundaryCondition, BoundaryType};
use crate::error::{Error, Result};
use crate::geom::{normalize_or_zero, Real, Transform};
use crate::integrator::{Integrable, State};
use crate::linalg::CrsMatrix;
use crate::mesh::{TetVolume, TriSurface};

/// Reference elements with `|det| <= DEGENERATE_VOLUME * L^3` are rejected,
/// `L` being the longest edge at the first node.
const DEGENERATE_VOLUME: Real = 1e-12;

/// Relative step for finite difference tangents.
const TANGENT_STEP: Real = 1e-6;

const POLAR_ITERATIONS: usize = 32;

/// Strain measure used by the constitutive law.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrainModel {
    /// Green-Lagrange strain (St. Venant-Kirchhoff).
    #[default]
    Green,
    /// Small strain.
    Linear,
    /// Small strain in a frame rotating with the element.
    Corotational,
}

/// Elastic Lamé pair `mu`/`lambda` and viscous pair `nu`/`phi`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub density: Real,
    pub mu: Real,
    pub lambda: Real,
    pub nu: Real,
    pub phi: Real,
    pub strain: StrainModel,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            density: 1000.0,
            mu: 1e4,
            lambda: 1e4,
            nu: 0.0,
            phi: 0.0,
            strain: StrainModel::Green,
        }
    }
}

impl Material {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("density", self.density),
            ("mu", self.mu),
            ("lambda", self.lambda),
            ("nu", self.nu),
            ("phi", self.phi),
        ];
        for &(name, value) in fields.iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_material(format!("{} = {}", name, value)));
            }
        }
        if self.density == 0.0 {
            return Err(Error::invalid_material("density must be positive"));
        }
        if self.mu == 0.0 {
            return Err(Error::invalid_material("mu must be positive"));
        }
        Ok(())
    }

    /// Stress for a strain and strain rate.
    pub fn stress(&self, strain: &Matrix3<Real>, rate: &Matrix3<Real>) -> Matrix3<Real> {
        Matrix3::identity() * (self.lambda * strain.trace() + self.phi * rate.trace())
            + *strain * (2.0 * self.mu)
            + *rate * (2.0 * self.nu)
    }
}

/// `a * b^T`
#[inline]
fn outer(a: Vector3<Real>, b: Vector3<Real>) -> Matrix3<Real> {
    Matrix3::from_cols(a * b.x, a * b.y, a * b.z)
}

#[inline]
fn symmetric(m: Matrix3<Real>) -> Matrix3<Real> {
    (m + m.transpose()) * 0.5
}

fn frobenius2(m: &Matrix3<Real>) -> Real {
    m.x.magnitude2() + m.y.magnitude2() + m.z.magnitude2()
}

/// Rotation factor of the polar decomposition `F = R S`, by the averaged
/// inverse transpose iteration. Singular gradients give the identity.
pub fn polar_rotation(f: &Matrix3<Real>) -> Matrix3<Real> {
    let mut r = *f;
    for _ in 0..POLAR_ITERATIONS {
        let inv_t = match r.invert() {
            Some(inv) => inv.transpose(),
            None => return Matrix3::identity(),
        };
        let next = (r + inv_t) * 0.5;
        let delta = frobenius2(&(next - r));
        r = next;
        if delta < 1e-24 {
            break;
        }
    }
    r
}

/// A linear tetrahedron with shape function gradients taken from its
/// reference configuration.
#[derive(Clone, Debug)]
pub struct TetElement {
    pub nodes: [usize; 4],
    pub volume: Real,
    beta: [Vector3<Real>; 4],
}

impl TetElement {
    pub fn new(index: usize, nodes: [usize; 4], rest: [Vector3<Real>; 4]) -> Result<Self> {
        let (e1, e2, e3) = (rest[1] - rest[0], rest[2] - rest[0], rest[3] - rest[0]);
        let dm = Matrix3::from_cols(e1, e2, e3);
        let det = dm.determinant();
        let l = e1.magnitude().max(e2.magnitude()).max(e3.magnitude());
        if l == 0.0 || det.abs() <= DEGENERATE_VOLUME * l * l * l {
            return Err(Error::DegenerateElement(index));
        }
        let inv = dm.invert().ok_or(Error::DegenerateElement(index))?;
        let (b1, b2, b3) = (inv.row(0), inv.row(1), inv.row(2));
        Ok(TetElement {
            nodes,
            volume: det.abs() / 6.0,
            beta: [-(b1 + b2 + b3), b1, b2, b3],
        })
    }

    /// Shape function gradients, one per node.
    pub fn beta(&self) -> &[Vector3<Real>; 4] {
        &self.beta
    }

    fn gather(&self, values: &[Vector3<Real>]) -> [Vector3<Real>; 4] {
        [
            values[self.nodes[0]],
            values[self.nodes[1]],
            values[self.nodes[2]],
            values[self.nodes[3]],
        ]
    }

    /// `sum_i x_i beta_i^T`; the deformation gradient for positions, its
    /// rate for velocities.
    pub fn gradient(&self, x: &[Vector3<Real>; 4]) -> Matrix3<Real> {
        (0..4).fold(Matrix3::zero(), |acc, i| acc + outer(x[i], self.beta[i]))
    }

    /// Nodal forces for local positions and velocities.
    pub fn local_forces(
        &self,
        material: &Material,
        dom_stress: &Matrix3<Real>,
        x: &[Vector3<Real>; 4],
        v: &[Vector3<Real>; 4],
    ) -> [Vector3<Real>; 4] {
        let f = self.gradient(x);
        let fdot = self.gradient(v);
        let id = Matrix3::identity();
        let (map, strain, rate) = match material.strain {
            StrainModel::Green => {
                let ft = f.transpose();
                let strain = (ft * f - id) * 0.5;
                let rate = symmetric(ft * fdot);
                (f, strain, rate)
            }
            StrainModel::Linear => (id, symmetric(f) - id, symmetric(fdot)),
            StrainModel::Corotational => {
                let r = polar_rotation(&f);
                let rt = r.transpose();
                (r, symmetric(rt * f) - id, symmetric(rt * fdot))
            }
        };
        let stress = material.stress(&strain, &rate) + *dom_stress;
        let p = map * stress * self.volume;
        [
            -(p * self.beta[0]),
            -(p * self.beta[1]),
            -(p * self.beta[2]),
            -(p * self.beta[3]),
        ]
    }

    /// Adds this element's forces into `out`.
    pub fn add_forces(
        &self,
        material: &Material,
        dom_stress: &Matrix3<Real>,
        pos: &[Vector3<Real>],
        vel: &[Vector3<Real>],
        out: &mut [Vector3<Real>],
    ) {
        let f = self.local_forces(material, dom_stress, &self.gather(pos), &self.gather(vel));
        for (i, &n) in self.nodes.iter().enumerate() {
            out[n] += f[i];
        }
    }

    /// Stiffness `-df_i/dx_j` (or damping `-df_i/dv_j` when
    /// `wrt_velocity`) by central differences, as 3x3 blocks.
    pub fn tangent(
        &self,
        material: &Material,
        dom_stress: &Matrix3<Real>,
        pos: &[Vector3<Real>],
        vel: &[Vector3<Real>],
        wrt_velocity: bool,
    ) -> [[Matrix3<Real>; 4]; 4] {
        let x0 = self.gather(pos);
        let v0 = self.gather(vel);
        let step = TANGENT_STEP * (6.0 * self.volume).cbrt();
        let mut blocks = [[Matrix3::zero(); 4]; 4];
        for j in 0..4 {
            for c in 0..3 {
                let (mut xp, mut xm, mut vp, mut vm) = (x0, x0, v0, v0);
                if wrt_velocity {
                    vp[j][c] += step;
                    vm[j][c] -= step;
                } else {
                    xp[j][c] += step;
                    xm[j][c] -= step;
                }
                let fp = self.local_forces(material, dom_stress, &xp, &vp);
                let fm = self.local_forces(material, dom_stress, &xm, &vm);
                for i in 0..4 {
                    blocks[i][j][c] = -(fp[i] - fm[i]) / (2.0 * step);
                }
            }
        }
        blocks
    }
}

/// The elements of one object with their material and any externally
/// imposed per-element stress.
#[derive(Clone, Debug)]
pub struct FemDomain {
    pub material: Material,
    pub elements: Vec<TetElement>,
    dom_stress: Vec<Matrix3<Real>>,
}

impl FemDomain {
    pub fn new(material: Material, elements: Vec<TetElement>) -> Self {
        let n = elements.len();
        FemDomain {
            material,
            elements,
            dom_stress: vec![Matrix3::zero(); n],
        }
    }

    pub fn dom_stress(&self, element: usize) -> &Matrix3<Real> {
        &self.dom_stress[element]
    }

    /// Superimposes `stress` on the constitutive stress of `element`.
    pub fn set_dom_stress(&mut self, element: usize, stress: Matrix3<Real>) -> Result<()> {
        let len = self.dom_stress.len();
        let slot = self
            .dom_stress
            .get_mut(element)
            .ok_or_else(|| Error::out_of_range("element", element, len))?;
        *slot = stress;
        Ok(())
    }

    pub fn clear_dom_stress(&mut self) {
        for s in self.dom_stress.iter_mut() {
            *s = Matrix3::zero();
        }
    }

    pub fn add_forces(&self, pos: &[Vector3<Real>], vel: &[Vector3<Real>], out: &mut [Vector3<Real>]) {
        for (e, stress) in self.elements.iter().zip(self.dom_stress.iter()) {
            e.add_forces(&self.material, stress, pos, vel, out);
        }
    }

    fn tangent(&self, element: usize, pos: &[Vector3<Real>], vel: &[Vector3<Real>], wrt_velocity: bool) -> [[Matrix3<Real>; 4]; 4] {
        self.elements[element].tangent(&self.material, &self.dom_stress[element], pos, vel, wrt_velocity)
    }
}

/// Raw mesh input for a deformable object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadData {
    pub nodes: Vec<Vector3<Real>>,
    pub tets: Vec<[usize; 4]>,
    /// Boundary triangles by node index; extracted from the tetrahedra when
    /// empty.
    pub faces: Vec<[usize; 3]>,
    /// Nodes pinned at their reference position.
    pub fixed: Vec<usize>,
}

/// A deformable body: reference mesh, elements, lumped masses, current state
/// and its collision boundary.
#[derive(Clone, Debug)]
pub struct FemObject {
    name: String,
    pub volume: TetVolume,
    pub domain: FemDomain,
    pub boundary: Boundary,
    mass: Vec<Real>,
    state: State,
    gravity: Vector3<Real>,
    force: Vec<Vector3<Real>>,
}

/// Boundary surface over the nodes `faces` reference, numbered in order of
/// first appearance.
fn extract_boundary(positions: &[Vector3<Real>], faces: &[[usize; 3]]) -> Result<Boundary> {
    let mut local = vec![usize::MAX; positions.len()];
    let mut global_id = Vec::new();
    let mut local_faces = Vec::with_capacity(faces.len());
    for face in faces {
        let mut lf = [0; 3];
        for (slot, &n) in face.iter().enumerate() {
            if n >= positions.len() {
                return Err(Error::out_of_range("node", n, positions.len()));
            }
            if local[n] == usize::MAX {
                local[n] = global_id.len();
                global_id.push(n);
            }
            lf[slot] = local[n];
        }
        local_faces.push(lf);
    }
    let local_positions: Vec<_> = global_id.iter().map(|&g| positions[g]).collect();
    let surface = TriSurface::from_arrays(&local_positions, &local_faces)?;
    Boundary::new(surface, global_id)
}

fn accumulate_forces(
    domain: &FemDomain,
    boundary: &Boundary,
    mass: &[Real],
    gravity: Vector3<Real>,
    state: &State,
    out: &mut [Vector3<Real>],
) {
    for (f, &m) in out.iter_mut().zip(mass.iter()) {
        *f = gravity * m;
    }
    domain.add_forces(&state.pos, &state.vel, out);
    for (k, c) in boundary.conditions().iter().enumerate() {
        if c.kind == BoundaryType::Neumann {
            out[boundary.global_id(k)] += c.value;
        }
    }
}

impl FemObject {
    pub fn from_load_data(
        name: &str,
        data: &LoadData,
        material: Material,
        transform: &Transform,
    ) -> Result<Self> {
        material.validate()?;
        if data.nodes.is_empty() || data.tets.is_empty() {
            return Err(Error::mismatched(format!(
                "{}: {} nodes and {} tetrahedra",
                name,
                data.nodes.len(),
                data.tets.len()
            )));
        }

        let mut positions = data.nodes.clone();
        transform.apply_all(&mut positions);
        let volume = TetVolume::new(&positions, &data.tets)?;

        let mut elements = Vec::with_capacity(data.tets.len());
        let mut mass = vec![0.0; positions.len()];
        for (i, tet) in data.tets.iter().enumerate() {
            let element = TetElement::new(i, *tet, volume.tet_positions(i))?;
            let share = material.density * element.volume / 4.0;
            for &n in tet {
                mass[n] += share;
            }
            elements.push(element);
        }
        if let Some(isolated) = volume.verts.iter().position(|v| v.elements.is_empty()) {
            return Err(Error::IsolatedNode(isolated));
        }

        let faces = if data.faces.is_empty() {
            volume.boundary_faces()
        } else {
            data.faces.clone()
        };
        let mut boundary = extract_boundary(&positions, &faces)?;
        for &n in &data.fixed {
            if n >= positions.len() {
                return Err(Error::out_of_range("node", n, positions.len()));
            }
            let k = boundary.local_index(n).ok_or(Error::NotBoundaryNode(n))?;
            boundary.set_base(k, BoundaryCondition::dirichlet(positions[n]))?;
        }

        info!(
            object = name,
            nodes = positions.len(),
            elements = elements.len(),
            boundary_vertices = boundary.len(),
            boundary_faces = faces.len(),
            fixed = data.fixed.len(),
            "deformable object loaded"
        );

        let n = positions.len();
        Ok(FemObject {
            name: name.to_string(),
            volume,
            domain: FemDomain::new(material, elements),
            boundary,
            mass,
            state: State {
                pos: positions,
                vel: vec![Vector3::zero(); n],
            },
            gravity: Vector3::zero(),
            force: vec![Vector3::zero(); n],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.mass.len()
    }

    pub fn mass(&self, node: usize) -> Real {
        self.mass[node]
    }

    pub fn masses(&self) -> &[Real] {
        &self.mass
    }

    pub fn positions(&self) -> &[Vector3<Real>] {
        &self.state.pos
    }

    pub fn velocities(&self) -> &[Vector3<Real>] {
        &self.state.vel
    }

    pub fn gravity(&self) -> Vector3<Real> {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vector3<Real>) {
        self.gravity = gravity;
    }

    /// Total nodal forces in the current state: elastic, viscous, gravity
    /// and Neumann loads.
    pub fn net_forces(&mut self) -> &[Vector3<Real>] {
        let FemObject {
            domain,
            boundary,
            mass,
            gravity,
            state,
            force,
            ..
        } = self;
        accumulate_forces(domain, boundary, mass, *gravity, state, force);
        force
    }

    fn check_node(&self, node: usize) -> Result<()> {
        if node >= self.num_nodes() {
            return Err(Error::out_of_range("node", node, self.num_nodes()));
        }
        Ok(())
    }

    /// Diagonal stiffness and damping blocks of `node` in the current state.
    pub fn node_tangents(&self, node: usize) -> Result<(Matrix3<Real>, Matrix3<Real>)> {
        self.check_node(node)?;
        let mut k = Matrix3::zero();
        let mut d = Matrix3::zero();
        for &e in &self.volume.verts[node].elements {
            let local = match self.domain.elements[e].nodes.iter().position(|&n| n == node) {
                Some(l) => l,
                None => continue,
            };
            k = k + self.domain.tangent(e, &self.state.pos, &self.state.vel, false)[local][local];
            d = d + self.domain.tangent(e, &self.state.pos, &self.state.vel, true)[local][local];
        }
        Ok((k, d))
    }

    /// Global stiffness `-df/dx` in the current state, `3n x 3n` with the
    /// components of node `i` at rows `3i..3i+3`.
    pub fn assemble_stiffness(&self) -> Result<CrsMatrix> {
        let n = self.num_nodes();
        let mut triplets = Vec::with_capacity(self.domain.elements.len() * 144);
        for (e, element) in self.domain.elements.iter().enumerate() {
            let blocks = self.domain.tangent(e, &self.state.pos, &self.state.vel, false);
            for (i, &ni) in element.nodes.iter().enumerate() {
                for (j, &nj) in element.nodes.iter().enumerate() {
                    let b = &blocks[i][j];
                    for c in 0..3 {
                        for r in 0..3 {
                            triplets.push((3 * ni + r, 3 * nj + c, b[c][r]));
                        }
                    }
                }
            }
        }
        CrsMatrix::from_triplets(3 * n, 3 * n, triplets)
    }
}

impl Integrable for FemObject {
    fn state(&self) -> State {
        self.state.clone()
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
        self.boundary.sync_positions(&self.state.pos);
    }

    fn deriv_state(&mut self, state: &State) -> State {
        accumulate_forces(
            &self.domain,
            &self.boundary,
            &self.mass,
            self.gravity,
            state,
            &mut self.force,
        );
        let mut deriv = State {
            pos: state.vel.clone(),
            vel: self
                .force
                .iter()
                .zip(self.mass.iter())
                .map(|(f, &m)| *f / m)
                .collect(),
        };
        for (k, c) in self.boundary.conditions().iter().enumerate() {
            let g = self.boundary.global_id(k);
            match c.kind {
                BoundaryType::Dirichlet => {
                    deriv.pos[g] = Vector3::zero();
                    deriv.vel[g] = Vector3::zero();
                }
                BoundaryType::Mixed => {
                    let n = normalize_or_zero(c.value2);
                    let (dp, dv) = (deriv.pos[g], deriv.vel[g]);
                    deriv.pos[g] -= n * n.dot(dp);
                    deriv.vel[g] -= n * n.dot(dv);
                }
                BoundaryType::Neumann => {}
            }
        }
        deriv
    }

    fn accum_state(&self, state: &mut State, deriv: &State, h: Real) {
        state.add_scaled(deriv, h);
        for (k, c) in self.boundary.conditions().iter().enumerate() {
            let g = self.boundary.global_id(k);
            match c.kind {
                BoundaryType::Dirichlet => state.pos[g] = c.value,
                BoundaryType::Mixed => {
                    let n = normalize_or_zero(c.value2);
                    let (p, v) = (state.pos[g], state.vel[g]);
                    state.pos[g] -= n * n.dot(p - c.value);
                    state.vel[g] -= n * n.dot(v);
                }
                BoundaryType::Neumann => {}
            }
        }
    }
}
