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

use cgmath::{Matrix3, SquareMatrix, Vector3};

use crate::error::{Error, Result};
use crate::fem::FemObject;
use crate::geom::Real;
use crate::linalg::{Matrix, Vector};

/// Linearization of a deformable object around one boundary node:
///
/// ```text
/// x' = A (x - state_bias) + B u
/// f  = C (x - state_bias) + D u + output_bias
/// ```
///
/// where `x` stacks the node's position and velocity, `u` is a force applied
/// at the node and `f` is the reaction force felt by the device.
#[derive(Clone, Debug)]
pub struct HapticModel {
    pub node: usize,
    pub a: Matrix,
    pub b: Matrix,
    pub c: Matrix,
    pub d: Matrix,
    pub state_bias: Vector,
    pub output_bias: Vector,
    /// Outward surface normal at the node.
    pub normal: Vector3<Real>,
    /// Pseudo-inverse of the node's stiffness block.
    pub compliance: Matrix,
}

impl HapticModel {
    pub fn derivative(&self, state: &Vector, input: &Vector) -> Result<Vector> {
        let dx = state.sub(&self.state_bias)?;
        self.a.mul_vector(&dx)?.add(&self.b.mul_vector(input)?)
    }

    pub fn output(&self, state: &Vector, input: &Vector) -> Result<Vector> {
        let dx = state.sub(&self.state_bias)?;
        self.c
            .mul_vector(&dx)?
            .add(&self.d.mul_vector(input)?)?
            .add(&self.output_bias)
    }
}

impl FemObject {
    /// Builds the haptic model of global node `node`, which must lie on the
    /// boundary, from the current state.
    pub fn haptic_model(&mut self, node: usize) -> Result<HapticModel> {
        let local = self
            .boundary
            .local_index(node)
            .ok_or(Error::NotBoundaryNode(node))?;
        let (k, damping) = self.node_tangents(node)?;
        let inv_m = 1.0 / self.mass(node);
        let id = Matrix3::identity();

        let mut a = Matrix::zeros(6, 6);
        a.set_block(0, 3, &id)?;
        a.set_block(3, 0, &(k * -inv_m))?;
        a.set_block(3, 3, &(damping * -inv_m))?;

        let mut b = Matrix::zeros(6, 3);
        b.set_block(3, 0, &(id * inv_m))?;

        let mut c = Matrix::zeros(3, 6);
        c.set_block(0, 0, &(-k))?;
        c.set_block(0, 3, &(-damping))?;

        let p = self.positions()[node];
        let v = self.velocities()[node];
        let state_bias = Vector::from_slice(&[p.x, p.y, p.z, v.x, v.y, v.z]);
        let output_bias = Vector::from_vector3(self.net_forces()[node]);
        let compliance = Matrix::from_matrix3(&k).pseudo_inverse()?;

        Ok(HapticModel {
            node,
            a,
            b,
            c,
            d: Matrix::zeros(3, 3),
            state_bias,
            output_bias,
            normal: self.boundary.surface.verts[local].n,
            compliance,
        })
    }
}

#[cfg(test)]
mod tests {
    mod models {
        use approx::assert_relative_eq;
        use cgmath::{InnerSpace, Vector3};
        use crate::error::Error;
        use crate::fem::{FemObject, LoadData, Material};
        use crate::geom::Transform;
        use crate::linalg::{Matrix, Vector};

        fn tet() -> FemObject {
            let data = LoadData {
                nodes: vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(1.0, 0.0, 0.0),
                    Vector3::new(0.0, 0.0, 1.0),
                    Vector3::new(0.0, 1.0, 0.0),
                ],
                tets: vec![[0, 1, 2, 3]],
                faces: Vec::new(),
                fixed: vec![0, 1, 2],
            };
            let material = Material {
                mu: 1e4,
                lambda: 1e4,
                nu: 2e3,
                phi: 2e3,
                ..Material::default()
            };
            FemObject::from_load_data("tet", &data, material, &Transform::default()).unwrap()
        }

        #[test]
        fn test_shapes_and_compliance() {
            let mut obj = tet();
            let model = obj.haptic_model(3).unwrap();
            assert_eq!(model.a.shape(), (6, 6));
            assert_eq!(model.b.shape(), (6, 3));
            assert_eq!(model.c.shape(), (3, 6));
            assert_eq!(model.d.shape(), (3, 3));
            assert_eq!(model.state_bias.len(), 6);
            assert_relative_eq!(model.normal.magnitude(), 1.0, epsilon = 1e-12);

            let k = Matrix::from_matrix3(&model.c.block3(0, 0).unwrap()).scale(-1.0);
            let prod = model.compliance.mul(&k).unwrap();
            let id = Matrix::identity(3);
            for i in 0..3 {
                for j in 0..3 {
                    assert_relative_eq!(prod[(i, j)], id[(i, j)], epsilon = 1e-6);
                }
            }
        }

        #[test]
        fn test_vertical_stiffness() {
            let mut obj = tet();
            let model = obj.haptic_model(3).unwrap();
            // Gravity is off and the object is at rest.
            for i in 0..3 {
                assert_relative_eq!(model.output_bias[i], 0.0, epsilon = 1e-9);
            }
            let mut pushed = model.state_bias.as_slice().to_vec();
            pushed[1] -= 1e-3;
            let f = model
                .output(&Vector::from_slice(&pushed), &Vector::zeros(3))
                .unwrap();
            // k_yy = V (lambda + 2 mu)
            assert_relative_eq!(f[1], 5.0, epsilon = 1e-3);
            assert_relative_eq!(f[0], 0.0, epsilon = 1e-6);

            let accel = model
                .derivative(&model.state_bias, &Vector::from_slice(&[0.0, 0.0, 1.0]))
                .unwrap();
            assert_relative_eq!(accel[5], 1.0 / obj.mass(3), epsilon = 1e-12);
            assert_relative_eq!(accel[0], 0.0, epsilon = 1e-12);
        }

        #[test]
        fn test_interior_node_rejected() {
            let data = LoadData {
                nodes: vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(1.0, 0.0, 0.0),
                    Vector3::new(0.0, 1.0, 0.0),
                    Vector3::new(0.0, 0.0, 1.0),
                    Vector3::new(0.2, 0.2, 0.2),
                ],
                tets: vec![[4, 1, 2, 3], [0, 4, 2, 3], [0, 1, 4, 3], [0, 1, 2, 4]],
                faces: Vec::new(),
                fixed: Vec::new(),
            };
            let mut obj = FemObject::from_load_data("split", &data, Material::default(), &Transform::default()).unwrap();
            assert!(matches!(obj.haptic_model(4), Err(Error::NotBoundaryNode(4))));
            assert!(obj.haptic_model(0).is_ok());
        }
    }
}
