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

use cgmath::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::boundary::Boundary;
use crate::collision::{CollisionConfig, CollisionRule, CollisionSystem};
use crate::error::{Error, Result};
use crate::fem::FemObject;
use crate::geom::Real;
use crate::integrator::IntegratorKind;
use crate::snapshot::{SurfaceSnapshot, Writer};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub time_step: Real,
    pub integrator: IntegratorKind,
    /// Applied to every deformable object as it is added.
    pub gravity: Vector3<Real>,
    pub collision: CollisionConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            time_step: 1e-3,
            integrator: IntegratorKind::Euler,
            gravity: Vector3::new(0.0, -9.8, 0.0),
            collision: CollisionConfig::default(),
        }
    }
}

/// A scene member. Fixed geometry takes part in collision detection but is
/// never integrated or corrected.
#[derive(Clone, Debug)]
pub enum SimObject {
    Deformable(FemObject),
    Fixed(Boundary),
}

impl SimObject {
    pub fn boundary(&self) -> &Boundary {
        match self {
            SimObject::Deformable(obj) => &obj.boundary,
            SimObject::Fixed(b) => b,
        }
    }

    fn boundary_mut(&mut self) -> &mut Boundary {
        match self {
            SimObject::Deformable(obj) => &mut obj.boundary,
            SimObject::Fixed(b) => b,
        }
    }

    pub fn as_deformable(&self) -> Option<&FemObject> {
        match self {
            SimObject::Deformable(obj) => Some(obj),
            SimObject::Fixed(_) => None,
        }
    }

    pub fn as_deformable_mut(&mut self) -> Option<&mut FemObject> {
        match self {
            SimObject::Deformable(obj) => Some(obj),
            SimObject::Fixed(_) => None,
        }
    }
}

/// Owns every object of a scene along with the collision state between them.
pub struct Simulation {
    config: SimulationConfig,
    objects: Vec<SimObject>,
    rule: CollisionRule,
    collision: CollisionSystem,
    time: Real,
    frame: u64,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if !(config.time_step.is_finite() && config.time_step > 0.0) {
            return Err(Error::InvalidConfig(format!("time step {}", config.time_step)));
        }
        Ok(Simulation {
            config,
            objects: Vec::new(),
            rule: CollisionRule::new(),
            collision: CollisionSystem::new(config.collision),
            time: 0.0,
            frame: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Adds an object and returns its index, which is also its id in the
    /// collision rule.
    pub fn add_object(&mut self, mut object: SimObject) -> usize {
        match object {
            SimObject::Deformable(ref mut obj) => {
                obj.set_gravity(self.config.gravity);
                info!(index = self.objects.len(), object = obj.name(), "deformable object added");
            }
            SimObject::Fixed(ref mut b) => {
                b.set_response(false);
                info!(index = self.objects.len(), vertices = b.len(), "fixed object added");
            }
        }
        self.objects.push(object);
        self.objects.len() - 1
    }

    #[inline]
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn object(&self, index: usize) -> Option<&SimObject> {
        self.objects.get(index)
    }

    pub fn object_mut(&mut self, index: usize) -> Option<&mut SimObject> {
        self.objects.get_mut(index)
    }

    pub fn rule(&self) -> &CollisionRule {
        &self.rule
    }

    pub fn rule_mut(&mut self) -> &mut CollisionRule {
        &mut self.rule
    }

    pub fn collision(&self) -> &CollisionSystem {
        &self.collision
    }

    pub fn time(&self) -> Real {
        self.time
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Integrates every deformable object, then runs collision detection and
    /// response on the updated boundaries. Corrections take effect on the
    /// next step. Returns the number of colliding pairs.
    pub fn step(&mut self) -> usize {
        let h = self.config.time_step;
        for object in self.objects.iter_mut() {
            if let SimObject::Deformable(obj) = object {
                self.config.integrator.integrate(obj, h);
            }
        }

        let mut boundaries: Vec<&mut Boundary> =
            self.objects.iter_mut().map(SimObject::boundary_mut).collect();
        let colliding = self.collision.step(&mut boundaries, &self.rule);

        self.time += h;
        self.frame += 1;
        debug!(frame = self.frame, time = self.time, colliding, "step");
        colliding
    }

    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn snapshot(&self, index: usize) -> Option<SurfaceSnapshot> {
        self.objects.get(index).map(|o| {
            let mut s = SurfaceSnapshot::default();
            s.copy_from(o.boundary(), self.frame);
            s
        })
    }

    /// Copies the boundary of object `index` into the writer's back buffer
    /// and publishes it.
    pub fn publish(&self, index: usize, writer: &mut Writer<SurfaceSnapshot>) -> Result<()> {
        let object = self
            .objects
            .get(index)
            .ok_or_else(|| Error::out_of_range("object", index, self.objects.len()))?;
        writer.write().copy_from(object.boundary(), self.frame);
        writer.publish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    mod scenes {
        use approx::assert_relative_eq;
        use cgmath::{InnerSpace, Vector3, Zero};
        use crate::boundary::{Boundary, BoundaryType, HasBoundaryConditions};
        use crate::fem::{FemObject, LoadData, Material};
        use crate::geom::Transform;
        use crate::integrator::IntegratorKind;
        use crate::mesh::TriSurface;
        use crate::simulation::{SimObject, Simulation, SimulationConfig};
        use crate::snapshot::channel;

        fn floor() -> Boundary {
            let surface = TriSurface::from_arrays(
                &[
                    Vector3::new(-10.0, 0.0, -5.0),
                    Vector3::new(0.0, 0.0, 10.0),
                    Vector3::new(10.0, 0.0, -5.0),
                ],
                &[[0, 1, 2]],
            )
            .unwrap();
            Boundary::from_surface(surface)
        }

        /// A tetrahedron whose apex pokes 0.1 below the floor.
        fn spike() -> FemObject {
            let data = LoadData {
                nodes: vec![
                    Vector3::new(0.0, 0.5, 0.0),
                    Vector3::new(1.0, 0.5, 0.0),
                    Vector3::new(0.0, 0.5, 1.0),
                    Vector3::new(0.2, -0.1, 0.2),
                ],
                tets: vec![[0, 1, 2, 3]],
                ..LoadData::default()
            };
            FemObject::from_load_data("spike", &data, Material::default(), &Transform::default()).unwrap()
        }

        fn weightless() -> SimulationConfig {
            SimulationConfig {
                gravity: Vector3::zero(),
                ..SimulationConfig::default()
            }
        }

        #[test]
        fn test_contact_pushes_apex_out() {
            let mut sim = Simulation::new(weightless()).unwrap();
            let spike = sim.add_object(SimObject::Deformable(spike()));
            let ground = sim.add_object(SimObject::Fixed(floor()));

            assert_eq!(sim.step(), 1);
            let info = sim.collision().info(spike, ground).unwrap();
            assert_eq!(info.pairs.len(), 3);

            let b = sim.object(spike).unwrap().boundary();
            let apex = b.local_index(3).unwrap();
            let c = b.condition(apex);
            assert_eq!(c.kind, BoundaryType::Dirichlet);
            assert!(c.value.y > -0.1);
            assert!(c.value.y < 0.0);
            assert_relative_eq!(c.value.x, 0.2, epsilon = 1e-9);
            assert_relative_eq!(c.value.z, 0.2, epsilon = 1e-9);
            // The base is above the floor and untouched.
            for n in 0..3 {
                assert_eq!(b.condition(b.local_index(n).unwrap()).kind, BoundaryType::Neumann);
            }
            // Fixed geometry never receives corrections.
            let f = sim.object(ground).unwrap().boundary();
            assert!(f.conditions().iter().all(|c| c.kind == BoundaryType::Neumann));

            let target = c.value;
            sim.step();
            let obj = sim.object(spike).unwrap().as_deformable().unwrap();
            assert_relative_eq!(obj.positions()[3].y, target.y, epsilon = 1e-12);
        }

        #[test]
        fn test_disabled_rule_skips_contact() {
            let mut sim = Simulation::new(weightless()).unwrap();
            let spike = sim.add_object(SimObject::Deformable(spike()));
            let ground = sim.add_object(SimObject::Fixed(floor()));
            sim.rule_mut().disable(spike, ground);
            assert_eq!(sim.step(), 0);
            assert!(sim.collision().info(spike, ground).is_none());
            let b = sim.object(spike).unwrap().boundary();
            assert!(b.conditions().iter().all(|c| c.kind == BoundaryType::Neumann));
        }

        #[test]
        fn test_clock_and_snapshots() {
            let config = SimulationConfig {
                time_step: 0.01,
                integrator: IntegratorKind::Rk4,
                ..SimulationConfig::default()
            };
            let mut sim = Simulation::new(config).unwrap();
            let i = sim.add_object(SimObject::Deformable(spike()));
            assert_eq!(
                sim.object(i).unwrap().as_deformable().unwrap().gravity(),
                Vector3::new(0.0, -9.8, 0.0)
            );
            sim.run(5);
            assert_eq!(sim.frame(), 5);
            assert_relative_eq!(sim.time(), 0.05, epsilon = 1e-12);

            let s = sim.snapshot(i).unwrap();
            assert_eq!(s.frame, 5);
            assert_eq!(s.positions.len(), 4);
            assert_eq!(s.faces.len(), 4);
            let obj = sim.object(i).unwrap().as_deformable().unwrap();
            // Falling freely, the boundary follows the nodes.
            assert!(obj.positions()[0].y < 0.5);
            let k = obj.boundary.local_index(0).unwrap();
            assert_eq!(s.positions[k], obj.positions()[0]);
            assert!(s.normals.iter().all(|n| (n.magnitude() - 1.0).abs() < 1e-9));
            assert!(sim.snapshot(3).is_none());

            let (mut w, mut r) = channel();
            sim.publish(i, &mut w).unwrap();
            assert_eq!(*r.read(), s);
            assert!(sim.publish(9, &mut w).is_err());
        }

        #[test]
        fn test_bad_time_step() {
            let config = SimulationConfig {
                time_step: 0.0,
                ..SimulationConfig::default()
            };
            assert!(Simulation::new(config).is_err());
        }
    }
}
