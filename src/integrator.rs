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

use cgmath::{Vector3, Zero};
use serde::{Deserialize, Serialize};

use crate::geom::Real;

/// Nodal positions and velocities. A derivative reuses the same layout:
/// `pos` holds velocities and `vel` accelerations.
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub pos: Vec<Vector3<Real>>,
    pub vel: Vec<Vector3<Real>>,
}

impl State {
    pub fn zeros(n: usize) -> Self {
        State {
            pos: vec![Vector3::zero(); n],
            vel: vec![Vector3::zero(); n],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    /// `self += h * deriv`, with no constraints applied.
    pub fn add_scaled(&mut self, deriv: &State, h: Real) {
        for (p, d) in self.pos.iter_mut().zip(deriv.pos.iter()) {
            *p += d * h;
        }
        for (v, d) in self.vel.iter_mut().zip(deriv.vel.iter()) {
            *v += d * h;
        }
    }
}

/// Something that can be advanced by an explicit integrator.
pub trait Integrable {
    /// A copy of the current state.
    fn state(&self) -> State;

    /// Replaces the current state and pushes it to anything derived from it.
    fn set_state(&mut self, state: State);

    /// Time derivative of `state`, with constraints applied.
    fn deriv_state(&mut self, state: &State) -> State;

    /// `state += h * deriv`, then re-imposes constraints on `state`.
    fn accum_state(&self, state: &mut State, deriv: &State, h: Real);
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegratorKind {
    #[default]
    Euler,
    /// Second order Runge-Kutta.
    Midpoint,
    /// Heun's third order method.
    Heun3,
    /// Classical fourth order Runge-Kutta.
    Rk4,
}

impl IntegratorKind {
    /// Advances `system` by one step of size `h`.
    pub fn integrate<T: Integrable>(self, system: &mut T, h: Real) {
        let y0 = system.state();
        let next = match self {
            IntegratorKind::Euler => {
                let k1 = system.deriv_state(&y0);
                let mut y = y0;
                system.accum_state(&mut y, &k1, h);
                y
            }
            IntegratorKind::Midpoint => {
                let k1 = system.deriv_state(&y0);
                let mut y1 = y0.clone();
                system.accum_state(&mut y1, &k1, h / 2.0);
                let k2 = system.deriv_state(&y1);
                let mut y = y0;
                system.accum_state(&mut y, &k2, h);
                y
            }
            IntegratorKind::Heun3 => {
                let k1 = system.deriv_state(&y0);
                let mut y1 = y0.clone();
                system.accum_state(&mut y1, &k1, h / 3.0);
                let k2 = system.deriv_state(&y1);
                let mut y2 = y0.clone();
                system.accum_state(&mut y2, &k2, 2.0 * h / 3.0);
                let k3 = system.deriv_state(&y2);
                let mut y = y0;
                system.accum_state(&mut y, &k1, h / 4.0);
                system.accum_state(&mut y, &k3, 3.0 * h / 4.0);
                y
            }
            IntegratorKind::Rk4 => {
                let k1 = system.deriv_state(&y0);
                let mut y1 = y0.clone();
                system.accum_state(&mut y1, &k1, h / 2.0);
                let k2 = system.deriv_state(&y1);
                let mut y2 = y0.clone();
                system.accum_state(&mut y2, &k2, h / 2.0);
                let k3 = system.deriv_state(&y2);
                let mut y3 = y0.clone();
                system.accum_state(&mut y3, &k3, h);
                let k4 = system.deriv_state(&y3);
                let mut y = y0;
                system.accum_state(&mut y, &k1, h / 6.0);
                system.accum_state(&mut y, &k2, h / 3.0);
                system.accum_state(&mut y, &k3, h / 3.0);
                system.accum_state(&mut y, &k4, h / 6.0);
                y
            }
        };
        system.set_state(next);
    }
}

#[cfg(test)]
mod tests {
    mod schemes {
        use cgmath::Vector3;
        use crate::geom::Real;
        use crate::integrator::{Integrable, IntegratorKind, State};

        /// Unit harmonic oscillator along x: x'' = -x.
        struct Oscillator {
            state: State,
        }

        impl Oscillator {
            fn new() -> Self {
                let mut state = State::zeros(1);
                state.pos[0] = Vector3::new(1.0, 0.0, 0.0);
                Oscillator { state }
            }
        }

        impl Integrable for Oscillator {
            fn state(&self) -> State {
                self.state.clone()
            }

            fn set_state(&mut self, state: State) {
                self.state = state;
            }

            fn deriv_state(&mut self, state: &State) -> State {
                State {
                    pos: state.vel.clone(),
                    vel: state.pos.iter().map(|p| -*p).collect(),
                }
            }

            fn accum_state(&self, state: &mut State, deriv: &State, h: Real) {
                state.add_scaled(deriv, h);
            }
        }

        fn error_after_one_second(kind: IntegratorKind) -> Real {
            let mut osc = Oscillator::new();
            let h = 0.01;
            for _ in 0..100 {
                kind.integrate(&mut osc, h);
            }
            let x = osc.state.pos[0].x;
            let v = osc.state.vel[0].x;
            ((x - 1.0f64.cos()).powi(2) + (v + 1.0f64.sin()).powi(2)).sqrt()
        }

        #[test]
        fn test_orders() {
            let euler = error_after_one_second(IntegratorKind::Euler);
            let midpoint = error_after_one_second(IntegratorKind::Midpoint);
            let heun = error_after_one_second(IntegratorKind::Heun3);
            let rk4 = error_after_one_second(IntegratorKind::Rk4);
            assert!(euler < 5e-2, "euler {}", euler);
            assert!(midpoint < 1e-3, "midpoint {}", midpoint);
            assert!(heun < 1e-4, "heun {}", heun);
            assert!(rk4 < 1e-7, "rk4 {}", rk4);
            assert!(rk4 < heun && heun < midpoint && midpoint < euler);
        }

        #[test]
        fn test_linear_ode_agreement() {
            // Constant acceleration is integrated exactly by every scheme
            // except Euler, which lags by h^2 / 2 per step in position.
            struct Falling {
                state: State,
            }

            impl Integrable for Falling {
                fn state(&self) -> State {
                    self.state.clone()
                }

                fn set_state(&mut self, state: State) {
                    self.state = state;
                }

                fn deriv_state(&mut self, state: &State) -> State {
                    State {
                        pos: state.vel.clone(),
                        vel: vec![Vector3::new(0.0, -2.0, 0.0); state.len()],
                    }
                }

                fn accum_state(&self, state: &mut State, deriv: &State, h: Real) {
                    state.add_scaled(deriv, h);
                }
            }

            for &kind in [IntegratorKind::Midpoint, IntegratorKind::Heun3, IntegratorKind::Rk4].iter() {
                let mut f = Falling { state: State::zeros(2) };
                for _ in 0..10 {
                    kind.integrate(&mut f, 0.1);
                }
                assert!((f.state.pos[1].y + 1.0).abs() < 1e-12, "{:?}", kind);
                assert!((f.state.vel[0].y + 2.0).abs() < 1e-12, "{:?}", kind);
            }
        }
    }
}
