use crate::error::GeometryFault;
use crate::geometry::{RodChain, RodGeometry};
use crate::params::{Capabilities, ModelControls, ParameterSnapshot};
use crate::traits::{DynamicalSystem, PendulumModel};
use anyhow::Result;

pub const STATE_LEN: usize = 9;

const R1: usize = 1;
const THETA1: usize = 2;
const R2: usize = 3;
const THETA2: usize = 4;
const R1_DOT: usize = 5;
const OMEGA1: usize = 6;
const R2_DOT: usize = 7;
const OMEGA2: usize = 8;

pub const DEFAULT_MASS: f64 = 1.0;
pub const DEFAULT_SPRING_CONSTANT: f64 = 100.0;

/// Two springy rods in series. Each link stores `½ k (r - r0)²`.
///
/// State: `[t, r1, θ1, r2, θ2, r1', θ1', r2', θ2']`, where `(r2, θ2)` are
/// polar coordinates of the outer mass relative to the inner one.
///
/// The equations come from the Cartesian accelerations of both masses
/// projected on each link's radial unit vector `u = (sin θ, -cos θ)` and
/// tangential unit vector `e = (cos θ, sin θ)`:
///
/// ```text
/// r''  = r θ'² + a·u
/// θ''  = (a·e - 2 r' θ') / r
/// ```
///
/// with `a` the inner mass's acceleration for link 1 and the outer mass's
/// acceleration relative to it for link 2. Spring tensions couple the links
/// through both masses.
pub struct SpringDoublePendulum<G: RodGeometry = RodChain> {
    controls: ModelControls<G>,
    params: ParameterSnapshot,
}

impl<G: RodGeometry> SpringDoublePendulum<G> {
    pub fn new(geometry: G) -> Result<Self> {
        super::ensure_rods(&geometry, 2)?;
        let mut params = ParameterSnapshot::default();
        for rod in 0..2 {
            params.rods[rod].mass = DEFAULT_MASS;
            params.rods[rod].spring_constant = DEFAULT_SPRING_CONSTANT;
            params.rods[rod].length = geometry.rod_length(rod);
        }
        let controls = ModelControls::new(
            geometry,
            params,
            Capabilities {
                rods: 2,
                mass: true,
                spring_constant: true,
            },
        );
        Ok(Self { controls, params })
    }

    #[must_use]
    pub fn with_gravity(mut self, gravity: f64) -> Self {
        self.controls.set_gravity(gravity);
        self.params.gravity = gravity;
        self
    }

    pub fn controls(&self) -> ModelControls<G> {
        self.controls.clone()
    }

    /// Link lengths at which both springs hold the masses at rest.
    pub fn equilibrium_lengths(&self) -> [f64; 2] {
        let params = self.controls.parameters();
        let (inner, outer) = (params.rod(0), params.rod(1));
        let g = params.gravity;
        [
            inner.length + (inner.mass + outer.mass) * g / inner.spring_constant,
            outer.length + outer.mass * g / outer.spring_constant,
        ]
    }

    pub fn total_energy(&self, x: &[f64]) -> f64 {
        let (inner, outer) = (self.params.rod(0), self.params.rod(1));
        let g = self.params.gravity;
        let (s1, c1) = x[THETA1].sin_cos();
        let (s2, c2) = x[THETA2].sin_cos();

        let y1 = -x[R1] * c1;
        let y2 = y1 - x[R2] * c2;
        let v1x = x[R1_DOT] * s1 + x[R1] * x[OMEGA1] * c1;
        let v1y = -x[R1_DOT] * c1 + x[R1] * x[OMEGA1] * s1;
        let v2x = v1x + x[R2_DOT] * s2 + x[R2] * x[OMEGA2] * c2;
        let v2y = v1y - x[R2_DOT] * c2 + x[R2] * x[OMEGA2] * s2;

        let kinetic = 0.5 * inner.mass * (v1x * v1x + v1y * v1y)
            + 0.5 * outer.mass * (v2x * v2x + v2y * v2y);
        let stretch1 = x[R1] - inner.length;
        let stretch2 = x[R2] - outer.length;
        let potential = g * (inner.mass * y1 + outer.mass * y2)
            + 0.5 * inner.spring_constant * stretch1 * stretch1
            + 0.5 * outer.spring_constant * stretch2 * stretch2;
        kinetic + potential
    }
}

impl<G: RodGeometry> DynamicalSystem<f64> for SpringDoublePendulum<G> {
    fn dimension(&self) -> usize {
        STATE_LEN
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let (inner, outer) = (self.params.rod(0), self.params.rod(1));
        let (m1, m2) = (inner.mass, outer.mass);
        let g = self.params.gravity;
        let (r1, r2) = (x[R1], x[R2]);
        let (w1, w2) = (x[OMEGA1], x[OMEGA2]);
        let (s1, c1) = x[THETA1].sin_cos();
        let (sin_d, cos_d) = (x[THETA1] - x[THETA2]).sin_cos();

        let tension1 = inner.spring_constant * (r1 - inner.length);
        let tension2 = outer.spring_constant * (r2 - outer.length);

        out[0] = 1.0;
        out[R1] = x[R1_DOT];
        out[THETA1] = w1;
        out[R2] = x[R2_DOT];
        out[THETA2] = w2;

        out[R1_DOT] = r1 * w1 * w1 + g * c1 - tension1 / m1 + tension2 / m1 * cos_d;
        out[OMEGA1] = (-g * s1 - tension2 / m1 * sin_d - 2.0 * x[R1_DOT] * w1) / r1;
        out[R2_DOT] =
            r2 * w2 * w2 - tension2 * (m1 + m2) / (m1 * m2) + tension1 / m1 * cos_d;
        out[OMEGA2] = (tension1 / m1 * sin_d - 2.0 * x[R2_DOT] * w2) / r2;
    }
}

impl<G: RodGeometry> PendulumModel for SpringDoublePendulum<G> {
    fn initial_state(&mut self) -> Vec<f64> {
        let (angles, params) = self.controls.seed(|geometry, params| {
            for rod in 0..2 {
                params.rods[rod].length = geometry.rod_length(rod);
            }
            ([geometry.rod_angle(0), geometry.rod_angle(1)], *params)
        });
        self.params = params;

        let mut state = vec![0.0; STATE_LEN];
        state[R1] = params.rod(0).length;
        state[THETA1] = angles[0];
        state[R2] = params.rod(1).length;
        state[THETA2] = angles[1];
        tracing::debug!(?state, "double spring pendulum seeded");
        state
    }

    fn synchronize(&mut self, state: &mut [f64]) {
        let (params, pending) = self.controls.take();
        self.params = params;
        if pending.is_empty() {
            return;
        }
        for (rod, (r, theta)) in [(R1, THETA1), (R2, THETA2)].into_iter().enumerate() {
            if let Some(length) = pending.length[rod] {
                state[r] = length;
            }
            if let Some(angle) = pending.angle[rod] {
                state[theta] = angle;
            }
        }
        tracing::debug!(?pending, "double spring pendulum applied external edits");
    }

    fn project_geometry(&mut self, state: &[f64]) -> Result<(), GeometryFault> {
        self.controls.project(|geometry| {
            geometry.set_rod_length(0, state[R1])?;
            geometry.set_rod_angle(0, state[THETA1])?;
            geometry.set_rod_length(1, state[R2])?;
            geometry.set_rod_angle(1, state[THETA2])
        })
    }
}
