use crate::error::GeometryFault;
use crate::geometry::{RodChain, RodGeometry};
use crate::params::{Capabilities, ModelControls, ParameterSnapshot};
use crate::traits::{DynamicalSystem, PendulumModel};
use anyhow::Result;
use std::f64::consts::PI;

pub const STATE_LEN: usize = 7;

const X: usize = 1;
const VX: usize = 2;
const Y: usize = 3;
const VY: usize = 4;
const THETA: usize = 5;
const OMEGA: usize = 6;

/// A point mass on a rigid rod.
///
/// State: `[t, x, x', y, y', θ, θ']`. The head position relative to the
/// pivot is integrated alongside the angle so the rotation `(r sin θ,
/// -r cos θ)` is carried by the trajectory itself.
pub struct SimplePendulum<G: RodGeometry = RodChain> {
    controls: ModelControls<G>,
    params: ParameterSnapshot,
}

impl<G: RodGeometry> SimplePendulum<G> {
    pub fn new(geometry: G) -> Result<Self> {
        super::ensure_rods(&geometry, 1)?;
        let mut params = ParameterSnapshot::default();
        params.rods[0].length = geometry.rod_length(0);
        let controls = ModelControls::new(
            geometry,
            params,
            Capabilities {
                rods: 1,
                mass: false,
                spring_constant: false,
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

    /// Small-amplitude period `2π√(r/g)` for the current parameters.
    pub fn small_angle_period(&self) -> f64 {
        let params = self.controls.parameters();
        2.0 * PI * (params.rod(0).length / params.gravity).sqrt()
    }

    /// Rebuilds the Cartesian entries from the angle, its rate and `length`.
    fn place_head(state: &mut [f64], length: f64) {
        let (sin, cos) = state[THETA].sin_cos();
        let omega = state[OMEGA];
        state[X] = length * sin;
        state[Y] = -length * cos;
        state[VX] = length * cos * omega;
        state[VY] = length * sin * omega;
    }
}

impl<G: RodGeometry> DynamicalSystem<f64> for SimplePendulum<G> {
    fn dimension(&self) -> usize {
        STATE_LEN
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let r = self.params.rod(0).length;
        let g = self.params.gravity;
        let (sin, cos) = x[THETA].sin_cos();
        let omega = x[OMEGA];
        let alpha = -g / r * sin;

        out[0] = 1.0;
        out[X] = x[VX];
        out[VX] = alpha * r * cos - omega * omega * r * sin;
        out[Y] = x[VY];
        out[VY] = alpha * r * sin + omega * omega * r * cos;
        out[THETA] = omega;
        out[OMEGA] = alpha;
    }
}

impl<G: RodGeometry> PendulumModel for SimplePendulum<G> {
    fn initial_state(&mut self) -> Vec<f64> {
        let (angle, params) = self.controls.seed(|geometry, params| {
            params.rods[0].length = geometry.rod_length(0);
            (geometry.rod_angle(0), *params)
        });
        self.params = params;

        let mut state = vec![0.0; STATE_LEN];
        state[THETA] = angle;
        Self::place_head(&mut state, params.rod(0).length);
        tracing::debug!(?state, "simple pendulum seeded");
        state
    }

    fn synchronize(&mut self, state: &mut [f64]) {
        let (params, pending) = self.controls.take();
        self.params = params;
        if pending.is_empty() {
            return;
        }
        if let Some(angle) = pending.angle[0] {
            state[THETA] = angle;
        }
        Self::place_head(state, params.rod(0).length);
        tracing::debug!(?pending, "simple pendulum applied external edits");
    }

    fn project_geometry(&mut self, state: &[f64]) -> Result<(), GeometryFault> {
        self.controls.project(|geometry| geometry.set_rod_angle(0, state[THETA]))
    }
}
