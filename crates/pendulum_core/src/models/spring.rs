use crate::error::GeometryFault;
use crate::geometry::{RodChain, RodGeometry};
use crate::params::{Capabilities, ModelControls, ParameterSnapshot};
use crate::traits::{DynamicalSystem, PendulumModel};
use anyhow::Result;

pub const STATE_LEN: usize = 5;

const THETA: usize = 1;
const R: usize = 2;
const OMEGA: usize = 3;
const R_DOT: usize = 4;

pub const DEFAULT_MASS: f64 = 3.0;
pub const DEFAULT_SPRING_CONSTANT: f64 = 10.0;

/// A point mass on a rod that stretches like a spring.
///
/// State: `[t, θ, r, θ', r']`. The spring stores `k (r - r0)²`, so the radial
/// restoring acceleration is `-(2k/m)(r - r0)`.
pub struct SpringPendulum<G: RodGeometry = RodChain> {
    controls: ModelControls<G>,
    params: ParameterSnapshot,
}

impl<G: RodGeometry> SpringPendulum<G> {
    pub fn new(geometry: G) -> Result<Self> {
        super::ensure_rods(&geometry, 1)?;
        let mut params = ParameterSnapshot::default();
        params.rods[0].mass = DEFAULT_MASS;
        params.rods[0].spring_constant = DEFAULT_SPRING_CONSTANT;
        params.rods[0].length = geometry.rod_length(0);
        let controls = ModelControls::new(
            geometry,
            params,
            Capabilities {
                rods: 1,
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

    /// Radius at which the spring carries the hanging mass at rest.
    pub fn equilibrium_length(&self) -> f64 {
        let params = self.controls.parameters();
        let rod = params.rod(0);
        rod.length + rod.mass * params.gravity / (2.0 * rod.spring_constant)
    }
}

impl<G: RodGeometry> DynamicalSystem<f64> for SpringPendulum<G> {
    fn dimension(&self) -> usize {
        STATE_LEN
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let rod = self.params.rod(0);
        let g = self.params.gravity;
        let (sin, cos) = x[THETA].sin_cos();
        let r = x[R];

        out[0] = 1.0;
        out[THETA] = x[OMEGA];
        out[R] = x[R_DOT];
        out[OMEGA] = -2.0 * x[R_DOT] * x[OMEGA] / r - g / r * sin;
        out[R_DOT] = r * x[OMEGA] * x[OMEGA] + g * cos
            - 2.0 * rod.spring_constant / rod.mass * (r - rod.length);
    }
}

impl<G: RodGeometry> PendulumModel for SpringPendulum<G> {
    fn initial_state(&mut self) -> Vec<f64> {
        let (angle, params) = self.controls.seed(|geometry, params| {
            params.rods[0].length = geometry.rod_length(0);
            (geometry.rod_angle(0), *params)
        });
        self.params = params;

        let mut state = vec![0.0; STATE_LEN];
        state[THETA] = angle;
        state[R] = params.rod(0).length;
        tracing::debug!(?state, "spring pendulum seeded");
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
        if let Some(length) = pending.length[0] {
            state[R] = length;
        }
        tracing::debug!(?pending, "spring pendulum applied external edits");
    }

    fn project_geometry(&mut self, state: &[f64]) -> Result<(), GeometryFault> {
        self.controls.project(|geometry| {
            geometry.set_rod_length(0, state[R])?;
            geometry.set_rod_angle(0, state[THETA])
        })
    }
}
