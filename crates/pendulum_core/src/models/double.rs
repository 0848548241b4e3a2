use crate::error::GeometryFault;
use crate::geometry::{RodChain, RodGeometry};
use crate::params::{Capabilities, ModelControls, ParameterSnapshot};
use crate::traits::{DynamicalSystem, PendulumModel};
use anyhow::Result;

pub const STATE_LEN: usize = 5;

const THETA1: usize = 1;
const OMEGA1: usize = 2;
const THETA2: usize = 3;
const OMEGA2: usize = 4;

/// Two rigid rods with point masses at their ends, each angle measured from
/// the downward vertical.
///
/// State: `[t, θ1, θ1', θ2, θ2']`.
pub struct DoublePendulum<G: RodGeometry = RodChain> {
    controls: ModelControls<G>,
    params: ParameterSnapshot,
}

impl<G: RodGeometry> DoublePendulum<G> {
    pub fn new(geometry: G) -> Result<Self> {
        super::ensure_rods(&geometry, 2)?;
        let mut params = ParameterSnapshot::default();
        for rod in 0..2 {
            params.rods[rod].mass = 1.0;
            params.rods[rod].length = geometry.rod_length(rod);
        }
        let controls = ModelControls::new(
            geometry,
            params,
            Capabilities {
                rods: 2,
                mass: true,
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

    /// Kinetic plus potential energy under the current parameter snapshot,
    /// with the pivot as the potential reference.
    pub fn total_energy(&self, x: &[f64]) -> f64 {
        let (m1, l1) = (self.params.rod(0).mass, self.params.rod(0).length);
        let (m2, l2) = (self.params.rod(1).mass, self.params.rod(1).length);
        let g = self.params.gravity;
        let (w1, w2) = (x[OMEGA1], x[OMEGA2]);

        let kinetic = 0.5 * (m1 + m2) * l1 * l1 * w1 * w1
            + 0.5 * m2 * l2 * l2 * w2 * w2
            + m2 * l1 * l2 * w1 * w2 * (x[THETA1] - x[THETA2]).cos();
        let potential = -(m1 + m2) * g * l1 * x[THETA1].cos() - m2 * g * l2 * x[THETA2].cos();
        kinetic + potential
    }
}

impl<G: RodGeometry> DynamicalSystem<f64> for DoublePendulum<G> {
    fn dimension(&self) -> usize {
        STATE_LEN
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let (m1, l1) = (self.params.rod(0).mass, self.params.rod(0).length);
        let (m2, l2) = (self.params.rod(1).mass, self.params.rod(1).length);
        let g = self.params.gravity;
        let (t1, w1) = (x[THETA1], x[OMEGA1]);
        let (t2, w2) = (x[THETA2], x[OMEGA2]);

        let (sin_d, cos_d) = (t1 - t2).sin_cos();
        let den = 2.0 * m1 + m2 - m2 * (2.0 * (t1 - t2)).cos();

        out[0] = 1.0;
        out[THETA1] = w1;
        out[OMEGA1] = (-g * (2.0 * m1 + m2) * t1.sin()
            - m2 * g * (t1 - 2.0 * t2).sin()
            - 2.0 * sin_d * m2 * (w2 * w2 * l2 + w1 * w1 * l1 * cos_d))
            / (l1 * den);
        out[THETA2] = w2;
        out[OMEGA2] = 2.0
            * sin_d
            * (w1 * w1 * l1 * (m1 + m2) + g * (m1 + m2) * t1.cos() + w2 * w2 * l2 * m2 * cos_d)
            / (l2 * den);
    }
}

impl<G: RodGeometry> PendulumModel for DoublePendulum<G> {
    fn initial_state(&mut self) -> Vec<f64> {
        let (angles, params) = self.controls.seed(|geometry, params| {
            for rod in 0..2 {
                params.rods[rod].length = geometry.rod_length(rod);
            }
            ([geometry.rod_angle(0), geometry.rod_angle(1)], *params)
        });
        self.params = params;

        let mut state = vec![0.0; STATE_LEN];
        state[THETA1] = angles[0];
        state[THETA2] = angles[1];
        tracing::debug!(?state, "double pendulum seeded");
        state
    }

    fn synchronize(&mut self, state: &mut [f64]) {
        let (params, pending) = self.controls.take();
        self.params = params;
        if pending.is_empty() {
            return;
        }
        // Lengths are parameters here, already carried by the snapshot.
        for (rod, slot) in [THETA1, THETA2].into_iter().enumerate() {
            if let Some(angle) = pending.angle[rod] {
                state[slot] = angle;
            }
        }
        tracing::debug!(?pending, "double pendulum applied external edits");
    }

    fn project_geometry(&mut self, state: &[f64]) -> Result<(), GeometryFault> {
        self.controls.project(|geometry| {
            geometry.set_rod_angle(0, state[THETA1])?;
            geometry.set_rod_angle(1, state[THETA2])
        })
    }
}
