//! Run settings and saved starting configurations.

use crate::error::ParameterError;
use crate::geometry::RodGeometry;
use crate::params::{ModelControls, ParameterControl};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many steps a run takes before finishing on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepLimit {
    Finite(u64),
    /// Run until cancelled.
    Indefinite,
}

impl StepLimit {
    pub fn is_exhausted(self, steps_taken: u64) -> bool {
        match self {
            StepLimit::Finite(limit) => steps_taken >= limit,
            StepLimit::Indefinite => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub initial_time: f64,
    /// Fixed RK4 step.
    pub dt: f64,
    pub step_limit: StepLimit,
    /// Pause between steps, so a viewer can follow along.
    pub delay_ms: u64,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            initial_time: 0.0,
            dt: 0.003,
            step_limit: StepLimit::Indefinite,
            delay_ms: 10,
        }
    }
}

impl IntegratorSettings {
    #[must_use]
    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    #[must_use]
    pub fn with_step_limit(mut self, step_limit: StepLimit) -> Self {
        self.step_limit = step_limit;
        self
    }

    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.initial_time.is_finite() {
            bail!("Initial time must be finite.");
        }
        if !self.dt.is_finite() || self.dt == 0.0 {
            bail!("Step size dt must be finite and non-zero.");
        }
        Ok(())
    }
}

/// A saved starting configuration. Angles are in degrees; rod 0 is the
/// innermost. Values for a second rod are ignored by single-rod models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialValues {
    pub angle1_deg: f64,
    pub angle2_deg: f64,
    pub length1: f64,
    pub length2: f64,
    pub mass1: f64,
    pub mass2: f64,
    pub spring1: f64,
    pub spring2: f64,
}

const SOFT_SPRING: f64 = 20.0;
const STIFF_SPRING: f64 = 800_000.0;

impl InitialValues {
    pub fn new(angle_deg: [f64; 2], length: [f64; 2], mass: [f64; 2], spring: [f64; 2]) -> Self {
        Self {
            angle1_deg: angle_deg[0],
            angle2_deg: angle_deg[1],
            length1: length[0],
            length2: length[1],
            mass1: mass[0],
            mass2: mass[1],
            spring1: spring[0],
            spring2: spring[1],
        }
    }

    /// The stock configurations offered for every model.
    pub fn presets() -> [(&'static str, InitialValues); 5] {
        let soft = [SOFT_SPRING; 2];
        let stiff = [STIFF_SPRING; 2];
        [
            ("rest", Self::new([0.0, 0.0], [5.0, 5.0], [1.0, 1.0], soft)),
            ("inverted", Self::new([180.0, 180.0], [5.0, 5.0], [1.0, 1.0], soft)),
            ("heavy top", Self::new([0.0, 90.0], [5.0, 5.0], [2000.0, 1.5], stiff)),
            ("heavy bottom", Self::new([45.0, 45.0], [5.0, 5.0], [2.0, 3000.0], stiff)),
            ("high swing", Self::new([135.0, 135.0], [5.0, 5.0], [1.0, 1.0], soft)),
        ]
    }

    fn rod(&self, rod: usize) -> (f64, f64, f64, f64) {
        if rod == 0 {
            (self.angle1_deg, self.length1, self.mass1, self.spring1)
        } else {
            (self.angle2_deg, self.length2, self.mass2, self.spring2)
        }
    }

    /// Pushes this configuration through the parameter surface of a model.
    /// Stops at the first rejected value.
    pub fn apply<G: RodGeometry>(&self, controls: &ModelControls<G>) -> Result<(), ParameterError> {
        for rod in 0..controls.capabilities().rods {
            let (angle_deg, length, mass, spring) = self.rod(rod);
            controls.set_rod_length(rod, length)?;
            controls.set_rod_angle(rod, angle_deg.to_radians())?;
            controls.set_mass(rod, mass)?;
            controls.set_spring_constant(rod, spring)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for InitialValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "a1:{}, a2:{}, l1:{}, l2:{}, m1:{}, m2:{}, k1:{}, k2:{}",
            self.angle1_deg,
            self.angle2_deg,
            self.length1,
            self.length2,
            self.mass1,
            self.mass2,
            self.spring1,
            self.spring2
        )
    }
}
