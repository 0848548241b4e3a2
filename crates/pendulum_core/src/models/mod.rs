//! The four mechanical models and a tagged wrapper for picking one at runtime.

pub mod double;
pub mod simple;
pub mod spring;
pub mod spring_double;

pub use double::DoublePendulum;
pub use simple::SimplePendulum;
pub use spring::SpringPendulum;
pub use spring_double::SpringDoublePendulum;

use crate::error::GeometryFault;
use crate::geometry::{RodChain, RodGeometry};
use crate::params::ModelControls;
use crate::traits::{DynamicalSystem, PendulumModel};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

fn ensure_rods(geometry: &impl RodGeometry, rods: usize) -> Result<()> {
    if geometry.rod_count() < rods {
        bail!(
            "Model needs {} rods but the geometry has {}.",
            rods,
            geometry.rod_count()
        );
    }
    for rod in 0..rods {
        let length = geometry.rod_length(rod);
        if !length.is_finite() || length <= 0.0 {
            bail!("Rod {} length must be finite and positive, got {}.", rod, length);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Simple,
    Spring,
    Double,
    SpringDouble,
}

impl ModelKind {
    pub fn rods(self) -> usize {
        match self {
            ModelKind::Simple | ModelKind::Spring => 1,
            ModelKind::Double | ModelKind::SpringDouble => 2,
        }
    }

    pub fn state_len(self) -> usize {
        match self {
            ModelKind::Simple => simple::STATE_LEN,
            ModelKind::Spring => spring::STATE_LEN,
            ModelKind::Double => double::STATE_LEN,
            ModelKind::SpringDouble => spring_double::STATE_LEN,
        }
    }

    pub fn build<G: RodGeometry>(self, geometry: G) -> Result<Pendulum<G>> {
        Ok(match self {
            ModelKind::Simple => Pendulum::Simple(SimplePendulum::new(geometry)?),
            ModelKind::Spring => Pendulum::Spring(SpringPendulum::new(geometry)?),
            ModelKind::Double => Pendulum::Double(DoublePendulum::new(geometry)?),
            ModelKind::SpringDouble => {
                Pendulum::SpringDouble(SpringDoublePendulum::new(geometry)?)
            }
        })
    }

    /// Builds the model on a fresh [`RodChain`] with default rods.
    pub fn build_default(self) -> Result<Pendulum<RodChain>> {
        self.build(RodChain::new(self.rods()))
    }
}

/// Any of the four models behind one type.
pub enum Pendulum<G: RodGeometry = RodChain> {
    Simple(SimplePendulum<G>),
    Spring(SpringPendulum<G>),
    Double(DoublePendulum<G>),
    SpringDouble(SpringDoublePendulum<G>),
}

impl<G: RodGeometry> Pendulum<G> {
    pub fn kind(&self) -> ModelKind {
        match self {
            Pendulum::Simple(_) => ModelKind::Simple,
            Pendulum::Spring(_) => ModelKind::Spring,
            Pendulum::Double(_) => ModelKind::Double,
            Pendulum::SpringDouble(_) => ModelKind::SpringDouble,
        }
    }

    pub fn controls(&self) -> ModelControls<G> {
        match self {
            Pendulum::Simple(m) => m.controls(),
            Pendulum::Spring(m) => m.controls(),
            Pendulum::Double(m) => m.controls(),
            Pendulum::SpringDouble(m) => m.controls(),
        }
    }

    #[must_use]
    pub fn with_gravity(self, gravity: f64) -> Self {
        match self {
            Pendulum::Simple(m) => Pendulum::Simple(m.with_gravity(gravity)),
            Pendulum::Spring(m) => Pendulum::Spring(m.with_gravity(gravity)),
            Pendulum::Double(m) => Pendulum::Double(m.with_gravity(gravity)),
            Pendulum::SpringDouble(m) => Pendulum::SpringDouble(m.with_gravity(gravity)),
        }
    }
}

impl<G: RodGeometry> DynamicalSystem<f64> for Pendulum<G> {
    fn dimension(&self) -> usize {
        self.kind().state_len()
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        match self {
            Pendulum::Simple(m) => m.apply(t, x, out),
            Pendulum::Spring(m) => m.apply(t, x, out),
            Pendulum::Double(m) => m.apply(t, x, out),
            Pendulum::SpringDouble(m) => m.apply(t, x, out),
        }
    }
}

impl<G: RodGeometry> PendulumModel for Pendulum<G> {
    fn initial_state(&mut self) -> Vec<f64> {
        match self {
            Pendulum::Simple(m) => m.initial_state(),
            Pendulum::Spring(m) => m.initial_state(),
            Pendulum::Double(m) => m.initial_state(),
            Pendulum::SpringDouble(m) => m.initial_state(),
        }
    }

    fn synchronize(&mut self, state: &mut [f64]) {
        match self {
            Pendulum::Simple(m) => m.synchronize(state),
            Pendulum::Spring(m) => m.synchronize(state),
            Pendulum::Double(m) => m.synchronize(state),
            Pendulum::SpringDouble(m) => m.synchronize(state),
        }
    }

    fn project_geometry(&mut self, state: &[f64]) -> Result<(), GeometryFault> {
        match self {
            Pendulum::Simple(m) => m.project_geometry(state),
            Pendulum::Spring(m) => m.project_geometry(state),
            Pendulum::Double(m) => m.project_geometry(state),
            Pendulum::SpringDouble(m) => m.project_geometry(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rod;
    use crate::params::ParameterControl;

    const KINDS: [ModelKind; 4] = [
        ModelKind::Simple,
        ModelKind::Spring,
        ModelKind::Double,
        ModelKind::SpringDouble,
    ];

    #[test]
    fn every_kind_seeds_a_state_of_its_declared_length() {
        for kind in KINDS {
            let mut model = kind.build_default().unwrap();
            assert_eq!(model.kind(), kind);
            assert_eq!(model.dimension(), kind.state_len());
            let state = model.initial_state();
            assert_eq!(state.len(), kind.state_len());
            assert_eq!(state[0], 0.0);
            assert_eq!(model.controls().capabilities().rods, kind.rods());
        }
    }

    #[test]
    fn every_kind_has_unit_time_rate() {
        for kind in KINDS {
            let mut model = kind.build_default().unwrap();
            let mut state = model.initial_state();
            let mut out = vec![0.0; state.len()];
            model.derivative(&mut state, &mut out);
            assert_eq!(out[0], 1.0);
        }
    }

    #[test]
    fn total_length_sums_default_rods() {
        for kind in KINDS {
            let model = kind.build_default().unwrap();
            let expected = kind.rods() as f64 * crate::geometry::DEFAULT_ROD_LENGTH;
            assert_eq!(model.controls().total_length(), expected);
        }
    }

    #[test]
    fn two_rod_models_reject_single_rod_geometry() {
        assert!(ModelKind::Double.build(RodChain::new(1)).is_err());
        assert!(ModelKind::SpringDouble.build(RodChain::new(1)).is_err());
        assert!(ModelKind::Simple.build(RodChain::new(2)).is_ok());
    }

    #[test]
    fn construction_rejects_unusable_rod_lengths() {
        let rod = |length: f64| Rod { angle: 0.3, length };
        for kind in KINDS {
            let err = kind
                .build(RodChain::from_rods(vec![rod(0.0), rod(1.0)]))
                .err()
                .expect("zero length is rejected");
            assert!(err.to_string().contains("Rod 0 length"));
        }
        let err = ModelKind::Double
            .build(RodChain::from_rods(vec![rod(1.0), rod(f64::NAN)]))
            .err()
            .expect("NaN length is rejected");
        assert!(err.to_string().contains("Rod 1 length"));
        assert!(ModelKind::Simple
            .build(RodChain::from_rods(vec![rod(2.0), rod(-1.0)]))
            .is_ok());
    }

    #[test]
    fn gravity_override_reaches_the_wrapped_model() {
        let model = ModelKind::Double.build_default().unwrap().with_gravity(3.7);
        assert_eq!(model.controls().parameters().gravity, 3.7);
    }
}
