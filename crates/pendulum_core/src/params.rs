//! Physical parameters and the live-edit surface shared between a running
//! model and a control thread.
//!
//! Edits land in a single lock-protected record: the parameter snapshot is
//! updated immediately, while angle and length edits are also queued as
//! pending overrides for the state vector. The model drains both in one
//! critical section at the start of every integration step, so the four RK4
//! stages always see one consistent snapshot.

use crate::error::{ParameterError, Quantity};
use crate::geometry::RodGeometry;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Upper bound on rods per model.
pub const MAX_RODS: usize = 2;

/// Standard gravity used by every model unless overridden per instance.
pub const DEFAULT_GRAVITY: f64 = 9.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RodParameters {
    pub mass: f64,
    pub spring_constant: f64,
    /// Fixed length for rigid rods, natural (rest) length for springs.
    pub length: f64,
}

impl Default for RodParameters {
    fn default() -> Self {
        Self {
            mass: 1.0,
            spring_constant: 0.0,
            length: crate::geometry::DEFAULT_ROD_LENGTH,
        }
    }
}

/// Everything a derivative evaluation reads besides the state vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub gravity: f64,
    pub rods: [RodParameters; MAX_RODS],
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            rods: [RodParameters::default(); MAX_RODS],
        }
    }
}

impl ParameterSnapshot {
    pub fn rod(&self, rod: usize) -> &RodParameters {
        &self.rods[rod]
    }
}

/// External values waiting to overwrite the integrator's state. Repeated
/// edits to one field before the next step keep only the latest value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingUpdates {
    pub angle: [Option<f64>; MAX_RODS],
    pub length: [Option<f64>; MAX_RODS],
}

impl PendingUpdates {
    pub fn is_empty(&self) -> bool {
        self.angle.iter().chain(self.length.iter()).all(Option::is_none)
    }
}

/// Which physical quantities a model actually has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub rods: usize,
    pub mass: bool,
    pub spring_constant: bool,
}

/// Mutator surface used by a UI collaborator to edit a running model.
///
/// Every method may be called from any thread while a run is active and
/// never waits on the integrator thread.
pub trait ParameterControl: Send + Sync {
    /// Ignored (after validation) by models without a mass.
    fn set_mass(&self, rod: usize, mass: f64) -> Result<(), ParameterError>;

    /// Ignored (after validation) by models without springs.
    fn set_spring_constant(&self, rod: usize, value: f64) -> Result<(), ParameterError>;

    /// Moves the geometry now; the integrator state follows at the next step.
    fn set_rod_angle(&self, rod: usize, angle: f64) -> Result<(), ParameterError>;

    /// Resizes the geometry now; the integrator state follows at the next step.
    fn set_rod_length(&self, rod: usize, length: f64) -> Result<(), ParameterError>;

    /// Sum of all rod lengths.
    fn total_length(&self) -> f64;
}

struct Shared<G> {
    geometry: G,
    params: ParameterSnapshot,
    pending: PendingUpdates,
}

/// Cloneable handle onto a model's parameters and geometry.
pub struct ModelControls<G> {
    capabilities: Capabilities,
    shared: Arc<Mutex<Shared<G>>>,
}

impl<G> Clone for ModelControls<G> {
    fn clone(&self) -> Self {
        Self {
            capabilities: self.capabilities,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<G: RodGeometry> ModelControls<G> {
    pub(crate) fn new(geometry: G, params: ParameterSnapshot, capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            shared: Arc::new(Mutex::new(Shared {
                geometry,
                params,
                pending: PendingUpdates::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared<G>> {
        // Every field is written whole, so a panic elsewhere cannot leave a
        // half-updated record behind.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Current parameters, including edits not yet seen by the integrator.
    pub fn parameters(&self) -> ParameterSnapshot {
        self.lock().params
    }

    pub fn pending(&self) -> PendingUpdates {
        self.lock().pending
    }

    /// Read-only access to the geometry under the controls' lock. `f` must not
    /// call back into these controls, or it deadlocks; use
    /// [`geometry`](Self::geometry) when it needs to.
    pub fn with_geometry<R>(&self, f: impl FnOnce(&G) -> R) -> R {
        f(&self.lock().geometry)
    }

    /// A copy of the geometry, taken without holding the lock afterwards.
    pub fn geometry(&self) -> G
    where
        G: Clone,
    {
        self.lock().geometry.clone()
    }

    pub(crate) fn set_gravity(&self, gravity: f64) {
        self.lock().params.gravity = gravity;
    }

    /// Runs `f` against the geometry and parameters with the queue cleared.
    /// Used when seeding a run, which already reflects every prior edit.
    pub(crate) fn seed<R>(&self, f: impl FnOnce(&G, &mut ParameterSnapshot) -> R) -> R {
        let mut shared = self.lock();
        shared.pending = PendingUpdates::default();
        let Shared {
            geometry, params, ..
        } = &mut *shared;
        f(geometry, params)
    }

    /// Drains the pending queue together with a parameter snapshot.
    pub(crate) fn take(&self) -> (ParameterSnapshot, PendingUpdates) {
        let mut shared = self.lock();
        let pending = std::mem::take(&mut shared.pending);
        (shared.params, pending)
    }

    pub(crate) fn project<R>(&self, f: impl FnOnce(&mut G) -> R) -> R {
        f(&mut self.lock().geometry)
    }

    fn check_rod(&self, rod: usize) -> Result<(), ParameterError> {
        if rod >= self.capabilities.rods {
            return Err(ParameterError::InvalidRod {
                rod,
                rods: self.capabilities.rods,
            });
        }
        Ok(())
    }
}

fn validate(
    rod: usize,
    quantity: Quantity,
    value: f64,
    accept: fn(f64) -> bool,
    requirement: &'static str,
) -> Result<(), ParameterError> {
    let result = if !value.is_finite() {
        Err(ParameterError::NonFinite {
            rod,
            quantity,
            value,
        })
    } else if !accept(value) {
        Err(ParameterError::OutOfRange {
            rod,
            quantity,
            value,
            requirement,
        })
    } else {
        Ok(())
    };
    if let Err(err) = &result {
        tracing::warn!("rejected parameter edit: {err}");
    }
    result
}

impl<G: RodGeometry> ParameterControl for ModelControls<G> {
    fn set_mass(&self, rod: usize, mass: f64) -> Result<(), ParameterError> {
        self.check_rod(rod)?;
        validate(rod, Quantity::Mass, mass, |m| m > 0.0, "must be > 0")?;
        if self.capabilities.mass {
            self.lock().params.rods[rod].mass = mass;
        }
        Ok(())
    }

    fn set_spring_constant(&self, rod: usize, value: f64) -> Result<(), ParameterError> {
        self.check_rod(rod)?;
        validate(
            rod,
            Quantity::SpringConstant,
            value,
            |k| k >= 0.0,
            "must be >= 0",
        )?;
        if self.capabilities.spring_constant {
            self.lock().params.rods[rod].spring_constant = value;
        }
        Ok(())
    }

    fn set_rod_angle(&self, rod: usize, angle: f64) -> Result<(), ParameterError> {
        self.check_rod(rod)?;
        validate(rod, Quantity::Angle, angle, |_| true, "")?;
        let mut shared = self.lock();
        shared.geometry.set_rod_angle(rod, angle)?;
        shared.pending.angle[rod] = Some(angle);
        Ok(())
    }

    fn set_rod_length(&self, rod: usize, length: f64) -> Result<(), ParameterError> {
        self.check_rod(rod)?;
        validate(rod, Quantity::Length, length, |l| l > 0.0, "must be > 0")?;
        let mut shared = self.lock();
        shared.geometry.set_rod_length(rod, length)?;
        shared.params.rods[rod].length = length;
        shared.pending.length[rod] = Some(length);
        Ok(())
    }

    fn total_length(&self) -> f64 {
        let shared = self.lock();
        (0..self.capabilities.rods)
            .map(|rod| shared.geometry.rod_length(rod))
            .sum()
    }
}
