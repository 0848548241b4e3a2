use crate::error::GeometryFault;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the steppers.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Represents a first-order ODE system `x' = f(t, x)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the length of the state vector.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// x: current state
    /// t: current time
    /// out: buffer to write dx/dt
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// The physics law of a pendulum model together with its link to the
/// geometry collaborator.
///
/// Index 0 of every state vector accumulates elapsed time, so its rate is
/// always 1. `apply` is pure in (state, parameter snapshot); edits made
/// through the model's controls only reach it via [`synchronize`].
///
/// [`synchronize`]: PendulumModel::synchronize
pub trait PendulumModel: DynamicalSystem<f64> + Send {
    /// Builds the seed vector from the geometry's current angles and lengths.
    fn initial_state(&mut self) -> Vec<f64>;

    /// Applies pending external edits to `state` and refreshes the parameter
    /// snapshot used by `apply`. Each pending edit is consumed here exactly once.
    fn synchronize(&mut self, state: &mut [f64]);

    /// Pushes `state` onto the geometry collaborator.
    fn project_geometry(&mut self, state: &[f64]) -> Result<(), GeometryFault>;

    /// Reconciles pending edits, then evaluates the rate of change.
    fn derivative(&mut self, state: &mut [f64], out: &mut [f64]) {
        self.synchronize(state);
        self.apply(state[0], state, out);
    }
}
