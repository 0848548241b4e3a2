pub mod config;
pub mod error;
pub mod geometry;
pub mod integrator;
pub mod models;
pub mod params;
pub mod solvers;
/// The `pendulum_core` crate integrates pendulum mechanics in real time while
/// a separate thread pauses, resumes, slows down, or edits the run.
///
/// Key components:
/// - **Traits**: `Scalar`, `DynamicalSystem`, `Steppable` (solvers) and `PendulumModel` (physics law plus geometry link).
/// - **Models**: simple, spring, double and double spring pendulums, each behind `ModelControls` for live edits.
/// - **Integrator**: fixed-step RK4 run loop with a cooperative pause/finish/delay control handle.
/// - **Geometry**: the `RodGeometry` collaborator and an in-memory `RodChain`.
pub mod traits;

pub use config::{InitialValues, IntegratorSettings, StepLimit};
pub use error::{GeometryFault, ParameterError, Quantity};
pub use geometry::{Rod, RodChain, RodGeometry};
pub use integrator::{
    Integrator, IntegratorControl, RunHandle, RunOutcome, RunPhase, RunReport, StepSample,
};
pub use models::{
    DoublePendulum, ModelKind, Pendulum, SimplePendulum, SpringDoublePendulum, SpringPendulum,
};
pub use params::{Capabilities, ModelControls, ParameterControl, ParameterSnapshot};
pub use traits::{DynamicalSystem, PendulumModel, Steppable};
