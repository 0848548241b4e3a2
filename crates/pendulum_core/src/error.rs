//! Error types for pendulum runs and parameter edits.

use thiserror::Error;

/// The rod quantity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Angle,
    Length,
    Mass,
    SpringConstant,
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Quantity::Angle => "angle",
            Quantity::Length => "length",
            Quantity::Mass => "mass",
            Quantity::SpringConstant => "spring constant",
        };
        f.write_str(name)
    }
}

/// Raised by a geometry collaborator when a projected state cannot be
/// represented. Fatal to the run that produced it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryFault {
    /// A rod angle, length, or derived position is NaN or infinite.
    #[error("rod {rod} {quantity} is not finite ({value})")]
    NonFinite {
        /// Rod index, 0 = innermost.
        rod: usize,
        /// Offending quantity.
        quantity: Quantity,
        /// Offending value.
        value: f64,
    },

    /// The collaborator rejected the transform for its own reasons.
    #[error("degenerate geometry: {reason}")]
    Degenerate {
        /// Description supplied by the collaborator.
        reason: String,
    },
}

impl GeometryFault {
    /// Create a collaborator-specific fault.
    #[must_use]
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::Degenerate {
            reason: reason.into(),
        }
    }
}

/// Errors returned by the parameter surface. The model state is untouched
/// when any of these is returned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterError {
    /// NaN or infinite input.
    #[error("rod {rod} {quantity} must be finite, got {value}")]
    NonFinite {
        rod: usize,
        quantity: Quantity,
        value: f64,
    },

    /// Finite but physically meaningless input.
    #[error("rod {rod} {quantity} out of range: {value} ({requirement})")]
    OutOfRange {
        rod: usize,
        quantity: Quantity,
        value: f64,
        requirement: &'static str,
    },

    /// Rod index past the end of the model.
    #[error("rod index {rod} out of range for a model with {rods} rod(s)")]
    InvalidRod { rod: usize, rods: usize },

    /// The geometry collaborator refused the edit.
    #[error(transparent)]
    Geometry(#[from] GeometryFault),
}
