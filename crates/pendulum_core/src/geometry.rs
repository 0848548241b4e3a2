//! The geometry collaborator: whatever holds the visible pose of the rods.
//!
//! Models only ever talk to it through [`RodGeometry`]. A renderer adapts its
//! scene graph to this trait; [`RodChain`] is the in-memory kinematic chain
//! used when no renderer is attached.

use crate::error::{GeometryFault, Quantity};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Length of a freshly built rod.
pub const DEFAULT_ROD_LENGTH: f64 = 10.0;

/// Narrow projection interface between a model and its visible geometry.
///
/// Rod indices are 0-based from the base outward. Angles are radians from
/// the downward vertical. Callers guarantee `rod < rod_count()`.
pub trait RodGeometry: Send + 'static {
    fn rod_count(&self) -> usize;

    fn rod_angle(&self, rod: usize) -> f64;

    fn rod_length(&self, rod: usize) -> f64;

    /// Swings `rod` to `angle`. Outer rods keep their own angles.
    fn set_rod_angle(&mut self, rod: usize, angle: f64) -> Result<(), GeometryFault>;

    /// Resizes `rod`, keeping its angle.
    fn set_rod_length(&mut self, rod: usize, length: f64) -> Result<(), GeometryFault>;

    fn total_length(&self) -> f64 {
        (0..self.rod_count()).map(|rod| self.rod_length(rod)).sum()
    }
}

/// Pose of a single rod.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rod {
    pub angle: f64,
    pub length: f64,
}

impl Default for Rod {
    fn default() -> Self {
        Self {
            angle: 0.0,
            length: DEFAULT_ROD_LENGTH,
        }
    }
}

impl Rod {
    /// Offset from the rod's pivot to its mass.
    pub fn offset(&self) -> Vector2<f64> {
        Vector2::new(self.angle.sin(), -self.angle.cos()) * self.length
    }
}

/// A planar chain of rods hanging from a fixed base point.
#[derive(Debug, Clone, PartialEq)]
pub struct RodChain {
    base: Point2<f64>,
    rods: Vec<Rod>,
}

impl RodChain {
    /// A chain of `rods` default rods hanging straight down from the origin.
    pub fn new(rods: usize) -> Self {
        Self {
            base: Point2::origin(),
            rods: vec![Rod::default(); rods],
        }
    }

    pub fn from_rods(rods: Vec<Rod>) -> Self {
        Self {
            base: Point2::origin(),
            rods,
        }
    }

    #[must_use]
    pub fn with_base(mut self, base: Point2<f64>) -> Self {
        self.base = base;
        self
    }

    pub fn base(&self) -> Point2<f64> {
        self.base
    }

    pub fn rods(&self) -> &[Rod] {
        &self.rods
    }

    /// Position of the mass at the end of `rod`.
    pub fn joint(&self, rod: usize) -> Point2<f64> {
        self.rods[..=rod]
            .iter()
            .fold(self.base, |pivot, r| pivot + r.offset())
    }

    /// Positions of every mass, innermost first.
    pub fn joints(&self) -> Vec<Point2<f64>> {
        let mut pivot = self.base;
        self.rods
            .iter()
            .map(|r| {
                pivot += r.offset();
                pivot
            })
            .collect()
    }

    fn commit(&mut self, rod: usize, candidate: Rod) -> Result<(), GeometryFault> {
        let slot = self
            .rods
            .get_mut(rod)
            .ok_or_else(|| GeometryFault::degenerate(format!("no rod at index {rod}")))?;
        let offset = candidate.offset();
        if !offset.x.is_finite() || !offset.y.is_finite() {
            return Err(GeometryFault::NonFinite {
                rod,
                quantity: Quantity::Length,
                value: offset.norm(),
            });
        }
        *slot = candidate;
        Ok(())
    }
}

impl RodGeometry for RodChain {
    fn rod_count(&self) -> usize {
        self.rods.len()
    }

    fn rod_angle(&self, rod: usize) -> f64 {
        self.rods[rod].angle
    }

    fn rod_length(&self, rod: usize) -> f64 {
        self.rods[rod].length
    }

    fn set_rod_angle(&mut self, rod: usize, angle: f64) -> Result<(), GeometryFault> {
        if !angle.is_finite() {
            return Err(GeometryFault::NonFinite {
                rod,
                quantity: Quantity::Angle,
                value: angle,
            });
        }
        let length = self.rods.get(rod).map_or(DEFAULT_ROD_LENGTH, |r| r.length);
        self.commit(rod, Rod { angle, length })
    }

    fn set_rod_length(&mut self, rod: usize, length: f64) -> Result<(), GeometryFault> {
        if !length.is_finite() {
            return Err(GeometryFault::NonFinite {
                rod,
                quantity: Quantity::Length,
                value: length,
            });
        }
        let angle = self.rods.get(rod).map_or(0.0, |r| r.angle);
        self.commit(rod, Rod { angle, length })
    }
}
