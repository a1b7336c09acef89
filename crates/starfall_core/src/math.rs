//! Vector math for the simulation.
//!
//! Positions are `{x, y, z}` records. Strategic movement, detection and
//! targeting all happen on the galactic plane, so distances are measured in
//! the x/z plane; `y` is carried through untouched for presentation layers.

use serde::{Deserialize, Serialize};

/// World-space position or direction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate (ignored by plane distance math).
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Vec3 {
    /// Origin.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared distance in the x/z plane.
    #[must_use]
    pub fn distance_sq(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx * dx + dz * dz
    }

    /// Distance in the x/z plane.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Step from `self` toward `target` by at most `max_step`.
    ///
    /// Returns the new position and whether the target was reached.
    #[must_use]
    pub fn step_toward(&self, target: &Self, max_step: f64) -> (Self, bool) {
        let dist = self.distance(target);
        if dist <= max_step || dist <= f64::EPSILON {
            (*target, true)
        } else {
            let t = max_step / dist;
            (
                Self {
                    x: self.x + (target.x - self.x) * t,
                    y: self.y + (target.y - self.y) * t,
                    z: self.z + (target.z - self.z) * t,
                },
                false,
            )
        }
    }

    /// True when every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}
