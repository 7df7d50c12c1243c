//! Per-input merge strengths

use crate::error::{MergeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar multiplier applied to one input before combination
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Strength(f64);

impl Strength {
    /// Lowest accepted strength
    pub const MIN: f64 = -100.0;
    /// Highest accepted strength
    pub const MAX: f64 = 100.0;
    /// Default strength for a node input
    pub const DEFAULT: f64 = 1.0;
    /// Slider step advertised to the host
    pub const STEP: f64 = 0.01;

    /// Create a strength, rejecting values outside [MIN, MAX]
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(MergeError::InvalidStrength { value });
        }
        Ok(Self(value))
    }

    /// Create a strength without the range check
    pub fn unchecked(value: f64) -> Self {
        Self(value)
    }

    /// Raw value
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether this strength removes its input's contribution
    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }

    /// Re-check the range on a strength built with [`Strength::unchecked`]
    pub fn validate(self) -> Result<Self> {
        Self::new(self.0)
    }
}

impl Default for Strength {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
