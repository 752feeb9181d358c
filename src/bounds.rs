//! Parameter bounds for the bounded fitter.
//!
//! [`Bounds`] constrains a single parameter; [`ParameterBounds`] holds one per
//! SAIM parameter (A, B, h) and projects candidate vectors onto the box before
//! they are evaluated.

use crate::error::SaimError;
use crate::simplex::ParameterValidator;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must be less than max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Expected {expected} bounds, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

impl From<BoundsError> for SaimError {
    fn from(err: BoundsError) -> Self {
        SaimError::InvalidInput(err.to_string())
    }
}

/// Represents the bounds constraints on a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

// JSON has no infinity, so open ends are written as null.
impl Serialize for Bounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Bounds", 2)?;
        let min = self.min.is_finite().then_some(self.min);
        let max = self.max.is_finite().then_some(self.max);
        state.serialize_field("min", &min)?;
        state.serialize_field("max", &max)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BoundsHelper {
            #[serde(default)]
            min: Option<f64>,

            #[serde(default)]
            max: Option<f64>,
        }

        let helper = BoundsHelper::deserialize(deserializer)?;
        let min = helper.min.unwrap_or(f64::NEG_INFINITY);
        let max = helper.max.unwrap_or(f64::INFINITY);

        Bounds::new(min, max).map_err(serde::de::Error::custom)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }
}

impl Bounds {
    /// Create a new bounds constraint with min and max values
    ///
    /// # Arguments
    ///
    /// * `min` - Minimum allowed value for the parameter
    /// * `max` - Maximum allowed value for the parameter
    ///
    /// # Returns
    ///
    /// A new `Bounds` object if min <= max, or an error otherwise
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        // Also rejects NaN on either side
        if !(min <= max) {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Create an unbounded constraint (negative infinity to positive infinity)
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Check if a value is within the bounds
    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Check if the bounds are finite (both min and max are finite)
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Clamp a value to be within the bounds
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Box constraints on the SAIM parameter vector `[A, B, h]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    /// Amplitude A
    pub amplitude: Bounds,
    /// Background B
    pub background: Bounds,
    /// Height h in nanometres
    pub height: Bounds,
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self::default_saim()
    }
}

impl ParameterBounds {
    /// Number of bounded parameters.
    pub const LEN: usize = 3;

    /// A, B in [0, 64000] and h in [0, 1000] nm.
    pub fn default_saim() -> Self {
        Self {
            amplitude: Bounds {
                min: 0.0,
                max: 64000.0,
            },
            background: Bounds {
                min: 0.0,
                max: 64000.0,
            },
            height: Bounds {
                min: 0.0,
                max: 1000.0,
            },
        }
    }

    /// Build from separate lower and upper vectors ordered `[A, B, h]`.
    ///
    /// Each slice must have exactly three entries.
    pub fn new(lower: &[f64], upper: &[f64]) -> Result<Self, BoundsError> {
        for side in [lower, upper] {
            if side.len() != Self::LEN {
                return Err(BoundsError::WrongLength {
                    expected: Self::LEN,
                    actual: side.len(),
                });
            }
        }

        Ok(Self {
            amplitude: Bounds::new(lower[0], upper[0])?,
            background: Bounds::new(lower[1], upper[1])?,
            height: Bounds::new(lower[2], upper[2])?,
        })
    }

    fn as_array(&self) -> [Bounds; 3] {
        [self.amplitude, self.background, self.height]
    }

    /// Lower bounds ordered `[A, B, h]`.
    pub fn lower(&self) -> [f64; 3] {
        self.as_array().map(|b| b.min)
    }

    /// Upper bounds ordered `[A, B, h]`.
    pub fn upper(&self) -> [f64; 3] {
        self.as_array().map(|b| b.max)
    }

    /// Clamp every component of `params` into its box.
    pub fn project(&self, params: &Array1<f64>) -> Array1<f64> {
        let bounds = self.as_array();
        Array1::from_iter(
            params
                .iter()
                .zip(bounds.iter())
                .map(|(value, bounds)| bounds.clamp(*value)),
        )
    }

    /// Check that every component of `params` lies in its box.
    pub fn contains(&self, params: &Array1<f64>) -> bool {
        params.len() == Self::LEN
            && params
                .iter()
                .zip(self.as_array().iter())
                .all(|(value, bounds)| bounds.is_within_bounds(*value))
    }
}

impl ParameterValidator for ParameterBounds {
    fn validate(&self, params: &Array1<f64>) -> Array1<f64> {
        self.project(params)
    }
}
