//! Run configuration.
//!
//! A [`FitConfiguration`] is an immutable snapshot of everything a run needs:
//! the optical geometry, the angle scan, the starting guess, the candidate
//! heights, the pixel threshold and the choice of fitter. It is built in code
//! with the `with_*` setters or loaded from JSON; missing JSON fields take
//! their defaults.

use crate::bounds::ParameterBounds;
use crate::error::{Result, SaimError};
use crate::fit::FitterKind;
use crate::organize::{AngleGeometry, ObservationOrganizer};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which per-pixel value is compared against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThresholdMode {
    /// The value of one reference slice
    SliceValue { slice: usize },
    /// The mean over all slices
    StackAverage,
}

impl Default for ThresholdMode {
    fn default() -> Self {
        ThresholdMode::SliceValue { slice: 0 }
    }
}

impl ThresholdMode {
    /// Value of `samples` compared against the threshold.
    pub fn value(&self, samples: &[f64]) -> f64 {
        match *self {
            ThresholdMode::SliceValue { slice } => samples.get(slice).copied().unwrap_or(f64::NAN),
            ThresholdMode::StackAverage => {
                samples.iter().sum::<f64>() / samples.len() as f64
            }
        }
    }
}

/// Configuration of one fitting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfiguration {
    /// Excitation wavelength in nm. Default: 488
    pub wavelength: f64,

    /// Refractive index of the sample medium. Default: 1.36
    pub sample_index: f64,

    /// Oxide thickness in nm. Default: 500
    pub oxide_thickness: f64,

    /// Angle of the first slice in degrees. Default: -50
    pub first_angle: f64,

    /// Angle increment between slices in degrees. Default: 1
    pub angle_step: f64,

    /// Fold the scan onto non-negative angles. Default: false
    pub mirror_around_zero: bool,

    /// The zero-angle frame was recorded twice. Default: false
    pub zero_doubled: bool,

    /// Hold the background at its starting value. Default: false
    pub use_b_angle: bool,

    /// Starting amplitude A₀. Default: 1000
    pub initial_amplitude: f64,

    /// Starting background B₀. Default: 5000
    pub initial_background: f64,

    /// Starting heights in nm, one fit per entry. Default: [100]
    pub heights: Vec<f64>,

    /// Pixels whose threshold value is not above this are skipped. Default: 5000
    pub threshold: f64,

    /// How the threshold value of a pixel is taken. Default: slice 0
    pub threshold_mode: ThresholdMode,

    /// Fitting strategy. Default: gradient
    pub fitter: FitterKind,

    /// Iteration cap of the gradient fitter. Default: 100
    pub max_iterations: usize,

    /// Box of the bounded fitter. Default: A, B in [0, 64000], h in [0, 1000]
    pub bounds: ParameterBounds,
}

impl Default for FitConfiguration {
    fn default() -> Self {
        Self {
            wavelength: 488.0,
            sample_index: 1.36,
            oxide_thickness: 500.0,
            first_angle: -50.0,
            angle_step: 1.0,
            mirror_around_zero: false,
            zero_doubled: false,
            use_b_angle: false,
            initial_amplitude: 1000.0,
            initial_background: 5000.0,
            heights: vec![100.0],
            threshold: 5000.0,
            threshold_mode: ThresholdMode::default(),
            fitter: FitterKind::default(),
            max_iterations: 100,
            bounds: ParameterBounds::default_saim(),
        }
    }
}

impl FitConfiguration {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a JSON string; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_wavelength(mut self, wavelength: f64) -> Self {
        self.wavelength = wavelength;
        self
    }

    pub fn with_sample_index(mut self, sample_index: f64) -> Self {
        self.sample_index = sample_index;
        self
    }

    pub fn with_oxide_thickness(mut self, oxide_thickness: f64) -> Self {
        self.oxide_thickness = oxide_thickness;
        self
    }

    /// Set the angle scan in one go.
    pub fn with_geometry(mut self, geometry: AngleGeometry) -> Self {
        self.first_angle = geometry.first_angle;
        self.angle_step = geometry.angle_step;
        self.mirror_around_zero = geometry.mirror_around_zero;
        self.zero_doubled = geometry.zero_doubled;
        self
    }

    pub fn with_use_b_angle(mut self, use_b_angle: bool) -> Self {
        self.use_b_angle = use_b_angle;
        self
    }

    /// Set the starting amplitude and background.
    pub fn with_initial_guess(mut self, amplitude: f64, background: f64) -> Self {
        self.initial_amplitude = amplitude;
        self.initial_background = background;
        self
    }

    pub fn with_heights(mut self, heights: Vec<f64>) -> Self {
        self.heights = heights;
        self
    }

    pub fn with_threshold(mut self, threshold: f64, mode: ThresholdMode) -> Self {
        self.threshold = threshold;
        self.threshold_mode = mode;
        self
    }

    pub fn with_fitter(mut self, fitter: FitterKind) -> Self {
        self.fitter = fitter;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_bounds(mut self, bounds: ParameterBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// The angle scan part of the configuration.
    pub fn geometry(&self) -> AngleGeometry {
        AngleGeometry {
            first_angle: self.first_angle,
            angle_step: self.angle_step,
            mirror_around_zero: self.mirror_around_zero,
            zero_doubled: self.zero_doubled,
        }
    }

    /// Check the values that do not depend on the image.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("wavelength", self.wavelength),
            ("sample index", self.sample_index),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SaimError::InvalidInput(format!(
                    "The {} must be positive, got {}",
                    name, value
                )));
            }
        }

        if !(self.oxide_thickness.is_finite() && self.oxide_thickness >= 0.0) {
            return Err(SaimError::InvalidInput(format!(
                "Oxide thickness must be non-negative, got {}",
                self.oxide_thickness
            )));
        }

        if !(self.angle_step.is_finite() && self.angle_step != 0.0) {
            return Err(SaimError::InvalidInput(format!(
                "Angle step must be finite and non-zero, got {}",
                self.angle_step
            )));
        }

        if self.heights.is_empty() {
            return Err(SaimError::invalid_input(
                "At least one candidate height is required",
            ));
        }
        if let Some(height) = self.heights.iter().find(|h| !h.is_finite()) {
            return Err(SaimError::InvalidInput(format!(
                "Candidate heights must be finite, got {}",
                height
            )));
        }

        if !(self.initial_amplitude.is_finite() && self.initial_background.is_finite()) {
            return Err(SaimError::invalid_input("Initial guess must be finite"));
        }

        if self.threshold.is_nan() {
            return Err(SaimError::invalid_input("Threshold must be a number"));
        }

        if self.max_iterations == 0 {
            return Err(SaimError::invalid_input(
                "Maximum iterations must be at least 1",
            ));
        }

        ParameterBounds::new(&self.bounds.lower(), &self.bounds.upper())?;
        Ok(())
    }

    /// [`validate`](Self::validate) plus the checks against a stack of
    /// `slice_count` slices.
    pub fn validate_for_slices(&self, slice_count: usize) -> Result<()> {
        self.validate()?;

        if let ThresholdMode::SliceValue { slice } = self.threshold_mode {
            if slice >= slice_count {
                return Err(SaimError::InvalidInput(format!(
                    "Threshold slice {} is out of range for {} slices",
                    slice, slice_count
                )));
            }
        }

        ObservationOrganizer::new(self.geometry(), slice_count).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;

    #[test]
    fn test_defaults() {
        let config = FitConfiguration::default();
        assert_eq!(config.wavelength, 488.0);
        assert_eq!(config.heights, vec![100.0]);
        assert_eq!(config.threshold_mode, ThresholdMode::SliceValue { slice: 0 });
        assert_eq!(config.fitter, FitterKind::Gradient);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_partial_fields() {
        let config = FitConfiguration::from_json_str(
            r#"{
                "wavelength": 561.0,
                "heights": [10.0, 75.0, 1000.0],
                "threshold_mode": { "mode": "stack_average" },
                "fitter": "bounded"
            }"#,
        )
        .unwrap();

        assert_eq!(config.wavelength, 561.0);
        assert_eq!(config.heights.len(), 3);
        assert_eq!(config.threshold_mode, ThresholdMode::StackAverage);
        assert_eq!(config.fitter, FitterKind::Bounded);
        assert_eq!(config.sample_index, 1.36);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = FitConfiguration::default()
            .with_heights(vec![50.0, 150.0])
            .with_threshold(100.0, ThresholdMode::SliceValue { slice: 3 })
            .with_use_b_angle(true);
        let json = config.to_json_string().unwrap();
        assert_eq!(FitConfiguration::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_json_rejects_invalid() {
        assert!(matches!(
            FitConfiguration::from_json_str(r#"{ "heights": [] }"#),
            Err(SaimError::InvalidInput(_))
        ));
        assert!(matches!(
            FitConfiguration::from_json_str("{ not json"),
            Err(SaimError::JsonError(_))
        ));
        assert!(matches!(
            FitConfiguration::from_json_file("/nonexistent/saim.json"),
            Err(SaimError::IoError(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(FitConfiguration::default().with_wavelength(0.0).validate().is_err());
        assert!(FitConfiguration::default().with_max_iterations(0).validate().is_err());
        assert!(FitConfiguration::default()
            .with_heights(vec![f64::NAN])
            .validate()
            .is_err());

        let mut inverted = ParameterBounds::default_saim();
        inverted.height = Bounds {
            min: 10.0,
            max: 1.0,
        };
        assert!(FitConfiguration::default().with_bounds(inverted).validate().is_err());
    }

    #[test]
    fn test_validate_for_slices() {
        let config = FitConfiguration::default().with_geometry(AngleGeometry {
            first_angle: -42.0,
            angle_step: 1.0,
            mirror_around_zero: true,
            zero_doubled: true,
        });
        assert!(config.validate_for_slices(86).is_ok());
        assert!(config.validate_for_slices(80).is_err());

        let config = FitConfiguration::default()
            .with_threshold(0.0, ThresholdMode::SliceValue { slice: 10 });
        assert!(config.validate_for_slices(5).is_err());
        assert!(config.validate_for_slices(11).is_ok());
    }

    #[test]
    fn test_threshold_value() {
        let samples = [1.0, 2.0, 6.0];
        assert_eq!(ThresholdMode::SliceValue { slice: 2 }.value(&samples), 6.0);
        assert_eq!(ThresholdMode::StackAverage.value(&samples), 3.0);
        assert!(ThresholdMode::SliceValue { slice: 5 }.value(&samples).is_nan());
    }
}
