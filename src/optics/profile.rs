//! Theoretical intensity-versus-angle curves for a set of heights.
//!
//! Plot-ready data; rendering is left to the caller.

use super::fresnel::OxideStack;
use super::refractive_index::RefractiveIndexTable;
use crate::error::{Result, SaimError};
use serde::{Deserialize, Serialize};

/// Geometry and sampling of a profile plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSettings {
    /// Excitation wavelength in nm
    pub wavelength: f64,
    /// Refractive index of the sample medium
    pub sample_index: f64,
    /// Oxide thickness in nm
    pub oxide_thickness: f64,
    /// First angle in degrees
    pub first_angle: f64,
    /// Last angle in degrees, inclusive
    pub last_angle: f64,
    /// Angle increment in degrees
    pub angle_step: f64,
    /// Scale each curve so its maximum is 1
    pub normalize: bool,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            wavelength: 488.0,
            sample_index: 1.36,
            oxide_thickness: 500.0,
            first_angle: -50.0,
            last_angle: 50.0,
            angle_step: 1.0,
            normalize: true,
        }
    }
}

/// Intensity curve for one height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityProfile {
    /// Height above the oxide in nm
    pub height: f64,
    /// Angles in degrees
    pub angles: Vec<f64>,
    /// Field intensity per angle
    pub intensities: Vec<f64>,
}

impl ProfileSettings {
    fn angles(&self) -> Result<Vec<f64>> {
        if !(self.angle_step.is_finite() && self.angle_step > 0.0) {
            return Err(SaimError::InvalidInput(format!(
                "Angle step must be positive, got {}",
                self.angle_step
            )));
        }
        if !(self.first_angle <= self.last_angle) {
            return Err(SaimError::InvalidInput(format!(
                "First angle {} is past last angle {}",
                self.first_angle, self.last_angle
            )));
        }

        // Tolerate rounding so that the last angle is included
        let count = ((self.last_angle - self.first_angle) / self.angle_step + 1e-9).floor() as usize + 1;
        Ok((0..count)
            .map(|i| self.first_angle + i as f64 * self.angle_step)
            .collect())
    }
}

/// Field intensity against angle for each of `heights`.
///
/// With `settings.normalize`, every curve is divided by its own maximum.
pub fn intensity_profiles(
    table: &RefractiveIndexTable,
    settings: &ProfileSettings,
    heights: &[f64],
) -> Result<Vec<IntensityProfile>> {
    let stack = OxideStack::from_table(
        table,
        settings.wavelength,
        settings.sample_index,
        settings.oxide_thickness,
    )?;
    let angles = settings.angles()?;

    Ok(heights
        .iter()
        .map(|&height| {
            let mut intensities: Vec<f64> = angles
                .iter()
                .map(|angle| stack.field_intensity(angle.to_radians(), height))
                .collect();

            if settings.normalize {
                let max = intensities.iter().copied().fold(f64::MIN, f64::max);
                if max > 0.0 {
                    intensities.iter_mut().for_each(|value| *value /= max);
                }
            }

            IntensityProfile {
                height,
                angles: angles.clone(),
                intensities,
            }
        })
        .collect())
}
