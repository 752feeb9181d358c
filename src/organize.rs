//! Turning per-slice intensities into an [`ObservationSet`].
//!
//! Slice `i` of a stack was recorded at `first_angle + i·angle_step`, unless the
//! acquisition repeated the normal-incidence frame (`zero_doubled`), in which
//! case every slice after the second zero frame sits one step lower. Mirrored
//! acquisitions are folded onto non-negative angles by averaging each slice
//! with its partner on the other side of zero.

use crate::error::{Result, SaimError};
use crate::observation::{Observation, ObservationSet};
use serde::{Deserialize, Serialize};

/// Relative tolerance for comparing angles that come out of `first + i·step`.
const ANGLE_TOLERANCE: f64 = 1e-9;

/// Acquisition geometry of an angle scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleGeometry {
    /// Angle of the first slice in degrees
    pub first_angle: f64,
    /// Angle increment between slices in degrees
    pub angle_step: f64,
    /// Fold the scan onto non-negative angles
    pub mirror_around_zero: bool,
    /// The zero-angle frame was recorded twice
    pub zero_doubled: bool,
}

impl AngleGeometry {
    /// Nominal angle of slice `index`, before any zero-doubling shift.
    pub fn raw_angle(&self, index: usize) -> f64 {
        self.first_angle + index as f64 * self.angle_step
    }

    /// Angle of the last of `slice_count` slices, after the zero-doubling shift.
    pub fn last_angle(&self, slice_count: usize) -> f64 {
        let last = self.raw_angle(slice_count.saturating_sub(1));
        if self.zero_doubled {
            last - self.angle_step
        } else {
            last
        }
    }

    fn tolerance(&self) -> f64 {
        ANGLE_TOLERANCE * self.angle_step.abs().max(self.first_angle.abs()).max(1.0)
    }

    fn is_zero(&self, angle: f64) -> bool {
        angle.abs() <= self.tolerance()
    }
}

/// Where one output observation comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    angle: f64,
    first: usize,
    /// Averaged with `first` when present
    second: Option<usize>,
}

/// Precomputed slice-to-observation mapping for one geometry and slice count.
#[derive(Debug, Clone)]
pub struct ObservationOrganizer {
    geometry: AngleGeometry,
    slice_count: usize,
    entries: Vec<Entry>,
}

impl ObservationOrganizer {
    /// Validate the geometry against `slice_count` and build the mapping.
    pub fn new(geometry: AngleGeometry, slice_count: usize) -> Result<Self> {
        if !(geometry.angle_step.is_finite() && geometry.angle_step != 0.0) {
            return Err(SaimError::InvalidInput(format!(
                "Angle step must be finite and non-zero, got {}",
                geometry.angle_step
            )));
        }
        if !geometry.first_angle.is_finite() {
            return Err(SaimError::InvalidInput(format!(
                "First angle must be finite, got {}",
                geometry.first_angle
            )));
        }
        if slice_count == 0 {
            return Err(SaimError::InvalidInput("No slices to organize".to_string()));
        }

        let entries = if geometry.mirror_around_zero {
            Self::mirrored_entries(&geometry, slice_count)?
        } else if geometry.zero_doubled {
            Self::doubled_entries(&geometry, slice_count)?
        } else {
            (0..slice_count)
                .map(|i| Entry {
                    angle: geometry.raw_angle(i),
                    first: i,
                    second: None,
                })
                .collect()
        };

        if entries.is_empty() {
            return Err(SaimError::InvalidInput(format!(
                "{} slices yield no observations for this geometry",
                slice_count
            )));
        }

        Ok(Self {
            geometry,
            slice_count,
            entries,
        })
    }

    fn doubled_entries(geometry: &AngleGeometry, slice_count: usize) -> Result<Vec<Entry>> {
        let zero = (0..slice_count)
            .find(|&i| geometry.is_zero(geometry.raw_angle(i)))
            .filter(|&i| i + 1 < slice_count)
            .ok_or_else(|| {
                SaimError::InvalidInput(
                    "Zero angle is marked as doubled but the scan holds no doubled zero frame"
                        .to_string(),
                )
            })?;

        let mut entries = Vec::with_capacity(slice_count - 1);
        for i in 0..slice_count {
            if i < zero {
                entries.push(Entry {
                    angle: geometry.raw_angle(i),
                    first: i,
                    second: None,
                });
            } else if i == zero + 1 {
                entries.push(Entry {
                    angle: 0.0,
                    first: zero,
                    second: Some(i),
                });
            } else if i > zero + 1 {
                entries.push(Entry {
                    angle: geometry.raw_angle(i) - geometry.angle_step,
                    first: i,
                    second: None,
                });
            }
        }
        Ok(entries)
    }

    /// One averaged observation per pair of slices `i` and `N - 1 - i`, at
    /// the positive angle `-raw_angle(i)`, largest angle first.
    ///
    /// Slices at 0° are never emitted, not even as a single 0° observation:
    /// an odd stack of `N` slices yields `(N - 1) / 2` observations, and an
    /// even stack whose two middle slices are both 0° yields `N / 2 - 1`.
    fn mirrored_entries(geometry: &AngleGeometry, slice_count: usize) -> Result<Vec<Entry>> {
        let first = geometry.first_angle;
        let last = geometry.last_angle(slice_count);
        if (first.abs() - last).abs() > geometry.tolerance() {
            return Err(SaimError::InvalidInput(format!(
                "Mirrored scan is not symmetric: first angle {} but last angle {} over {} slices",
                first, last, slice_count
            )));
        }

        Ok((0..slice_count / 2)
            .map(|i| Entry {
                angle: -geometry.raw_angle(i),
                first: i,
                second: Some(slice_count - 1 - i),
            })
            .filter(|entry| entry.angle > geometry.tolerance())
            .collect())
    }

    pub fn geometry(&self) -> &AngleGeometry {
        &self.geometry
    }

    /// Number of slices the organizer expects.
    pub fn slice_count(&self) -> usize {
        self.slice_count
    }

    /// Number of observations produced per call.
    pub fn observation_count(&self) -> usize {
        self.entries.len()
    }

    /// Organize one pixel's per-slice intensities.
    pub fn organize(&self, raw: &[f64]) -> Result<ObservationSet> {
        if raw.len() != self.slice_count {
            return Err(SaimError::InvalidInput(format!(
                "Expected {} intensities, got {}",
                self.slice_count,
                raw.len()
            )));
        }

        Ok(self
            .entries
            .iter()
            .map(|entry| {
                let intensity = match entry.second {
                    Some(second) => (raw[entry.first] + raw[second]) / 2.0,
                    None => raw[entry.first],
                };
                Observation::new(entry.angle, intensity)
            })
            .collect())
    }
}

/// One-shot form of [`ObservationOrganizer::organize`].
pub fn organize(raw: &[f64], geometry: AngleGeometry) -> Result<ObservationSet> {
    ObservationOrganizer::new(geometry, raw.len())?.organize(raw)
}
