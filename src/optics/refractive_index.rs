//! Tabulated refractive indices of the substrate layers.
//!
//! Each compound carries a wavelength-sorted list of `(λ, n, k)` samples.
//! Lookups interpolate linearly between the two neighbouring samples and are
//! memoized per `(compound, wavelength)` inside the table, so one table can be
//! shared behind an `Arc` by every worker of a run.

use crate::error::{Result, SaimError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Materials of the reflective substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compound {
    Silicon,
    SiliconOxide,
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compound::Silicon => write!(f, "silicon"),
            Compound::SiliconOxide => write!(f, "silicon oxide"),
        }
    }
}

/// One tabulated point: wavelength in nm, refractive index, extinction coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexSample {
    pub wavelength: f64,
    pub n: f64,
    pub k: f64,
}

impl IndexSample {
    pub const fn new(wavelength: f64, n: f64, k: f64) -> Self {
        Self { wavelength, n, k }
    }
}

const SILICON: &[IndexSample] = &[
    IndexSample::new(400.0, 5.570, 0.387),
    IndexSample::new(425.0, 5.010, 0.190),
    IndexSample::new(450.0, 4.676, 0.109),
    IndexSample::new(475.0, 4.469, 0.070),
    IndexSample::new(500.0, 4.298, 0.052),
    IndexSample::new(525.0, 4.180, 0.035),
    IndexSample::new(550.0, 4.077, 0.027),
    IndexSample::new(575.0, 4.002, 0.022),
    IndexSample::new(600.0, 3.939, 0.018),
    IndexSample::new(625.0, 3.888, 0.015),
    IndexSample::new(650.0, 3.847, 0.013),
    IndexSample::new(675.0, 3.813, 0.011),
    IndexSample::new(700.0, 3.783, 0.009),
    IndexSample::new(750.0, 3.734, 0.007),
    IndexSample::new(800.0, 3.692, 0.005),
    IndexSample::new(850.0, 3.660, 0.004),
    IndexSample::new(900.0, 3.633, 0.003),
];

const SILICON_OXIDE: &[IndexSample] = &[
    IndexSample::new(400.0, 1.4701, 0.0),
    IndexSample::new(450.0, 1.4656, 0.0),
    IndexSample::new(500.0, 1.4623, 0.0),
    IndexSample::new(550.0, 1.4599, 0.0),
    IndexSample::new(600.0, 1.4580, 0.0),
    IndexSample::new(650.0, 1.4565, 0.0),
    IndexSample::new(700.0, 1.4553, 0.0),
    IndexSample::new(750.0, 1.4542, 0.0),
    IndexSample::new(800.0, 1.4533, 0.0),
    IndexSample::new(900.0, 1.4518, 0.0),
];

/// Wavelength → (n, k) lookup for [`Compound`]s.
#[derive(Debug)]
pub struct RefractiveIndexTable {
    samples: HashMap<Compound, Vec<IndexSample>>,
    memo: RwLock<HashMap<(Compound, u64), (f64, f64)>>,
}

impl RefractiveIndexTable {
    /// Table with the built-in reference data for silicon and silicon oxide (400–900 nm).
    pub fn builtin() -> Self {
        let samples = HashMap::from([
            (Compound::Silicon, SILICON.to_vec()),
            (Compound::SiliconOxide, SILICON_OXIDE.to_vec()),
        ]);
        Self {
            samples,
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the samples of one compound.
    ///
    /// Samples are sorted by wavelength; an empty list or a non-finite or
    /// duplicated wavelength is rejected.
    pub fn with_samples(mut self, compound: Compound, mut samples: Vec<IndexSample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(SaimError::InvalidInput(format!(
                "No refractive index samples for {}",
                compound
            )));
        }
        if samples
            .iter()
            .any(|s| !(s.wavelength.is_finite() && s.n.is_finite() && s.k.is_finite()))
        {
            return Err(SaimError::InvalidInput(format!(
                "Non-finite refractive index sample for {}",
                compound
            )));
        }

        samples.sort_by(|a, b| a.wavelength.total_cmp(&b.wavelength));
        if samples.windows(2).any(|w| w[0].wavelength == w[1].wavelength) {
            return Err(SaimError::InvalidInput(format!(
                "Duplicate wavelength in refractive index samples for {}",
                compound
            )));
        }

        self.samples.insert(compound, samples);
        self.memo.get_mut().retain(|(c, _), _| *c != compound);
        Ok(self)
    }

    /// Tabulated wavelength range `(min, max)` of a compound, in nm.
    pub fn range(&self, compound: Compound) -> Option<(f64, f64)> {
        let samples = self.samples.get(&compound)?;
        Some((samples.first()?.wavelength, samples.last()?.wavelength))
    }

    /// Refractive index `n` of `compound` at `wavelength` nm.
    pub fn index(&self, compound: Compound, wavelength: f64) -> Result<f64> {
        self.lookup(compound, wavelength).map(|(n, _)| n)
    }

    /// Extinction coefficient `k` of `compound` at `wavelength` nm.
    pub fn extinction(&self, compound: Compound, wavelength: f64) -> Result<f64> {
        self.lookup(compound, wavelength).map(|(_, k)| k)
    }

    /// Interpolated `(n, k)`, memoized.
    pub fn lookup(&self, compound: Compound, wavelength: f64) -> Result<(f64, f64)> {
        let key = (compound, wavelength.to_bits());
        if let Some(hit) = self.memo.read().get(&key) {
            return Ok(*hit);
        }

        let value = self.interpolate(compound, wavelength)?;
        self.memo.write().insert(key, value);
        Ok(value)
    }

    /// Number of memoized lookups.
    pub fn cached_entries(&self) -> usize {
        self.memo.read().len()
    }

    fn interpolate(&self, compound: Compound, wavelength: f64) -> Result<(f64, f64)> {
        let samples = self.samples.get(&compound).ok_or_else(|| {
            SaimError::InvalidInput(format!("No refractive index data for {}", compound))
        })?;

        let out_of_range = || {
            SaimError::InvalidInput(format!(
                "Wavelength {} nm is outside the tabulated range for {}",
                wavelength, compound
            ))
        };

        // First sample at or above the wavelength
        let upper = samples
            .iter()
            .position(|s| s.wavelength >= wavelength)
            .ok_or_else(out_of_range)?;
        let hi = samples[upper];
        if hi.wavelength == wavelength {
            return Ok((hi.n, hi.k));
        }
        if upper == 0 {
            return Err(out_of_range());
        }

        let lo = samples[upper - 1];
        let t = (wavelength - lo.wavelength) / (hi.wavelength - lo.wavelength);
        Ok((lo.n + t * (hi.n - lo.n), lo.k + t * (hi.k - lo.k)))
    }
}

impl Default for RefractiveIndexTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tabulated_values_are_exact() {
        let table = RefractiveIndexTable::builtin();
        assert_relative_eq!(table.index(Compound::Silicon, 500.0).unwrap(), 4.298);
        assert_relative_eq!(table.extinction(Compound::Silicon, 500.0).unwrap(), 0.052);
        assert_relative_eq!(table.index(Compound::SiliconOxide, 900.0).unwrap(), 1.4518);
    }

    #[test]
    fn test_linear_interpolation() {
        let table = RefractiveIndexTable::builtin();
        // 488 nm lies between 475 (4.469) and 500 (4.298)
        let expected = 4.469 + (488.0 - 475.0) / 25.0 * (4.298 - 4.469);
        assert_relative_eq!(
            table.index(Compound::Silicon, 488.0).unwrap(),
            expected,
            epsilon = 1e-12
        );

        let expected = 1.4656 + (488.0 - 450.0) / 50.0 * (1.4623 - 1.4656);
        assert_relative_eq!(
            table.index(Compound::SiliconOxide, 488.0).unwrap(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_out_of_range() {
        let table = RefractiveIndexTable::builtin();
        assert!(matches!(
            table.index(Compound::Silicon, 399.0),
            Err(SaimError::InvalidInput(_))
        ));
        assert!(table.index(Compound::SiliconOxide, 901.0).is_err());
        assert!(table.index(Compound::Silicon, f64::NAN).is_err());
        assert_eq!(table.range(Compound::Silicon), Some((400.0, 900.0)));
    }

    #[test]
    fn test_lookups_are_memoized() {
        let table = RefractiveIndexTable::builtin();
        assert_eq!(table.cached_entries(), 0);
        table.index(Compound::Silicon, 488.0).unwrap();
        table.extinction(Compound::Silicon, 488.0).unwrap();
        table.index(Compound::SiliconOxide, 488.0).unwrap();
        assert_eq!(table.cached_entries(), 2);
    }

    #[test]
    fn test_with_samples() {
        let table = RefractiveIndexTable::builtin()
            .with_samples(
                Compound::SiliconOxide,
                vec![
                    IndexSample::new(700.0, 1.40, 0.0),
                    IndexSample::new(300.0, 1.50, 0.0),
                ],
            )
            .unwrap();
        assert_relative_eq!(
            table.index(Compound::SiliconOxide, 500.0).unwrap(),
            1.45,
            epsilon = 1e-12
        );
        assert_eq!(table.range(Compound::SiliconOxide), Some((300.0, 700.0)));

        assert!(RefractiveIndexTable::builtin()
            .with_samples(Compound::Silicon, Vec::new())
            .is_err());
        assert!(RefractiveIndexTable::builtin()
            .with_samples(
                Compound::Silicon,
                vec![IndexSample::new(500.0, 4.0, 0.0), IndexSample::new(500.0, 4.1, 0.0)]
            )
            .is_err());
    }
}
