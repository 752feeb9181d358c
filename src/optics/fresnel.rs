//! Thin-film optics of the sample / oxide / silicon stack.
//!
//! Angles are in radians, lengths and wavelengths in nanometres.

use super::refractive_index::{Compound, RefractiveIndexTable};
use crate::error::Result;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Refraction angle in medium 2 for light leaving medium 1 at `angle1` (Snell's law).
pub fn snell(angle1: f64, n1: f64, n2: f64) -> f64 {
    (n1 * angle1.sin() / n2).asin()
}

/// Angular wavenumber `2πn/λ` in radians per nm.
pub fn wavenumber(wavelength: f64, n: f64) -> f64 {
    2.0 * PI * n / wavelength
}

/// Phase difference between direct and reflected light at `height` above the oxide.
pub fn phase_difference(wavelength: f64, angle: f64, n_sample: f64, height: f64) -> f64 {
    4.0 * PI * n_sample * height * angle.cos() / wavelength
}

/// Reference intensity `|1 + r·e^{iφ}|²` of the standing wave.
pub fn field_intensity(r: Complex64, phase: f64) -> f64 {
    (Complex64::new(1.0, 0.0) + r * Complex64::from_polar(1.0, phase)).norm_sqr()
}

/// Sample medium on a silicon oxide film grown on silicon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OxideStack {
    /// Excitation wavelength in nm
    pub wavelength: f64,
    /// Refractive index of the sample medium
    pub n_sample: f64,
    /// Refractive index of the oxide film
    pub n_oxide: f64,
    /// Refractive index of the silicon substrate
    pub n_silicon: f64,
    /// Oxide thickness in nm
    pub oxide_thickness: f64,
}

impl OxideStack {
    /// Look the substrate indices up once for a fixed wavelength.
    pub fn from_table(
        table: &RefractiveIndexTable,
        wavelength: f64,
        n_sample: f64,
        oxide_thickness: f64,
    ) -> Result<Self> {
        Ok(Self {
            wavelength,
            n_sample,
            n_oxide: table.index(Compound::SiliconOxide, wavelength)?,
            n_silicon: table.index(Compound::Silicon, wavelength)?,
            oxide_thickness,
        })
    }

    /// TE reflection coefficient of the oxide/silicon stack seen from the sample.
    ///
    /// Characteristic-matrix form with the corrected sign:
    /// `r = [(m11 + m12·p0)·p2 − (m21 + m22·p0)] / [(m11 + m12·p0)·p2 + (m21 + m22·p0)]`.
    pub fn reflection_te(&self, angle: f64) -> Complex64 {
        let angle_ox = snell(angle, self.n_sample, self.n_oxide);
        let angle_si = snell(angle_ox, self.n_oxide, self.n_silicon);
        let cos_ox = angle_ox.cos();

        let p0 = self.n_silicon * angle_si.cos();
        let p1 = self.n_oxide * cos_ox;
        let p2 = self.n_sample * angle.cos();

        let beta = wavenumber(self.wavelength, self.n_oxide) * self.oxide_thickness * cos_ox;
        let (sin_beta, cos_beta) = beta.sin_cos();

        let m11 = Complex64::new(cos_beta, 0.0);
        let m12 = Complex64::new(0.0, -sin_beta / p1);
        let m21 = Complex64::new(0.0, -p1 * sin_beta);
        let m22 = Complex64::new(cos_beta, 0.0);

        let incoming = (m11 + m12 * p0) * p2;
        let outgoing = m21 + m22 * p0;
        (incoming - outgoing) / (incoming + outgoing)
    }

    /// Intensity at `height` for incidence `angle`, through the complex path.
    pub fn field_intensity(&self, angle: f64, height: f64) -> f64 {
        field_intensity(
            self.reflection_te(angle),
            phase_difference(self.wavelength, angle, self.n_sample, height),
        )
    }
}
