//! The SAIM intensity model and its analytic Jacobian.
//!
//! `I(θ) = A·[1 + 2c·cos φ − 2d·sin φ + c² + d²] + B`, where `c + i·d` is the TE
//! reflection coefficient of the oxide stack and `φ` the phase difference at
//! height `h`. The reflection coefficient depends on the angle only and is
//! the expensive part, so it is cached per angle inside the model.

use crate::config::FitConfiguration;
use crate::error::Result;
use crate::observation::ObservationSet;
use crate::optics::fresnel::OxideStack;
use crate::optics::refractive_index::RefractiveIndexTable;
use num_complex::Complex64;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::f64::consts::PI;

/// Intensity model for one run geometry.
///
/// Not `Sync`: each fitter owns its model, and each worker its fitter.
#[derive(Debug)]
pub struct OpticalModel {
    stack: OxideStack,
    use_b_angle: bool,
    reflection_cache: RefCell<HashMap<u64, Complex64>>,
    evaluations: Cell<usize>,
}

/// Per-angle quantities shared by the intensity and the Jacobian.
struct Terms {
    c: f64,
    d: f64,
    phase: f64,
    /// ∂φ/∂h
    phase_rate: f64,
}

impl OpticalModel {
    /// Build a model; substrate indices are looked up once here.
    pub fn new(
        table: &RefractiveIndexTable,
        wavelength: f64,
        n_sample: f64,
        oxide_thickness: f64,
        use_b_angle: bool,
    ) -> Result<Self> {
        Ok(Self::with_stack(
            OxideStack::from_table(table, wavelength, n_sample, oxide_thickness)?,
            use_b_angle,
        ))
    }

    pub fn from_config(config: &FitConfiguration, table: &RefractiveIndexTable) -> Result<Self> {
        Self::new(
            table,
            config.wavelength,
            config.sample_index,
            config.oxide_thickness,
            config.use_b_angle,
        )
    }

    pub fn with_stack(stack: OxideStack, use_b_angle: bool) -> Self {
        Self {
            stack,
            use_b_angle,
            reflection_cache: RefCell::new(HashMap::new()),
            evaluations: Cell::new(0),
        }
    }

    pub fn stack(&self) -> &OxideStack {
        &self.stack
    }

    /// Whether the background derivative is suppressed.
    pub fn use_b_angle(&self) -> bool {
        self.use_b_angle
    }

    /// Cached TE reflection coefficient at `angle` (radians).
    pub fn reflection(&self, angle: f64) -> Complex64 {
        *self
            .reflection_cache
            .borrow_mut()
            .entry(angle.to_bits())
            .or_insert_with(|| self.stack.reflection_te(angle))
    }

    fn terms(&self, angle: f64, height: f64) -> Terms {
        let r = self.reflection(angle);
        let phase_rate = 4.0 * PI * self.stack.n_sample * angle.cos() / self.stack.wavelength;
        Terms {
            c: r.re,
            d: r.im,
            phase: phase_rate * height,
            phase_rate,
        }
    }

    fn field(terms: &Terms) -> f64 {
        let (sin_phi, cos_phi) = terms.phase.sin_cos();
        1.0 + 2.0 * terms.c * cos_phi - 2.0 * terms.d * sin_phi + terms.c * terms.c
            + terms.d * terms.d
    }

    /// Predicted intensity `A·val + B` at `angle` (radians).
    pub fn intensity(&self, angle: f64, amplitude: f64, background: f64, height: f64) -> f64 {
        self.evaluations.set(self.evaluations.get() + 1);
        amplitude * Self::field(&self.terms(angle, height)) + background
    }

    /// Gradient of [`OpticalModel::intensity`] with respect to `[A, B, h]`.
    ///
    /// With B·angle mode on, the B derivative is 0 and B stays at its start value.
    pub fn jacobian(&self, angle: f64, amplitude: f64, _background: f64, height: f64) -> [f64; 3] {
        let terms = self.terms(angle, height);
        let (sin_phi, cos_phi) = terms.phase.sin_cos();

        let d_amplitude = Self::field(&terms);
        let d_background = if self.use_b_angle { 0.0 } else { 1.0 };
        let d_height =
            -2.0 * amplitude * terms.phase_rate * (terms.c * sin_phi + terms.d * cos_phi);

        [d_amplitude, d_background, d_height]
    }

    /// Predicted intensities for every observation, in order.
    pub fn predict(
        &self,
        observations: &ObservationSet,
        amplitude: f64,
        background: f64,
        height: f64,
    ) -> Vec<f64> {
        observations
            .iter()
            .map(|o| self.intensity(o.angle_radians(), amplitude, background, height))
            .collect()
    }

    /// Number of intensity evaluations so far.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.get()
    }

    /// Number of distinct angles with a cached reflection coefficient.
    pub fn cached_angles(&self) -> usize {
        self.reflection_cache.borrow().len()
    }
}
