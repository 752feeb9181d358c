//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ndarray::Array3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use saim_fit::{
    FitConfiguration, FitParameters, Observation, ObservationSet, OpticalModel,
    RefractiveIndexTable,
};
use std::sync::Arc;

/// Parameters used throughout the tests.
pub const TRUTH: FitParameters = FitParameters {
    amplitude: 1000.0,
    background: 5000.0,
    height: 75.0,
};

pub fn table() -> Arc<RefractiveIndexTable> {
    Arc::new(RefractiveIndexTable::builtin())
}

/// Model for 488 nm, n = 1.36 and 500 nm of oxide.
pub fn model() -> OpticalModel {
    OpticalModel::new(&RefractiveIndexTable::builtin(), 488.0, 1.36, 500.0, false).unwrap()
}

/// Noiseless observations at -50°..=50° in 1° steps.
pub fn synthetic_observations(model: &OpticalModel, truth: FitParameters) -> ObservationSet {
    (-50..=50)
        .map(|degrees| {
            let angle = f64::from(degrees);
            Observation::new(
                angle,
                model.intensity(
                    angle.to_radians(),
                    truth.amplitude,
                    truth.background,
                    truth.height,
                ),
            )
        })
        .collect()
}

/// Multiply every intensity by `1 + (u - 0.5) * factor` with `u` uniform in [0, 1).
pub fn with_noise(observations: &ObservationSet, factor: f64, seed: u64) -> ObservationSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let uniform = Uniform::new(0.0, 1.0);
    observations
        .iter()
        .map(|o| {
            let u: f64 = uniform.sample(&mut rng);
            Observation::new(o.angle_degrees(), o.intensity() * (1.0 + (u - 0.5) * factor))
        })
        .collect()
}

/// `(slice, y, x)` stack for the plain scan of `config`, one slice per angle.
///
/// `pixel(x, y)` gives the parameters of each pixel, or `None` for a dark
/// pixel at intensity 0.
pub fn synthetic_stack<F>(
    config: &FitConfiguration,
    slices: usize,
    width: usize,
    rows: usize,
    pixel: F,
) -> Array3<f64>
where
    F: Fn(usize, usize) -> Option<FitParameters>,
{
    let model = OpticalModel::from_config(config, &RefractiveIndexTable::builtin()).unwrap();
    Array3::from_shape_fn((slices, rows, width), |(slice, y, x)| match pixel(x, y) {
        Some(p) => {
            let angle = (config.first_angle + slice as f64 * config.angle_step).to_radians();
            model.intensity(angle, p.amplitude, p.background, p.height)
        }
        None => 0.0,
    })
}
