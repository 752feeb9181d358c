//! Goodness of fit.

use crate::error::{Result, SaimError};
use crate::observation::ObservationSet;

/// Coefficient of determination `1 − Σ(o−p)² / Σ(o−ō)²`.
///
/// Not clamped: a fit worse than the mean gives a negative value, and a
/// constant observed series gives NaN or −∞.
pub fn r_squared_values(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    if observed.len() != predicted.len() {
        return Err(SaimError::InvalidInput(format!(
            "Observed and predicted sets differ in size: {} vs {}",
            observed.len(),
            predicted.len()
        )));
    }

    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    let total: f64 = observed.iter().map(|o| (o - mean).powi(2)).sum();
    let residual: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| (o - p).powi(2))
        .sum();

    Ok(1.0 - residual / total)
}

/// [`r_squared_values`] on the intensities of two observation sets.
pub fn r_squared(observed: &ObservationSet, predicted: &ObservationSet) -> Result<f64> {
    r_squared_values(&observed.intensities(), &predicted.intensities())
}
