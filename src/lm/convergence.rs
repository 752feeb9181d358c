//! Stopping rules for the Levenberg-Marquardt iteration.
//!
//! An accepted step either converges on one of three tolerances, keeps the
//! iteration going, or ends the fit with an error: a non-finite cost is a
//! [`SaimError::ConvergenceFailure`] and an exhausted budget is
//! [`SaimError::IterationLimitExceeded`].

use super::config::LmConfig;
use crate::error::{Result, SaimError};
use ndarray::Array1;

/// The tolerance that ended a converged fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// Largest relative parameter change below `xtol`
    Step,
    /// Relative cost change below `ftol`
    Cost,
    /// Scaled gradient below `gtol`
    Gradient,
}

/// Tolerances and iteration budget of one minimization.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceCriteria {
    pub xtol: f64,
    pub ftol: f64,
    pub gtol: f64,
    pub max_iterations: usize,
}

impl ConvergenceCriteria {
    pub fn from_config(config: &LmConfig) -> Self {
        Self {
            xtol: config.xtol,
            ftol: config.ftol,
            gtol: config.gtol,
            max_iterations: config.max_iterations,
        }
    }

    /// Largest parameter change relative to the parameter magnitude (floored at 1).
    pub fn relative_step(params: &Array1<f64>, new_params: &Array1<f64>) -> f64 {
        new_params
            .iter()
            .zip(params.iter())
            .map(|(a, b)| (a - b).abs() / b.abs().max(1.0))
            .fold(0.0, f64::max)
    }

    pub fn step_converged(&self, params: &Array1<f64>, new_params: &Array1<f64>) -> bool {
        Self::relative_step(params, new_params) < self.xtol
    }

    pub fn gradient_converged(&self, gradient_norm: f64) -> bool {
        gradient_norm < self.gtol
    }

    /// Judge an accepted step from `params` (cost `cost`) to `new_params`.
    ///
    /// Tolerances are tested before the budget, so a step that converges on
    /// the last allowed iteration still counts. `Ok(None)` means keep going.
    pub fn check(
        &self,
        params: &Array1<f64>,
        new_params: &Array1<f64>,
        cost: f64,
        new_cost: f64,
        gradient_norm: f64,
        iterations: usize,
    ) -> Result<Option<Convergence>> {
        if !new_cost.is_finite() || new_params.iter().any(|p| !p.is_finite()) {
            return Err(SaimError::ConvergenceFailure(format!(
                "Non-finite cost {} after iteration {}",
                new_cost, iterations
            )));
        }

        if self.gradient_converged(gradient_norm) {
            return Ok(Some(Convergence::Gradient));
        }
        if self.step_converged(params, new_params) {
            return Ok(Some(Convergence::Step));
        }
        if (cost - new_cost).abs() / cost.max(1e-10) < self.ftol {
            return Ok(Some(Convergence::Cost));
        }

        if iterations >= self.max_iterations {
            return Err(SaimError::IterationLimitExceeded { iterations });
        }
        Ok(None)
    }
}
