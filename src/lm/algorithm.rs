//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core iteration: Marquardt-scaled damped normal
//! equations, a gain-ratio lambda update and the stopping rules of
//! [`ConvergenceCriteria`].

use ndarray::{Array1, Array2};

use crate::error::{Result, SaimError};
use crate::problem::Problem;

use super::config::LmConfig;
use super::convergence::{Convergence, ConvergenceCriteria};
use super::step::LmStep;
use super::trust_region::TrustRegion;

/// Result of a converged Levenberg-Marquardt minimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// The tolerance that stopped the iteration
    pub convergence: Convergence,
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    ///
    /// # Returns
    ///
    /// * The converged result, [`SaimError::IterationLimitExceeded`] when the
    ///   iteration budget runs out, or [`SaimError::ConvergenceFailure`] when
    ///   the damping saturates without progress
    pub fn minimize<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(SaimError::InvalidInput(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let criteria = ConvergenceCriteria::from_config(&self.config);
        let mut trust_region = TrustRegion::from_config(&self.config);

        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        let mut cost = sum_of_squares(&residuals);

        if !cost.is_finite() {
            return Err(SaimError::ConvergenceFailure(
                "Non-finite cost at the initial parameters".to_string(),
            ));
        }

        let mut jacobian = problem.jacobian(&params)?;
        let mut iterations = 0;

        loop {
            let gradient = jacobian.t().dot(&residuals);
            let gradient_norm = scaled_gradient_norm(&jacobian, &gradient, cost);
            if criteria.gradient_converged(gradient_norm) {
                return Ok(LmResult {
                    params,
                    cost,
                    iterations,
                    convergence: Convergence::Gradient,
                });
            }

            if iterations >= criteria.max_iterations {
                return Err(SaimError::IterationLimitExceeded { iterations });
            }
            iterations += 1;

            let step = match LmStep::calculate_step(&jacobian, &residuals, &trust_region) {
                Ok(step) => step,
                Err(_) if !trust_region.is_saturated() => {
                    trust_region.update_lambda(f64::NEG_INFINITY);
                    continue;
                }
                Err(err) => return Err(err),
            };

            let new_params = &params + &step.step;
            let new_residuals = problem.eval(&new_params)?;
            let new_cost = sum_of_squares(&new_residuals);

            let gain = TrustRegion::gain_ratio(cost, new_cost, step.predicted_reduction);
            if trust_region.update_lambda(gain) {
                let converged = criteria.check(
                    &params,
                    &new_params,
                    cost,
                    new_cost,
                    gradient_norm,
                    iterations,
                )?;

                params = new_params;
                residuals = new_residuals;
                cost = new_cost;

                if let Some(convergence) = converged {
                    return Ok(LmResult {
                        params,
                        cost,
                        iterations,
                        convergence,
                    });
                }

                jacobian = problem.jacobian(&params)?;
            } else if trust_region.is_saturated() {
                // A step this heavily damped that still changes nothing means
                // we are sitting on the minimum already.
                if criteria.step_converged(&params, &new_params) {
                    return Ok(LmResult {
                        params,
                        cost,
                        iterations,
                        convergence: Convergence::Step,
                    });
                }
                return Err(SaimError::ConvergenceFailure(format!(
                    "Damping reached {:.1e} without reducing the cost",
                    trust_region.lambda_max
                )));
            }
        }
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Largest cosine between a Jacobian column and the residual vector.
///
/// Scale-free, so the same `gtol` works for amplitudes of 1 and of 60 000.
/// Zero-norm columns (frozen parameters) are ignored.
fn scaled_gradient_norm(jacobian: &Array2<f64>, gradient: &Array1<f64>, cost: f64) -> f64 {
    if cost == 0.0 {
        return 0.0;
    }
    let residual_norm = cost.sqrt();
    jacobian
        .columns()
        .into_iter()
        .zip(gradient.iter())
        .filter_map(|(column, g)| {
            let column_norm = column.dot(&column).sqrt();
            (column_norm > 0.0).then(|| g.abs() / (column_norm * residual_norm))
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1, Array2};

    /// Straight line y = a * x + b with its exact Jacobian.
    struct LinearModel {
        x_data: Array1<f64>,
        y_data: Array1<f64>,
    }

    impl Problem for LinearModel {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(self
                .x_data
                .iter()
                .zip(self.y_data.iter())
                .map(|(x, y)| params[0] * x + params[1] - y)
                .collect())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x_data.len()
        }

        fn jacobian(&self, _params: &Array1<f64>) -> Result<Array2<f64>> {
            let mut jac = Array2::ones((self.x_data.len(), 2));
            jac.column_mut(0).assign(&self.x_data);
            Ok(jac)
        }
    }

    /// Exponential decay y = a * exp(-k x); Jacobian by finite differences.
    struct ExponentialModel {
        x_data: Array1<f64>,
        y_data: Array1<f64>,
    }

    impl Problem for ExponentialModel {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(self
                .x_data
                .iter()
                .zip(self.y_data.iter())
                .map(|(x, y)| params[0] * (-params[1] * x).exp() - y)
                .collect())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x_data.len()
        }
    }

    fn decay() -> ExponentialModel {
        let x = Array1::linspace(0.0, 4.0, 20);
        let y = x.mapv(|x: f64| 3.0 * (-0.7 * x).exp());
        ExponentialModel {
            x_data: x,
            y_data: y,
        }
    }

    #[test]
    fn test_noisy_linear_fit() {
        let model = LinearModel {
            x_data: array![1.0, 2.0, 3.0, 4.0, 5.0],
            y_data: array![5.1, 7.0, 8.9, 11.2, 13.0],
        };

        let result = LevenbergMarquardt::new()
            .minimize(&model, array![1.0, 1.0])
            .unwrap();
        assert_relative_eq!(result.params[0], 2.0, epsilon = 0.1);
        assert_relative_eq!(result.params[1], 3.0, epsilon = 0.1);
        assert!(result.cost < 0.1);
    }

    #[test]
    fn test_finite_difference_jacobian_fit() {
        let result = LevenbergMarquardt::new()
            .minimize(&decay(), array![1.0, 0.2])
            .unwrap();

        assert_relative_eq!(result.params[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(result.params[1], 0.7, epsilon = 1e-6);
    }

    #[test]
    fn test_iteration_limit() {
        let err = LevenbergMarquardt::new()
            .with_max_iterations(1)
            .minimize(&decay(), array![1.0, 0.2])
            .unwrap_err();
        assert!(matches!(err, SaimError::IterationLimitExceeded { iterations: 1 }));
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let err = LevenbergMarquardt::new()
            .minimize(&decay(), array![1.0])
            .unwrap_err();
        assert!(matches!(err, SaimError::InvalidInput(_)));
    }

    #[test]
    fn test_exact_start_converges_immediately() {
        let model = LinearModel {
            x_data: array![1.0, 2.0, 3.0],
            y_data: array![5.0, 7.0, 9.0],
        };
        let result = LevenbergMarquardt::new()
            .minimize(&model, array![2.0, 3.0])
            .unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(result.convergence, Convergence::Gradient);
    }
}
