//! Step calculation for the Levenberg-Marquardt algorithm.
//!
//! This module provides functionality for computing the Levenberg-Marquardt step,
//! which combines the Gauss-Newton and gradient descent steps.

use crate::error::{Result, SaimError};
use crate::lm::trust_region::TrustRegion;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

/// Floor for the Marquardt scaling of a parameter with a zero Jacobian column.
const MIN_DIAGONAL: f64 = 1e-10;

/// Result of a Levenberg-Marquardt step calculation.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The calculated step vector
    pub step: Array1<f64>,

    /// The predicted reduction in the sum of squared residuals
    pub predicted_reduction: f64,

    /// The damping parameter used to calculate the step
    pub lambda: f64,
}

/// Handles step calculation for the Levenberg-Marquardt algorithm.
pub struct LmStep;

impl LmStep {
    /// Calculates the Levenberg-Marquardt step.
    ///
    /// Solves `(JᵀJ + λ·diag(JᵀJ))·δ = −Jᵀr` by Cholesky factorisation.
    ///
    /// # Arguments
    ///
    /// * `jacobian` - The Jacobian matrix at the current position
    /// * `residuals` - The residuals at the current position
    /// * `trust_region` - The trust region controller
    ///
    /// # Returns
    ///
    /// * The step result containing the step vector and other information
    pub fn calculate_step(
        jacobian: &Array2<f64>,
        residuals: &Array1<f64>,
        trust_region: &TrustRegion,
    ) -> Result<StepResult> {
        let j_t_j = jacobian.t().dot(jacobian);
        let j_t_r = jacobian.t().dot(residuals);

        let mut augmented = j_t_j.clone();
        for i in 0..augmented.nrows() {
            augmented[[i, i]] += trust_region.lambda * j_t_j[[i, i]].max(MIN_DIAGONAL);
        }

        let step = Self::solve_cholesky(&augmented, &-&j_t_r)?;
        let predicted_reduction = Self::predicted_reduction(&j_t_j, &j_t_r, &step);

        Ok(StepResult {
            step,
            predicted_reduction,
            lambda: trust_region.lambda,
        })
    }

    /// Solves the linear system A * x = b using Cholesky decomposition.
    ///
    /// Fails with [`SaimError::ConvergenceFailure`] if `a` is not positive definite.
    pub fn solve_cholesky(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
        let n = a.nrows();
        if a.ncols() != n || b.len() != n {
            return Err(SaimError::InvalidInput(format!(
                "Cholesky solve needs a square system, got {:?} and {}",
                a.shape(),
                b.len()
            )));
        }

        let a_na = DMatrix::from_fn(n, n, |i, j| a[[i, j]]);
        let b_na = DVector::from_iterator(n, b.iter().copied());

        let cholesky = a_na.cholesky().ok_or_else(|| {
            SaimError::ConvergenceFailure(
                "Cholesky decomposition failed - matrix not positive definite".to_string(),
            )
        })?;

        Ok(cholesky.solve(&b_na).iter().copied().collect())
    }

    /// Predicted reduction of `Σr²` under the linearised model `r + Jδ`.
    ///
    /// `‖r‖² − ‖r + Jδ‖² = −(2·gᵀδ + δᵀ·JᵀJ·δ)` with `g = Jᵀr`.
    fn predicted_reduction(j_t_j: &Array2<f64>, j_t_r: &Array1<f64>, step: &Array1<f64>) -> f64 {
        -(2.0 * step.dot(j_t_r) + step.dot(&j_t_j.dot(step)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_solve_cholesky() {
        let a = array![[4.0, 2.0, 0.6], [2.0, 5.0, 1.0], [0.6, 1.0, 3.0]];
        let x_true = array![1.0, -2.0, 0.5];
        let b = a.dot(&x_true);

        let x = LmStep::solve_cholesky(&a, &b).unwrap();
        for i in 0..3 {
            assert_relative_eq!(x[i], x_true[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_solve_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        let err = LmStep::solve_cholesky(&a, &array![1.0, 1.0]).unwrap_err();
        assert!(matches!(err, SaimError::ConvergenceFailure(_)));
    }

    #[test]
    fn test_step_predicts_positive_reduction() {
        let jacobian = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let residuals = array![1.0, -0.5, 2.0];
        let tr = TrustRegion::new();

        let result = LmStep::calculate_step(&jacobian, &residuals, &tr).unwrap();
        assert!(result.predicted_reduction > 0.0);
        assert_relative_eq!(result.lambda, 1e-3);

        // A step that solves the linear problem exactly predicts the whole linear
        // part of the cost away
        let undamped = TrustRegion {
            lambda: 0.0,
            ..TrustRegion::default()
        };
        let exact = LmStep::calculate_step(&jacobian, &residuals, &undamped).unwrap();
        let after = &residuals + &jacobian.dot(&exact.step);
        let actual = residuals.dot(&residuals) - after.dot(&after);
        assert_relative_eq!(exact.predicted_reduction, actual, epsilon = 1e-10);
    }

    #[test]
    fn test_zero_jacobian_column_gives_zero_step() {
        let jacobian = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let residuals = array![1.0, 1.0, 1.0];
        let tr = TrustRegion::new();

        let result = LmStep::calculate_step(&jacobian, &residuals, &tr).unwrap();
        assert_eq!(result.step[1], 0.0);
    }
}
