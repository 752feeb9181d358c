//! Finite difference methods for numerical differentiation.
//!
//! Used as the fallback Jacobian of [`Problem`] and to cross-check the
//! analytic derivatives of the optical model.

use crate::error::{Result, SaimError};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Default relative step size for central differences.
const DEFAULT_EPSILON: f64 = 1e-6;

/// Compute the Jacobian matrix using central finite differences.
///
/// J[i,j] = ∂residual[i]/∂param[j]. The step for each parameter scales with
/// its magnitude so that amplitudes in the thousands and heights in the tens
/// of nanometres are perturbed comparably.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The relative step size (optional)
pub fn jacobian<P: Problem + ?Sized>(
    problem: &P,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let eps_j = if params[j].abs() > 1.0 {
            params[j].abs() * eps
        } else {
            eps
        };

        let mut forward = params.clone();
        forward[j] += eps_j;
        let mut backward = params.clone();
        backward[j] -= eps_j;

        let r_forward = problem.eval(&forward)?;
        let r_backward = problem.eval(&backward)?;

        if r_forward.len() != n_residuals || r_backward.len() != n_residuals {
            return Err(SaimError::InvalidInput(format!(
                "Expected {} residuals, got {}",
                n_residuals,
                r_forward.len()
            )));
        }

        for i in 0..n_residuals {
            jac[[i, j]] = (r_forward[i] - r_backward[i]) / (2.0 * eps_j);
        }
    }

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    struct Quadratic;

    impl Problem for Quadratic {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(array![params[0] * params[0], params[0] * params[1]])
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_central_difference_jacobian() {
        let jac = jacobian(&Quadratic, &array![3.0, 2.0], None).unwrap();
        assert_relative_eq!(jac[[0, 0]], 6.0, epsilon = 1e-6);
        assert_relative_eq!(jac[[0, 1]], 0.0, epsilon = 1e-6);
        assert_relative_eq!(jac[[1, 0]], 2.0, epsilon = 1e-6);
        assert_relative_eq!(jac[[1, 1]], 3.0, epsilon = 1e-6);
    }
}
