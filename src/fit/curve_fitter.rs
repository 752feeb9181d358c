//! Gradient-based fitting through Levenberg-Marquardt.

use super::{FitParameters, FittingStrategy};
use crate::error::{Result, SaimError};
use crate::lm::LevenbergMarquardt;
use crate::model::OpticalModel;
use crate::observation::{ObservationSet, WeightedPoint};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Weighted least-squares problem over one observation set.
///
/// Residuals are `√w·(model − observed)`.
pub struct SaimProblem<'a> {
    model: &'a OpticalModel,
    points: Vec<WeightedPoint>,
}

impl<'a> SaimProblem<'a> {
    pub fn new(model: &'a OpticalModel, observations: &ObservationSet) -> Self {
        Self {
            model,
            points: observations.weighted_points(),
        }
    }

    fn check_params(params: &Array1<f64>) -> Result<()> {
        if params.len() != 3 {
            return Err(SaimError::InvalidInput(format!(
                "Expected 3 parameters, got {}",
                params.len()
            )));
        }
        Ok(())
    }
}

impl Problem for SaimProblem<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        Self::check_params(params)?;
        let (a, b, h) = (params[0], params[1], params[2]);

        Ok(self
            .points
            .iter()
            .map(|p| p.weight.sqrt() * (self.model.intensity(p.x, a, b, h) - p.y))
            .collect())
    }

    fn parameter_count(&self) -> usize {
        3
    }

    fn residual_count(&self) -> usize {
        self.points.len()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        Self::check_params(params)?;
        let (a, b, h) = (params[0], params[1], params[2]);

        let mut jac = Array2::zeros((self.points.len(), 3));
        for (i, p) in self.points.iter().enumerate() {
            let sqrt_w = p.weight.sqrt();
            let row = self.model.jacobian(p.x, a, b, h);
            for (j, value) in row.iter().enumerate() {
                jac[[i, j]] = sqrt_w * value;
            }
        }
        Ok(jac)
    }
}

/// Fits `(A, B, h)` by damped least squares with the analytic Jacobian.
#[derive(Debug)]
pub struct CurveFitter {
    model: OpticalModel,
    max_iterations: usize,
}

impl CurveFitter {
    pub fn new(model: OpticalModel, max_iterations: usize) -> Self {
        Self {
            model,
            max_iterations,
        }
    }

    /// Fit with an explicit iteration cap.
    ///
    /// Fails with `IterationLimitExceeded` when the cap is reached and with
    /// `ConvergenceFailure` when the damping saturates.
    pub fn fit_with_limit(
        &self,
        observations: &ObservationSet,
        guess: FitParameters,
        max_iterations: usize,
    ) -> Result<FitParameters> {
        if observations.len() < 3 {
            return Err(SaimError::InvalidInput(format!(
                "Need at least 3 observations to fit 3 parameters, got {}",
                observations.len()
            )));
        }

        let problem = SaimProblem::new(&self.model, observations);
        let result = LevenbergMarquardt::new()
            .with_max_iterations(max_iterations)
            .minimize(&problem, guess.to_array())?;

        FitParameters::from_array(&result.params)
    }

    /// Number of model evaluations made by this fitter.
    pub fn evaluation_count(&self) -> usize {
        self.model.evaluation_count()
    }
}

impl FittingStrategy for CurveFitter {
    fn fit(&self, observations: &ObservationSet, guess: FitParameters) -> Result<FitParameters> {
        self.fit_with_limit(observations, guess, self.max_iterations)
    }

    fn model(&self) -> &OpticalModel {
        &self.model
    }

    fn name(&self) -> &'static str {
        "gradient"
    }
}
