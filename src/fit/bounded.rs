//! Derivative-free fitting inside a parameter box.
//!
//! Minimizes the weighted sum of absolute residuals with a restarted
//! Nelder-Mead simplex. Every trial vertex is clamped into the bounds first.

use super::{FitParameters, FittingStrategy};
use crate::bounds::{Bounds, ParameterBounds};
use crate::error::Result;
use crate::model::OpticalModel;
use crate::observation::ObservationSet;
use crate::simplex::NelderMead;
use ndarray::Array1;

/// Fits `(A, B, h)` by minimizing `Σ w·|observed − model|` inside a box.
#[derive(Debug)]
pub struct BoundedCurveFitter {
    model: OpticalModel,
    bounds: ParameterBounds,
    simplex: NelderMead,
}

impl BoundedCurveFitter {
    pub fn new(model: OpticalModel, bounds: ParameterBounds) -> Self {
        Self {
            model,
            bounds,
            simplex: NelderMead::default(),
        }
    }

    pub fn with_simplex(mut self, simplex: NelderMead) -> Self {
        self.simplex = simplex;
        self
    }

    pub fn bounds(&self) -> &ParameterBounds {
        &self.bounds
    }

    /// Fit inside explicit `[A, B, h]` bounds; each slice must hold 3 entries.
    pub fn fit_bounded(
        &self,
        observations: &ObservationSet,
        guess: FitParameters,
        lower: &[f64],
        upper: &[f64],
    ) -> Result<FitParameters> {
        let bounds = ParameterBounds::new(lower, upper)?;
        self.fit_within(observations, guess, bounds)
    }

    fn fit_within(
        &self,
        observations: &ObservationSet,
        guess: FitParameters,
        mut bounds: ParameterBounds,
    ) -> Result<FitParameters> {
        if self.model.use_b_angle() {
            // Background is held at its start value, as in the gradient fitter
            let background = bounds.background.clamp(guess.background);
            bounds.background = Bounds {
                min: background,
                max: background,
            };
        }

        let points = observations.weighted_points();
        let objective = |params: &Array1<f64>| -> Result<f64> {
            let (a, b, h) = (params[0], params[1], params[2]);
            Ok(points
                .iter()
                .map(|p| p.weight * (p.y - self.model.intensity(p.x, a, b, h)).abs())
                .sum())
        };

        let result = self
            .simplex
            .minimize(&objective, guess.to_array(), Some(&bounds))?;
        FitParameters::from_array(&result.params)
    }

    /// Number of model evaluations made by this fitter.
    pub fn evaluation_count(&self) -> usize {
        self.model.evaluation_count()
    }
}

impl FittingStrategy for BoundedCurveFitter {
    fn fit(&self, observations: &ObservationSet, guess: FitParameters) -> Result<FitParameters> {
        self.fit_within(observations, guess, self.bounds)
    }

    fn model(&self) -> &OpticalModel {
        &self.model
    }

    fn name(&self) -> &'static str {
        "bounded"
    }
}
