//! Fitting strategies and multi-candidate selection.
//!
//! Two strategies fit `(A, B, h)` to an [`ObservationSet`]:
//!
//! - [`CurveFitter`]: weighted least squares through Levenberg-Marquardt
//! - [`BoundedCurveFitter`]: sum of absolute residuals through a clamped simplex
//!
//! Both implement [`FittingStrategy`], and [`FitterKind`] picks one at run time.
//! [`fit_candidates`] runs a strategy once per starting height and
//! [`select_best`] keeps the candidate with the highest R².

pub mod bounded;
pub mod curve_fitter;
pub mod goodness;

pub use bounded::BoundedCurveFitter;
pub use curve_fitter::{CurveFitter, SaimProblem};
pub use goodness::{r_squared, r_squared_values};

use crate::config::FitConfiguration;
use crate::error::{Result, SaimError};
use crate::model::OpticalModel;
use crate::observation::ObservationSet;
use crate::optics::RefractiveIndexTable;
use ndarray::{array, Array1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// The three fitted quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParameters {
    pub amplitude: f64,
    pub background: f64,
    /// Height above the oxide in nm
    pub height: f64,
}

impl FitParameters {
    pub fn new(amplitude: f64, background: f64, height: f64) -> Self {
        Self {
            amplitude,
            background,
            height,
        }
    }

    /// `[A, B, h]`
    pub fn to_array(&self) -> Array1<f64> {
        array![self.amplitude, self.background, self.height]
    }

    pub fn from_array(params: &Array1<f64>) -> Result<Self> {
        if params.len() != 3 {
            return Err(SaimError::InvalidInput(format!(
                "Expected 3 parameters [A, B, h], got {}",
                params.len()
            )));
        }
        Ok(Self::new(params[0], params[1], params[2]))
    }
}

/// Fitted parameters of one pixel together with their R².
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub height: f64,
    pub r_squared: f64,
    pub amplitude: f64,
    pub background: f64,
}

impl FitResult {
    pub fn new(params: FitParameters, r_squared: f64) -> Self {
        Self {
            height: params.height,
            r_squared,
            amplitude: params.amplitude,
            background: params.background,
        }
    }

    /// Sentinel for a pixel where no candidate converged.
    pub fn failed() -> Self {
        Self {
            height: f64::NAN,
            r_squared: f64::NAN,
            amplitude: f64::NAN,
            background: f64::NAN,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.height.is_nan()
            && self.r_squared.is_nan()
            && self.amplitude.is_nan()
            && self.background.is_nan()
    }

    pub fn parameters(&self) -> FitParameters {
        FitParameters::new(self.amplitude, self.background, self.height)
    }
}

/// A way of fitting the intensity model to one observation set.
///
/// Implementors own their [`OpticalModel`], so a strategy is `Send` but not
/// `Sync`; every worker builds its own.
pub trait FittingStrategy: Send {
    /// Fit starting from `guess`.
    fn fit(&self, observations: &ObservationSet, guess: FitParameters) -> Result<FitParameters>;

    /// The model used for fitting and prediction.
    fn model(&self) -> &OpticalModel;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Model intensities at the angles of `observations`.
    fn predict(&self, observations: &ObservationSet, params: FitParameters) -> Vec<f64> {
        self.model().predict(
            observations,
            params.amplitude,
            params.background,
            params.height,
        )
    }
}

/// Selects the fitting strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitterKind {
    /// Levenberg-Marquardt on squared residuals
    #[default]
    Gradient,
    /// Bounded simplex on absolute residuals
    Bounded,
}

impl FitterKind {
    /// Build a strategy with its own model for one worker.
    pub fn build(
        self,
        config: &FitConfiguration,
        table: &RefractiveIndexTable,
    ) -> Result<Box<dyn FittingStrategy>> {
        let model = OpticalModel::from_config(config, table)?;
        Ok(match self {
            FitterKind::Gradient => Box::new(CurveFitter::new(model, config.max_iterations)),
            FitterKind::Bounded => Box::new(BoundedCurveFitter::new(model, config.bounds)),
        })
    }
}

/// Result of fitting from one starting height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateOutcome {
    pub start_height: f64,
    pub result: FitResult,
    /// False when the fitter gave up; `result.r_squared` is then 0
    pub converged: bool,
}

/// Fit once per starting height in `heights`, from `(a0, b0, height)`.
///
/// A candidate whose fit fails, or whose R² is not finite, is kept with
/// R² = 0 and `converged == false`.
pub fn fit_candidates(
    strategy: &dyn FittingStrategy,
    observations: &ObservationSet,
    a0: f64,
    b0: f64,
    heights: &[f64],
) -> Vec<CandidateOutcome> {
    heights
        .iter()
        .map(|&start_height| {
            let guess = FitParameters::new(a0, b0, start_height);
            let fitted = strategy.fit(observations, guess).and_then(|params| {
                let predicted = strategy.predict(observations, params);
                let r2 = r_squared_values(&observations.intensities(), &predicted)?;
                // Flat data has no variance to explain
                if !r2.is_finite() {
                    return Err(SaimError::ConvergenceFailure(format!(
                        "R² is {} for the fit from h = {}",
                        r2, start_height
                    )));
                }
                Ok(FitResult::new(params, r2))
            });

            match fitted {
                Ok(result) => CandidateOutcome {
                    start_height,
                    result,
                    converged: true,
                },
                Err(err) => {
                    if err.is_non_convergence() {
                        debug!(
                            "{} fit from h = {} did not converge: {}",
                            strategy.name(),
                            start_height,
                            err
                        );
                    } else {
                        warn!(
                            "{} fit from h = {} failed: {}",
                            strategy.name(),
                            start_height,
                            err
                        );
                    }
                    CandidateOutcome {
                        start_height,
                        result: FitResult::new(guess, 0.0),
                        converged: false,
                    }
                }
            }
        })
        .collect()
}

// NaN sorts below every number
fn by_r_squared(a: &FitResult, b: &FitResult) -> Ordering {
    match (a.r_squared.is_nan(), b.r_squared.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.r_squared.total_cmp(&b.r_squared),
    }
}

/// Converged candidate with the highest R², or [`FitResult::failed`].
///
/// Ties go to the earliest candidate.
pub fn select_best(outcomes: &[CandidateOutcome]) -> FitResult {
    outcomes
        .iter()
        .filter(|outcome| outcome.converged)
        .map(|outcome| outcome.result)
        .fold(None, |best: Option<FitResult>, candidate| match best {
            Some(best) if by_r_squared(&candidate, &best) != Ordering::Greater => Some(best),
            _ => Some(candidate),
        })
        .unwrap_or_else(FitResult::failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;
    use approx::assert_relative_eq;

    fn outcome(r_squared: f64, converged: bool) -> CandidateOutcome {
        CandidateOutcome {
            start_height: 0.0,
            result: FitResult::new(FitParameters::new(1.0, 2.0, r_squared), r_squared),
            converged,
        }
    }

    #[test]
    fn test_parameters_array_roundtrip() {
        let params = FitParameters::new(1000.0, 5000.0, 75.0);
        assert_eq!(FitParameters::from_array(&params.to_array()).unwrap(), params);
        assert!(FitParameters::from_array(&array![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_failed_sentinel() {
        let failed = FitResult::failed();
        assert!(failed.is_failed());
        assert!(!FitResult::new(FitParameters::new(1.0, 1.0, 1.0), 0.5).is_failed());
    }

    #[test]
    fn test_select_best_picks_max_r_squared() {
        let best = select_best(&[outcome(0.4, true), outcome(0.9, true), outcome(0.7, true)]);
        assert_eq!(best.r_squared, 0.9);
    }

    #[test]
    fn test_select_best_skips_failed_and_nan() {
        let best = select_best(&[outcome(f64::NAN, true), outcome(0.0, false), outcome(-0.5, true)]);
        assert_eq!(best.r_squared, -0.5);

        assert!(select_best(&[outcome(0.0, false), outcome(0.0, false)]).is_failed());
        assert!(select_best(&[]).is_failed());
    }

    #[test]
    fn test_select_best_keeps_first_on_tie() {
        let mut first = outcome(0.8, true);
        first.result.height = 10.0;
        let mut second = outcome(0.8, true);
        second.result.height = 20.0;
        assert_eq!(select_best(&[first, second]).height, 10.0);
    }

    #[test]
    fn test_fitter_kind_builds_each_strategy() {
        let config = FitConfiguration::default();
        let table = RefractiveIndexTable::builtin();
        assert_eq!(FitterKind::Gradient.build(&config, &table).unwrap().name(), "gradient");
        assert_eq!(FitterKind::Bounded.build(&config, &table).unwrap().name(), "bounded");
    }

    #[test]
    fn test_failed_candidate_gets_zero_r_squared() {
        let table = RefractiveIndexTable::builtin();
        let strategy = FitterKind::Gradient
            .build(&FitConfiguration::default(), &table)
            .unwrap();
        // Two points cannot determine three parameters
        let observations: ObservationSet = [Observation::new(0.0, 1.0), Observation::new(1.0, 2.0)]
            .into_iter()
            .collect();

        let outcomes = fit_candidates(strategy.as_ref(), &observations, 1000.0, 5000.0, &[75.0]);
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].converged);
        assert_relative_eq!(outcomes[0].result.r_squared, 0.0);
        assert!(select_best(&outcomes).is_failed());
    }

    #[test]
    fn test_flat_data_is_not_a_converged_candidate() {
        let table = RefractiveIndexTable::builtin();
        let strategy = FitterKind::Gradient
            .build(&FitConfiguration::default(), &table)
            .unwrap();
        // A saturated pixel: every angle reads the same value
        let observations: ObservationSet = (-50..=50)
            .map(|degrees| Observation::new(f64::from(degrees), 60000.0))
            .collect();

        let outcomes =
            fit_candidates(strategy.as_ref(), &observations, 1000.0, 5000.0, &[80.0, 200.0]);
        assert!(outcomes.iter().all(|o| !o.converged));
        assert!(outcomes.iter().all(|o| o.result.r_squared == 0.0));
        assert!(select_best(&outcomes).is_failed());
    }
}
