//! Trust region implementation for the Levenberg-Marquardt algorithm.
//!
//! This module provides a trust region implementation that adapts the step size
//! based on the agreement between predicted and actual reduction in cost.

use super::config::LmConfig;

/// Trust region implementation for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone)]
pub struct TrustRegion {
    /// Current value of the damping parameter
    pub lambda: f64,

    /// Minimum allowed value for the damping parameter
    pub lambda_min: f64,

    /// Maximum allowed value for the damping parameter
    pub lambda_max: f64,

    /// Factor to increase lambda by when step is rejected
    pub lambda_increase_factor: f64,

    /// Factor to decrease lambda by when step is accepted
    pub lambda_decrease_factor: f64,

    /// Minimum gain ratio required to accept a step
    pub min_gain_ratio: f64,

    /// Gain ratio above which lambda is decreased
    pub good_gain_ratio: f64,
}

impl Default for TrustRegion {
    fn default() -> Self {
        Self {
            lambda: 1e-3,
            lambda_min: 1e-10,
            lambda_max: 1e10,
            lambda_increase_factor: 10.0,
            lambda_decrease_factor: 0.1,
            min_gain_ratio: 1e-3,
            good_gain_ratio: 0.75,
        }
    }
}

impl TrustRegion {
    /// Creates a new TrustRegion with default parameters.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a trust region seeded from the lambda settings of an [`LmConfig`].
    pub fn from_config(config: &LmConfig) -> Self {
        Self {
            lambda: config.initial_lambda,
            lambda_min: config.min_lambda,
            lambda_max: config.max_lambda,
            lambda_increase_factor: config.lambda_up_factor,
            lambda_decrease_factor: config.lambda_down_factor,
            ..Default::default()
        }
    }

    /// Updates the damping parameter based on the gain ratio.
    ///
    /// Returns true when the step is accepted. A NaN gain always rejects.
    ///
    /// # Arguments
    ///
    /// * `gain_ratio` - The ratio of actual reduction to predicted reduction
    pub fn update_lambda(&mut self, gain_ratio: f64) -> bool {
        if gain_ratio > self.min_gain_ratio {
            if gain_ratio > self.good_gain_ratio {
                self.lambda = (self.lambda * self.lambda_decrease_factor).max(self.lambda_min);
            }
            true
        } else {
            self.lambda = (self.lambda * self.lambda_increase_factor).min(self.lambda_max);
            false
        }
    }

    /// Returns true once rejections have pushed lambda to its ceiling.
    pub fn is_saturated(&self) -> bool {
        self.lambda >= self.lambda_max
    }

    /// Calculates the gain ratio between actual and predicted reduction.
    ///
    /// # Arguments
    ///
    /// * `current_cost` - The current cost function value
    /// * `new_cost` - The new cost function value after the step
    /// * `predicted_reduction` - The predicted reduction in cost
    ///
    /// # Returns
    ///
    /// * The gain ratio (actual reduction / predicted reduction)
    pub fn gain_ratio(current_cost: f64, new_cost: f64, predicted_reduction: f64) -> f64 {
        if !new_cost.is_finite() {
            return f64::NEG_INFINITY;
        }

        let actual_reduction = current_cost - new_cost;

        if predicted_reduction.abs() < 1e-10 {
            if actual_reduction.abs() < 1e-10 {
                1.0
            } else {
                0.0
            }
        } else {
            actual_reduction / predicted_reduction
        }
    }

    /// Resets the trust region parameters to their default values.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lambda_update() {
        let mut tr = TrustRegion::new();

        assert!(tr.update_lambda(0.9));
        assert_relative_eq!(tr.lambda, 1e-4);

        // Accepted but mediocre step leaves lambda alone
        assert!(tr.update_lambda(0.5));
        assert_relative_eq!(tr.lambda, 1e-4);

        assert!(!tr.update_lambda(-1.0));
        assert_relative_eq!(tr.lambda, 1e-3);

        assert!(!tr.update_lambda(f64::NAN));
        assert_relative_eq!(tr.lambda, 1e-2);
    }

    #[test]
    fn test_lambda_is_clamped() {
        let mut tr = TrustRegion {
            lambda: 1e9,
            ..TrustRegion::default()
        };
        tr.update_lambda(0.0);
        assert!(tr.is_saturated());
        tr.update_lambda(0.0);
        assert_relative_eq!(tr.lambda, 1e10);

        tr.reset();
        assert_relative_eq!(tr.lambda, 1e-3);
    }

    #[test]
    fn test_gain_ratio() {
        assert_relative_eq!(TrustRegion::gain_ratio(10.0, 5.0, 10.0), 0.5);
        assert_relative_eq!(TrustRegion::gain_ratio(1.0, 1.0, 0.0), 1.0);
        assert_relative_eq!(TrustRegion::gain_ratio(1.0, 2.0, 0.0), 0.0);
        assert!(TrustRegion::gain_ratio(1.0, f64::NAN, 1.0) < 0.0);
    }
}
