//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides the damped Gauss-Newton solver behind the gradient
//! curve fitter. The damping is Marquardt's diagonal scaling of the normal
//! equations, and lambda follows the gain ratio between the actual and the
//! predicted reduction of the cost.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod step;
pub mod trust_region;

// Re-export key types
pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
pub use convergence::{Convergence, ConvergenceCriteria};
pub use step::{LmStep, StepResult};
pub use trust_region::TrustRegion;
