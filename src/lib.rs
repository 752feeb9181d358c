//! # saim-fit
//!
//! `saim-fit` fits the scanning angle interference microscopy (SAIM) intensity
//! model to every pixel of an angle-resolved image stack, recovering the
//! amplitude A, the background B and the height h of the fluorophore above a
//! reflective silicon oxide substrate.
//!
//! The library provides:
//! - The SAIM intensity model with its analytic Jacobian and a per-angle cache
//! - A Levenberg-Marquardt fitter and a bounded Nelder-Mead fitter behind one trait
//! - Multi-start fitting over a list of candidate heights, scored by R²
//! - A multi-threaded whole-image run with progress and cancellation
//! - Region inspection and theoretical intensity profiles
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ndarray::Array3;
//! use saim_fit::{FitConfiguration, FitOrchestrator, RefractiveIndexTable};
//! use std::sync::Arc;
//!
//! // One slice per angle, -50° to 50° in 1° steps
//! let stack = Array3::<u16>::zeros((101, 512, 512));
//! let config = FitConfiguration::default().with_heights(vec![50.0, 150.0, 300.0]);
//!
//! let orchestrator = FitOrchestrator::new(Arc::new(RefractiveIndexTable::builtin()));
//! let raster = orchestrator.run_fit(&stack, &config)?;
//! println!("h at (10, 10): {} nm", raster.height[[10, 10]]);
//! # Ok::<(), saim_fit::SaimError>(())
//! ```

pub mod bounds;
pub mod config;
pub mod error;
pub mod fit;
pub mod image;
pub mod inspect;
pub mod lm;
pub mod model;
pub mod observation;
pub mod optics;
pub mod orchestrator;
pub mod organize;
pub mod problem;
pub mod simplex;
pub mod worker;

mod utils;

// Re-exports for convenience
pub use bounds::{Bounds, ParameterBounds};
pub use config::{FitConfiguration, ThresholdMode};
pub use error::{Result, SaimError};
pub use fit::{
    BoundedCurveFitter, CurveFitter, FitParameters, FitResult, FitterKind, FittingStrategy,
};
pub use image::{ImageStack, OutputRaster};
pub use inspect::{inspect_region, Region, RegionInspection};
pub use model::OpticalModel;
pub use observation::{Observation, ObservationSet};
pub use optics::{intensity_profiles, ProfileSettings, RefractiveIndexTable};
pub use orchestrator::{CancellationToken, FitOrchestrator, Progress};
pub use organize::{AngleGeometry, ObservationOrganizer};
pub use problem::Problem;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
