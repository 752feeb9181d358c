//! Fit of the mean intensity of a rectangular region.
//!
//! Averages every slice over the region, organizes the means like a single
//! pixel and fits them, returning both curves so the caller can plot the
//! measurement against the fit.

use crate::config::FitConfiguration;
use crate::error::{Result, SaimError};
use crate::fit::{fit_candidates, select_best, CandidateOutcome, FitResult};
use crate::image::ImageStack;
use crate::observation::{Observation, ObservationSet};
use crate::optics::RefractiveIndexTable;
use crate::organize::ObservationOrganizer;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn check<S: ImageStack + ?Sized>(&self, stack: &S) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SaimError::InvalidInput(format!("Region {:?} is empty", self)));
        }
        if self.x + self.width > stack.width() || self.y + self.height > stack.height() {
            return Err(SaimError::InvalidInput(format!(
                "Region {:?} extends past the {}x{} image",
                self,
                stack.width(),
                stack.height()
            )));
        }
        Ok(())
    }
}

/// Everything needed to plot a region fit.
#[derive(Debug, Clone)]
pub struct RegionInspection {
    /// Mean over the region, one per slice
    pub slice_means: Vec<f64>,
    /// Organized means
    pub observed: ObservationSet,
    /// Model at the best fit, at the observed angles; `None` when no candidate converged
    pub predicted: Option<ObservationSet>,
    pub best: FitResult,
    pub candidates: Vec<CandidateOutcome>,
}

/// Mean of every slice over `region`.
pub fn region_means<S: ImageStack + ?Sized>(stack: &S, region: Region) -> Result<Vec<f64>> {
    region.check(stack)?;
    let count = (region.width * region.height) as f64;

    Ok((0..stack.slice_count())
        .map(|slice| {
            let mut sum = 0.0;
            for y in region.y..region.y + region.height {
                for x in region.x..region.x + region.width {
                    sum += stack.sample(x, y, slice);
                }
            }
            sum / count
        })
        .collect())
}

/// Fit the region mean with every configured candidate height.
///
/// The threshold is not applied.
pub fn inspect_region<S: ImageStack + ?Sized>(
    stack: &S,
    region: Region,
    config: &FitConfiguration,
    table: &RefractiveIndexTable,
) -> Result<RegionInspection> {
    config.validate_for_slices(stack.slice_count())?;

    let slice_means = region_means(stack, region)?;
    let observed = ObservationOrganizer::new(config.geometry(), slice_means.len())?
        .organize(&slice_means)?;

    let strategy = config.fitter.build(config, table)?;
    let candidates = fit_candidates(
        strategy.as_ref(),
        &observed,
        config.initial_amplitude,
        config.initial_background,
        &config.heights,
    );
    let best = select_best(&candidates);

    let predicted = (!best.is_failed()).then(|| {
        let values = strategy.predict(&observed, best.parameters());
        observed
            .iter()
            .zip(values)
            .map(|(o, value)| Observation::new(o.angle_degrees(), value))
            .collect::<ObservationSet>()
    });

    info!(
        "Region {:?}: A {:.0}, B {:.0}, h {:.1}, r2 {:.2}",
        region, best.amplitude, best.background, best.height, best.r_squared
    );

    Ok(RegionInspection {
        slice_means,
        observed,
        predicted,
        best,
        candidates,
    })
}
