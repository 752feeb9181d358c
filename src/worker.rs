//! Per-pixel fitting over one column range.

use crate::config::FitConfiguration;
use crate::error::Result;
use crate::fit::{fit_candidates, select_best, FitResult, FittingStrategy};
use crate::image::{ImageStack, RasterColumns};
use crate::optics::RefractiveIndexTable;
use crate::orchestrator::{CancellationToken, Progress};
use crate::organize::ObservationOrganizer;
use tracing::debug;

/// What happened to one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelOutcome {
    /// Not above threshold; left at its default
    Skipped,
    /// Best candidate
    Fitted(FitResult),
    /// No candidate converged
    Failed,
}

impl PixelOutcome {
    /// Value written to the planes, if any.
    pub fn result(&self) -> Option<FitResult> {
        match self {
            PixelOutcome::Skipped => None,
            PixelOutcome::Fitted(result) => Some(*result),
            PixelOutcome::Failed => Some(FitResult::failed()),
        }
    }
}

/// How a worker's column loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Finished,
    /// Stopped at a column boundary
    Cancelled,
    /// Stopped mid-column
    Interrupted,
}

/// Fits every pixel of the columns it is given.
///
/// Owns its configuration copy, organizer and fitting strategy, so nothing
/// mutable is shared with other workers beyond the atomics in the token and
/// the progress counter.
pub struct PixelFitWorker<'a, S: ImageStack + ?Sized> {
    stack: &'a S,
    config: FitConfiguration,
    organizer: ObservationOrganizer,
    strategy: Box<dyn FittingStrategy>,
    token: CancellationToken,
    progress: &'a Progress,
}

impl<'a, S: ImageStack + ?Sized> PixelFitWorker<'a, S> {
    pub fn new(
        stack: &'a S,
        config: FitConfiguration,
        table: &RefractiveIndexTable,
        token: CancellationToken,
        progress: &'a Progress,
    ) -> Result<Self> {
        let organizer = ObservationOrganizer::new(config.geometry(), stack.slice_count())?;
        let strategy = config.fitter.build(&config, table)?;
        Ok(Self {
            stack,
            config,
            organizer,
            strategy,
            token,
            progress,
        })
    }

    /// Threshold, organize and fit one pixel from its per-slice samples.
    pub fn fit_pixel(&self, samples: &[f64]) -> Result<PixelOutcome> {
        let level = self.config.threshold_mode.value(samples);
        if !(level > self.config.threshold) {
            return Ok(PixelOutcome::Skipped);
        }

        let observations = self.organizer.organize(samples)?;
        let outcomes = fit_candidates(
            self.strategy.as_ref(),
            &observations,
            self.config.initial_amplitude,
            self.config.initial_background,
            &self.config.heights,
        );

        let best = select_best(&outcomes);
        Ok(if best.is_failed() {
            PixelOutcome::Failed
        } else {
            PixelOutcome::Fitted(best)
        })
    }

    /// Fit every pixel in `columns`, column by column.
    pub fn run(&self, mut columns: RasterColumns<'_>) -> WorkerExit {
        let mut samples = Vec::with_capacity(self.stack.slice_count());

        for x in columns.columns() {
            if self.token.is_cancelled() {
                return WorkerExit::Cancelled;
            }

            for y in 0..columns.rows() {
                if self.token.is_interrupted() {
                    return WorkerExit::Interrupted;
                }

                self.stack.pixel_samples(x, y, &mut samples);
                let outcome = self.fit_pixel(&samples).unwrap_or_else(|err| {
                    debug!("Pixel ({}, {}) could not be fitted: {}", x, y, err);
                    PixelOutcome::Failed
                });
                if let Some(result) = outcome.result() {
                    columns.write(x, y, &result);
                }
            }

            self.progress.column_done();
        }

        WorkerExit::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdMode;
    use crate::image::OutputRaster;
    use crate::model::OpticalModel;
    use ndarray::Array3;

    fn config() -> FitConfiguration {
        FitConfiguration::default()
            .with_threshold(5000.0, ThresholdMode::StackAverage)
            .with_heights(vec![80.0])
    }

    fn synthetic_stack(width: usize, config: &FitConfiguration) -> Array3<f64> {
        let model = OpticalModel::from_config(config, &RefractiveIndexTable::builtin()).unwrap();
        Array3::from_shape_fn((101, 1, width), |(slice, _, x)| {
            let angle = (config.first_angle + slice as f64 * config.angle_step).to_radians();
            // Column 0 is dark
            let amplitude = if x == 0 { 0.0 } else { 1000.0 };
            model.intensity(angle, amplitude, 5000.0, 75.0)
        })
    }

    #[test]
    fn test_threshold_skips_dark_pixels() {
        let config = config();
        let stack = synthetic_stack(2, &config);
        let progress = Progress::new();
        let worker = PixelFitWorker::new(
            &stack,
            config,
            &RefractiveIndexTable::builtin(),
            CancellationToken::new(),
            &progress,
        )
        .unwrap();

        let mut samples = Vec::new();
        stack.pixel_samples(0, 0, &mut samples);
        assert_eq!(worker.fit_pixel(&samples).unwrap(), PixelOutcome::Skipped);

        stack.pixel_samples(1, 0, &mut samples);
        match worker.fit_pixel(&samples).unwrap() {
            PixelOutcome::Fitted(result) => {
                assert!((result.height - 75.0).abs() < 1e-3);
                assert!(result.r_squared > 0.999);
            }
            other => panic!("Expected a fitted pixel, got {:?}", other),
        }
    }

    #[test]
    fn test_stack_average_threshold() {
        let config = config().with_threshold(1e9, ThresholdMode::StackAverage);
        let stack = synthetic_stack(2, &config);
        let progress = Progress::new();
        let worker = PixelFitWorker::new(
            &stack,
            config,
            &RefractiveIndexTable::builtin(),
            CancellationToken::new(),
            &progress,
        )
        .unwrap();

        let mut samples = Vec::new();
        stack.pixel_samples(1, 0, &mut samples);
        assert_eq!(worker.fit_pixel(&samples).unwrap(), PixelOutcome::Skipped);
    }

    #[test]
    fn test_run_writes_columns_and_counts_progress() {
        let config = config();
        let stack = synthetic_stack(3, &config);
        let progress = Progress::new();
        let worker = PixelFitWorker::new(
            &stack,
            config,
            &RefractiveIndexTable::builtin(),
            CancellationToken::new(),
            &progress,
        )
        .unwrap();

        let mut raster = OutputRaster::new(3, 1);
        let mut parts = raster.split_columns(&[0..3]).unwrap();
        let exit = worker.run(parts.remove(0));

        assert_eq!(exit, WorkerExit::Finished);
        assert_eq!(progress.columns_processed(), 3);
        assert!(raster.column_is_untouched(0));
        assert!((raster.get(2, 0).height - 75.0).abs() < 1e-3);
    }

    #[test]
    fn test_cancelled_worker_writes_nothing() {
        let config = config();
        let stack = synthetic_stack(3, &config);
        let progress = Progress::new();
        let token = CancellationToken::new();
        token.cancel();
        let worker = PixelFitWorker::new(
            &stack,
            config,
            &RefractiveIndexTable::builtin(),
            token,
            &progress,
        )
        .unwrap();

        let mut raster = OutputRaster::new(3, 1);
        let mut parts = raster.split_columns(&[0..3]).unwrap();
        assert_eq!(worker.run(parts.remove(0)), WorkerExit::Cancelled);
        assert_eq!(progress.columns_processed(), 0);
        assert_eq!(raster, OutputRaster::new(3, 1));
    }

    /// Raises the interrupt flag when pixel `at` is read.
    struct InterruptingStack {
        inner: Array3<f64>,
        token: CancellationToken,
        at: (usize, usize),
    }

    impl ImageStack for InterruptingStack {
        fn width(&self) -> usize {
            ImageStack::width(&self.inner)
        }

        fn height(&self) -> usize {
            ImageStack::height(&self.inner)
        }

        fn slice_count(&self) -> usize {
            ImageStack::slice_count(&self.inner)
        }

        fn sample(&self, x: usize, y: usize, slice: usize) -> f64 {
            if (x, y) == self.at {
                self.token.interrupt();
            }
            ImageStack::sample(&self.inner, x, y, slice)
        }
    }

    #[test]
    fn test_interrupt_stops_mid_column() {
        let config = config();
        let model = OpticalModel::from_config(&config, &RefractiveIndexTable::builtin()).unwrap();
        let inner = Array3::from_shape_fn((101, 3, 3), |(slice, _, _)| {
            let angle = (config.first_angle + slice as f64 * config.angle_step).to_radians();
            model.intensity(angle, 1000.0, 5000.0, 75.0)
        });
        let token = CancellationToken::new();
        let stack = InterruptingStack {
            inner,
            token: token.clone(),
            at: (1, 1),
        };

        let progress = Progress::new();
        let worker = PixelFitWorker::new(
            &stack,
            config,
            &RefractiveIndexTable::builtin(),
            token.clone(),
            &progress,
        )
        .unwrap();

        let mut raster = OutputRaster::new(3, 3);
        let mut parts = raster.split_columns(&[0..3]).unwrap();
        assert_eq!(worker.run(parts.remove(0)), WorkerExit::Interrupted);
        assert!(token.is_interrupted());

        // Column 0 finished; column 1 stopped after the pixel that raised the flag
        assert_eq!(progress.columns_processed(), 1);
        for y in 0..3 {
            assert!((raster.get(0, y).height - 75.0).abs() < 1e-3);
        }
        assert!((raster.get(1, 1).height - 75.0).abs() < 1e-3);
        assert_eq!(raster.get(1, 2).height, 0.0);
        assert!(raster.column_is_untouched(2));
    }
}
