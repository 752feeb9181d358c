//! Whole-image fitting on a pool of worker threads.
//!
//! The image width is cut into one contiguous column range per worker. Each
//! worker gets a mutable view of its own columns of the [`OutputRaster`], so
//! the planes are written without locks. Progress and cancellation go through
//! atomics shared with the caller.

use crate::config::FitConfiguration;
use crate::error::Result;
use crate::image::{ImageStack, OutputRaster};
use crate::optics::RefractiveIndexTable;
use crate::worker::{PixelFitWorker, WorkerExit};
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default wait between the cooperative cancel and the forced interrupt.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct CancelFlags {
    cancelled: AtomicBool,
    interrupted: AtomicBool,
}

/// Shared stop signal, checked by workers at every column (cancel) and
/// every pixel (interrupt).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flags: Arc<CancelFlags>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask workers to stop at the next column.
    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
    }

    /// Ask workers to stop at the next pixel.
    pub fn interrupt(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
        self.flags.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::Relaxed)
    }

    pub fn is_interrupted(&self) -> bool {
        self.flags.interrupted.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.flags.cancelled.store(false, Ordering::SeqCst);
        self.flags.interrupted.store(false, Ordering::SeqCst);
    }
}

/// Column counters of the current run.
#[derive(Debug, Default)]
pub struct Progress {
    processed: AtomicUsize,
    total: AtomicUsize,
    active_workers: AtomicUsize,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns finished so far; never decreases during a run.
    pub fn columns_processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total_columns(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Finished share of the image in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        match self.total_columns() {
            0 => 0.0,
            total => self.columns_processed() as f64 / total as f64,
        }
    }

    /// Workers that have started and not yet returned.
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub(crate) fn column_done(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn start(&self, total: usize) {
        self.processed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }
}

/// Split `width` columns into at most `workers` contiguous ranges.
///
/// Every range has `width / n` columns except the last, which also takes the
/// remainder. `n` is capped at the width.
pub fn column_ranges(width: usize, workers: usize) -> Vec<Range<usize>> {
    let n = workers.min(width).max(1);
    let base = width / n;
    (0..n)
        .map(|i| {
            let end = if i + 1 == n { width } else { (i + 1) * base };
            i * base..end
        })
        .collect()
}

/// Runs [`PixelFitWorker`]s over a whole image.
///
/// `run_fit` and `cancel` take `&self`, so the orchestrator can be shared with
/// a thread that cancels the run.
#[derive(Debug)]
pub struct FitOrchestrator {
    table: Arc<RefractiveIndexTable>,
    workers: usize,
    grace_period: Duration,
    token: CancellationToken,
    progress: Arc<Progress>,
}

impl FitOrchestrator {
    /// One worker per rayon thread by default.
    pub fn new(table: Arc<RefractiveIndexTable>) -> Self {
        Self {
            table,
            workers: rayon::current_num_threads(),
            grace_period: DEFAULT_GRACE_PERIOD,
            token: CancellationToken::new(),
            progress: Arc::new(Progress::new()),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Fit every pixel of `stack` and return the four planes.
    ///
    /// Fails only when `config` does not fit the stack or the pool cannot be
    /// built. A cancelled run returns the planes as far as they got. Entering
    /// `run_fit` clears an earlier cancellation; a cancel issued after that,
    /// even before any worker has started, stops this run.
    pub fn run_fit<S: ImageStack + ?Sized>(
        &self,
        stack: &S,
        config: &FitConfiguration,
    ) -> Result<OutputRaster> {
        // First, so that a cancel arriving during start-up applies to this run
        self.token.reset();

        config.validate_for_slices(stack.slice_count())?;
        // Model errors (e.g. a wavelength outside the index table) surface here, before spawning
        let strategy = config.fitter.build(config, &self.table)?;

        let width = stack.width();
        let ranges = column_ranges(width, self.workers);
        let mut raster = OutputRaster::new(width, stack.height());

        self.progress.start(width);

        info!(
            "Fitting {}x{} pixels over {} slices with {} workers ({} fitter)",
            width,
            stack.height(),
            stack.slice_count(),
            ranges.len(),
            strategy.name()
        );
        let started = Instant::now();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ranges.len())
            .thread_name(|i| format!("saim-fit-{}", i))
            .build()?;

        let parts = raster.split_columns(&ranges)?;
        pool.scope(|scope| {
            for columns in parts {
                let worker_config = config.clone();
                let token = self.token.clone();
                let progress = &*self.progress;
                let table = &*self.table;

                progress.active_workers.fetch_add(1, Ordering::SeqCst);
                scope.spawn(move |_| {
                    let range = columns.columns();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        PixelFitWorker::new(stack, worker_config, table, token, progress)
                            .map(|worker| worker.run(columns))
                    }));

                    match outcome {
                        Ok(Ok(WorkerExit::Finished)) => {}
                        Ok(Ok(exit)) => debug!("Worker for columns {:?} stopped: {:?}", range, exit),
                        Ok(Err(err)) => error!("Worker for columns {:?} failed: {}", range, err),
                        Err(_) => error!("Worker for columns {:?} panicked", range),
                    }
                    progress.active_workers.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        info!("Analysis took {} ms", started.elapsed().as_millis());
        if self.token.is_cancelled() {
            info!(
                "Run cancelled after {} of {} columns",
                self.progress.columns_processed(),
                width
            );
        }

        Ok(raster)
    }

    /// Stop the current run.
    ///
    /// Workers are asked to stop at the next column. If any is still running
    /// after the grace period, they are interrupted at the next pixel.
    pub fn cancel(&self) {
        self.token.cancel();

        let deadline = Instant::now() + self.grace_period;
        while self.progress.active_workers() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let remaining = self.progress.active_workers();
        if remaining > 0 {
            warn!(
                "{} workers still running after {} ms, interrupting",
                remaining,
                self.grace_period.as_millis()
            );
            self.token.interrupt();
        }
    }
}
