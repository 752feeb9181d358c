use thiserror::Error;

/// Error types for the saim-fit library.
#[derive(Error, Debug)]
pub enum SaimError {
    /// Structural mismatch in the input: array lengths, parameter vector
    /// lengths, asymmetric mirrored angle ranges, unknown wavelengths.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A fitter did not converge within its iteration budget.
    #[error("Iteration limit exceeded after {iterations} iterations")]
    IterationLimitExceeded { iterations: usize },

    /// Numerical breakdown inside a solver (damping ceiling, non-finite cost).
    #[error("Algorithm failed to converge: {0}")]
    ConvergenceFailure(String),

    /// The worker thread pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SaimError {
    /// Shorthand for an [`SaimError::InvalidInput`] built from anything printable.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        SaimError::InvalidInput(msg.into())
    }

    /// Returns true for errors that mark a single fit attempt as not converged.
    ///
    /// Candidate fitting logs these at debug level and anything else as a warning.
    pub fn is_non_convergence(&self) -> bool {
        matches!(
            self,
            SaimError::IterationLimitExceeded { .. } | SaimError::ConvergenceFailure(_)
        )
    }
}

/// Result type alias for saim-fit operations.
pub type Result<T> = std::result::Result<T, SaimError>;

impl From<rayon::ThreadPoolBuildError> for SaimError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        SaimError::ThreadPool(err.to_string())
    }
}
