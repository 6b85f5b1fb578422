use crate::parallel::ParallelError;

/// Error types for warp estimation.
///
/// [`WarpError::SingularProjection`] and [`WarpError::NoConvergence`] are not
/// returned by a solve. They describe recoverable conditions of a fit and are
/// reported through [`crate::AxisFit::warnings`].
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum WarpError {
    /// There are no control points to fit.
    #[error("no control points to fit")]
    NoControlPoints,

    /// The estimator needs more landmarks than available.
    #[error("at least {required} landmarks are required, got {actual}")]
    InsufficientLandmarks {
        /// Minimum number of landmarks required.
        required: usize,
        /// Number of landmarks provided.
        actual: usize,
    },

    /// The projection denominator of a term vanished; the term was skipped.
    #[error("projection of term {term} is singular, coefficient set to zero")]
    SingularProjection {
        /// Index of the skipped term.
        term: usize,
    },

    /// The term cap was reached without meeting the error bound.
    #[error("no convergence with {term_count} terms, max error {max_error:.3}")]
    NoConvergence {
        /// Number of terms used by the returned fit.
        term_count: usize,
        /// Largest reconstruction error over the control points.
        max_error: f64,
    },

    /// Solver parameters are inconsistent.
    #[error("invalid solver parameters: {0}")]
    InvalidParams(String),

    /// The solve was cancelled between term-count iterations.
    #[error("solve cancelled")]
    Cancelled,

    /// The source points do not span the plane.
    #[error("source landmarks are colinear, affine transform is undefined")]
    DegenerateAffine,

    /// The solve worker thread panicked.
    #[error("solve worker panicked")]
    WorkerPanicked,

    /// Error during parallel grid evaluation.
    #[error(transparent)]
    Parallel(#[from] ParallelError),
}
