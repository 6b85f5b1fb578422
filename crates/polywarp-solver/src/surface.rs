use crate::{
    basis::{OrthogonalBasis, MXTERMS},
    parallel::{fill_grid, ExecutionStrategy},
    CoefficientMatrix, ControlPoint, SolverParams, WarpError, WeightFunction,
};

/// How a surface is evaluated away from the control points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// Rebuild the weights and the orthogonal basis relative to every query point.
    #[default]
    Local,
    /// Reuse the expansion solved with weights relative to the control-point
    /// centroid.
    ///
    /// An approximation of [`EvaluationMode::Local`]: both agree wherever the
    /// targets lie in the span of the basis, elsewhere the cached surface does
    /// not reproduce the reported fit errors.
    Cached,
}

/// Evaluates a fitted surface.
///
/// In [`EvaluationMode::Local`] the weights depend on the distance of every
/// control point to the query point, so the orthogonal basis and the
/// projection are recomputed per query. [`EvaluationMode::Cached`] evaluates
/// the solved [`CoefficientMatrix`] directly.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceEvaluator<'a> {
    points: &'a [ControlPoint],
    matrix: &'a CoefficientMatrix,
    weights: WeightFunction,
    singular_tol: f64,
}

impl<'a> SurfaceEvaluator<'a> {
    /// Create an evaluator over the control points a matrix was solved from.
    pub fn new(
        points: &'a [ControlPoint],
        matrix: &'a CoefficientMatrix,
        params: &SolverParams,
    ) -> Self {
        Self {
            points,
            matrix,
            weights: WeightFunction::new(params.weights),
            singular_tol: params.singular_tol,
        }
    }

    /// Number of terms used per evaluation.
    pub fn term_count(&self) -> usize {
        self.matrix.term_count()
    }

    /// Evaluate the surface at `(x, y)` with weights relative to the query point.
    pub fn evaluate_at(&self, x: f64, y: f64) -> f64 {
        let terms = self.matrix.term_count();
        if self.points.is_empty() || terms == 0 {
            return 0.0;
        }

        let mut weights = Vec::with_capacity(self.points.len());
        let (value, _) = local_estimate(
            self.points,
            &self.weights,
            &mut weights,
            terms,
            self.matrix.scale(),
            self.singular_tol,
            [x, y],
        );
        value
    }

    /// Evaluate the solved expansion at `(x, y)`.
    #[inline]
    pub fn evaluate_cached(&self, x: f64, y: f64) -> f64 {
        self.matrix.evaluate(x, y)
    }

    /// Evaluate at `(x, y)` in the given mode.
    pub fn evaluate(&self, x: f64, y: f64, mode: EvaluationMode) -> f64 {
        match mode {
            EvaluationMode::Local => self.evaluate_at(x, y),
            EvaluationMode::Cached => self.evaluate_cached(x, y),
        }
    }

    /// Evaluate the surface at every integer cell of a `width x height` grid.
    ///
    /// # Returns
    ///
    /// The values in row-major order, cell `(col, row)` evaluated at
    /// `(x, y) = (col, row)`.
    pub fn evaluate_grid(
        &self,
        width: usize,
        height: usize,
        mode: EvaluationMode,
        strategy: ExecutionStrategy,
    ) -> Result<Vec<f64>, WarpError> {
        let mut dst = vec![0.0; width * height];
        self.evaluate_grid_into(&mut dst, width, height, mode, strategy)?;
        Ok(dst)
    }

    /// Like [`SurfaceEvaluator::evaluate_grid`], writing into `dst`.
    pub fn evaluate_grid_into(
        &self,
        dst: &mut [f64],
        width: usize,
        height: usize,
        mode: EvaluationMode,
        strategy: ExecutionStrategy,
    ) -> Result<(), WarpError> {
        let now = std::time::Instant::now();
        fill_grid(dst, width, height, strategy, |col, row| {
            self.evaluate(col as f64, row as f64, mode)
        })?;
        log::debug!(
            "evaluated {}x{} grid ({:?}, {:?}) in {:?}",
            width,
            height,
            mode,
            strategy,
            now.elapsed()
        );
        Ok(())
    }
}

/// Fit the control points with weights relative to `query` and evaluate the
/// fit at `query`.
///
/// Shared by the solver, which scores every control point this way, and by
/// [`SurfaceEvaluator::evaluate_at`]. `weights` is scratch space.
pub(crate) fn local_estimate(
    points: &[ControlPoint],
    weight_fn: &WeightFunction,
    weights: &mut Vec<f64>,
    term_count: usize,
    scale: f64,
    singular_tol: f64,
    query: [f64; 2],
) -> (f64, OrthogonalBasis) {
    weight_fn.compute_into(points, query, weights);
    let basis = OrthogonalBasis::build(points, weights, term_count, scale, singular_tol);
    let coefficients = basis.project(points, weights);

    let mut values = [0.0; MXTERMS];
    let values = &mut values[..term_count];
    basis.evaluate_into(query[0], query[1], values);

    let value = coefficients
        .iter()
        .zip(values.iter())
        .map(|(a, p)| a * p)
        .sum();
    (value, basis)
}

/// Evaluate the coarse quadratic mapping of a 3x2 coefficient window.
///
/// Row `d` holds the coefficients of `x^d` and `y^d`:
///
/// `f(x, y) = sum_{d=0..2} window[d][0] * x^d + window[d][1] * y^d`
///
/// # Example
///
/// ```
/// use polywarp_solver::eval_poly;
///
/// let window = [[1.0, 0.0], [2.0, 3.0], [0.0, 0.5]];
/// assert_eq!(eval_poly(1.0, 2.0, &window), 1.0 + 2.0 + 6.0 + 2.0);
/// ```
#[inline]
pub fn eval_poly(x: f64, y: f64, window: &[[f64; 2]; 3]) -> f64 {
    let [c0, c1, c2] = window;
    c0[0] + c0[1] + (c1[0] + c2[0] * x) * x + (c1[1] + c2[1] * y) * y
}
