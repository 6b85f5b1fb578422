use tokio_util::sync::CancellationToken;

use crate::{
    basis::{
        coordinate_scale, evaluate_terms, OrthogonalBasis, TriangularMatrix, MXTERMS, RAW_DEGREES,
    },
    control::centroid,
    surface::local_estimate,
    ControlPoint, WarpError, WeightFunction, WeightParams,
};

/// Parameters of the adaptive coefficient solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    /// Number of terms of the first candidate fit.
    pub initial_terms: usize,
    /// Term cap, at most [`MXTERMS`].
    pub max_terms: usize,
    /// Largest reconstruction error accepted at every control point, in target units.
    pub error_bound: f64,
    /// Relative norm below which an orthogonal term is treated as singular.
    pub singular_tol: f64,
    /// Inverse-distance weighting parameters.
    pub weights: WeightParams,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            initial_terms: 3,
            max_terms: MXTERMS,
            error_bound: 0.5,
            singular_tol: 1e-10,
            weights: WeightParams::default(),
        }
    }
}

impl SolverParams {
    /// Check the parameters are consistent.
    pub fn validate(&self) -> Result<(), WarpError> {
        if self.initial_terms == 0 || self.initial_terms > self.max_terms {
            return Err(WarpError::InvalidParams(format!(
                "initial_terms ({}) must be in 1..=max_terms ({})",
                self.initial_terms, self.max_terms
            )));
        }
        if self.max_terms > MXTERMS {
            return Err(WarpError::InvalidParams(format!(
                "max_terms ({}) exceeds {}",
                self.max_terms, MXTERMS
            )));
        }
        if !(self.error_bound >= 0.0) || !(self.singular_tol >= 0.0) {
            return Err(WarpError::InvalidParams(
                "error_bound and singular_tol must be non-negative".to_string(),
            ));
        }
        if !(self.weights.delta >= 0.0) || !(self.weights.min_distance_sq > 0.0) {
            return Err(WarpError::InvalidParams(
                "delta must be non-negative and min_distance_sq positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Solved orthogonal expansion of one axis of the warp.
///
/// Holds the recursion coefficients `aM` of the orthogonal basis, the
/// projection coefficient `a_k` of every term and the context the basis was
/// built in. The weights are taken relative to the control-point centroid, so
/// the expansion approximates the locally weighted surface with a single
/// basis. Evaluating it is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientMatrix {
    term_count: usize,
    recursion: TriangularMatrix,
    coefficients: Vec<f64>,
    singular_terms: Vec<usize>,
    scale: f64,
    reference: [f64; 2],
}

impl CoefficientMatrix {
    /// Number of terms of the expansion.
    #[inline]
    pub fn term_count(&self) -> usize {
        self.term_count
    }

    /// The recursion coefficients `aM`, lower-triangular.
    pub fn recursion(&self) -> &TriangularMatrix {
        &self.recursion
    }

    /// The projection coefficient of every term.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Terms found singular in any projection of the fit.
    pub fn singular_terms(&self) -> &[usize] {
        &self.singular_terms
    }

    /// Coordinate scale of the basis.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Point the weights of the expansion were computed against.
    pub fn reference(&self) -> [f64; 2] {
        self.reference
    }

    /// Evaluate the solved expansion at `(x, y)`.
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let mut values = [0.0; MXTERMS];
        let values = &mut values[..self.term_count];
        evaluate_terms(&self.recursion, self.scale, x, y, values);
        self.coefficients
            .iter()
            .zip(values.iter())
            .map(|(a, p)| a * p)
            .sum()
    }

    /// Fold the expansion into one coefficient per raw basis slot.
    ///
    /// The returned coefficients apply to unscaled coordinates. Slots beyond
    /// the term count are zero.
    pub fn monomial_coefficients(&self) -> [f64; MXTERMS] {
        let mut expansion: Vec<[f64; MXTERMS]> = Vec::with_capacity(self.term_count);
        for k in 0..self.term_count {
            let row = self.recursion.row(k);
            let mut e = [0.0; MXTERMS];
            e[k] = row[k];
            for (j, lower) in expansion.iter().enumerate() {
                for (s, v) in lower.iter().enumerate() {
                    e[s] += row[j] * v;
                }
            }
            expansion.push(e);
        }

        let mut total = [0.0; MXTERMS];
        for (a, e) in self.coefficients.iter().zip(expansion.iter()) {
            for (t, v) in total.iter_mut().zip(e.iter()) {
                *t += a * v;
            }
        }
        for (t, deg) in total.iter_mut().zip(RAW_DEGREES.iter()) {
            *t /= self.scale.powi(*deg);
        }
        total
    }

    /// The 3x2 window of [`crate::eval_poly`]: rows are degrees 0..=2, columns
    /// the x and y axis.
    ///
    /// Exact for expansions of at most six terms; higher terms are dropped.
    pub fn quadratic_window(&self) -> [[f64; 2]; 3] {
        let m = self.monomial_coefficients();
        [[m[0], 0.0], [m[1], m[2]], [m[3], m[4] + m[5]]]
    }
}

/// Result of fitting one axis.
#[derive(Debug, Clone)]
pub struct AxisFit {
    /// The solved expansion.
    pub matrix: CoefficientMatrix,
    /// Signed reconstruction error `target - fit` at every control point, the
    /// fit being evaluated with weights relative to that control point.
    pub residuals: Vec<f64>,
    /// Largest absolute reconstruction error.
    pub max_error: f64,
    /// Largest absolute error of the cached expansion at the control points.
    pub cached_max_error: f64,
    /// Whether every residual is within the error bound.
    pub converged: bool,
}

impl AxisFit {
    /// Number of terms actually used.
    #[inline]
    pub fn term_count(&self) -> usize {
        self.matrix.term_count()
    }

    /// Recoverable conditions of the fit, as errors a caller can surface.
    pub fn warnings(&self) -> Vec<WarpError> {
        let mut warnings = self
            .matrix
            .singular_terms()
            .iter()
            .map(|&term| WarpError::SingularProjection { term })
            .collect::<Vec<_>>();
        if !self.converged {
            warnings.push(WarpError::NoConvergence {
                term_count: self.term_count(),
                max_error: self.max_error,
            });
        }
        warnings
    }
}

/// Weighted least-squares solver with adaptive term selection.
///
/// # Example
///
/// ```
/// use polywarp_solver::{CoefficientSolver, ControlPoint, SolverParams};
///
/// let points = [
///     ControlPoint::new(10.0, 10.0, 12.0),
///     ControlPoint::new(50.0, 10.0, 53.0),
///     ControlPoint::new(10.0, 50.0, 9.0),
/// ];
/// let solver = CoefficientSolver::new(SolverParams::default()).unwrap();
/// let fit = solver.solve(&points).unwrap();
/// assert_eq!(fit.term_count(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct CoefficientSolver {
    params: SolverParams,
}

impl Default for CoefficientSolver {
    fn default() -> Self {
        Self {
            params: SolverParams::default(),
        }
    }
}

impl CoefficientSolver {
    /// Create a solver after validating its parameters.
    pub fn new(params: SolverParams) -> Result<Self, WarpError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The solver parameters.
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Fit a fixed number of terms.
    ///
    /// Every control point is scored with weights relative to itself: the
    /// basis is rebuilt over all control points, the targets are projected
    /// onto it and the projection is evaluated at that point. This is the
    /// surface [`crate::SurfaceEvaluator::evaluate_at`] returns, so the
    /// residuals are the errors a caller observes there.
    ///
    /// Adding terms never increases the weighted residual of a local fit.
    /// With `w_ii` the self weight of point `i`, its error with `k` terms is
    /// therefore bounded by `sqrt(S_i(k - 1) / w_ii)`, where `S_i` is the
    /// weighted sum of squared residuals of the local fit at point `i`.
    ///
    /// The cached expansion is solved once with weights relative to the
    /// control-point centroid. Singular terms keep a zero coefficient.
    pub fn fit_terms(
        &self,
        points: &[ControlPoint],
        term_count: usize,
    ) -> Result<AxisFit, WarpError> {
        if points.is_empty() {
            return Err(WarpError::NoControlPoints);
        }
        if term_count == 0 || term_count > MXTERMS {
            return Err(WarpError::InvalidParams(format!(
                "term count {} outside 1..={}",
                term_count, MXTERMS
            )));
        }

        let weight_fn = WeightFunction::new(self.params.weights);
        let scale = coordinate_scale(points);
        let singular_tol = self.params.singular_tol;

        let mut weights = Vec::with_capacity(points.len());
        let mut singular = [false; MXTERMS];
        let residuals = points
            .iter()
            .map(|p| {
                let (value, basis) = local_estimate(
                    points,
                    &weight_fn,
                    &mut weights,
                    term_count,
                    scale,
                    singular_tol,
                    [p.x, p.y],
                );
                for k in basis.singular_terms() {
                    singular[k] = true;
                }
                p.target - value
            })
            .collect::<Vec<_>>();
        let max_error = residuals.iter().fold(0.0f64, |acc, r| acc.max(r.abs()));

        let reference = centroid(points);
        weight_fn.compute_into(points, reference, &mut weights);
        let basis = OrthogonalBasis::build(points, &weights, term_count, scale, singular_tol);
        let coefficients = basis.project(points, &weights);
        let cached_max_error = points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.target - basis.reconstruct(i, &coefficients)).abs())
            .fold(0.0f64, f64::max);

        for k in basis.singular_terms() {
            singular[k] = true;
        }
        let singular_terms = (0..term_count).filter(|&k| singular[k]).collect();

        let matrix = CoefficientMatrix {
            term_count,
            recursion: basis.into_recursion(),
            coefficients,
            singular_terms,
            scale,
            reference,
        };

        Ok(AxisFit {
            matrix,
            residuals,
            max_error,
            cached_max_error,
            converged: max_error <= self.params.error_bound,
        })
    }

    /// Fit with the fewest terms meeting the error bound.
    ///
    /// Tries `initial_terms..=max_terms` in order and returns the first fit
    /// whose reconstruction error is within `error_bound` at every control
    /// point. When none is, the fit with `max_terms` is returned with
    /// `converged == false`.
    pub fn solve(&self, points: &[ControlPoint]) -> Result<AxisFit, WarpError> {
        self.solve_impl(points, None)
    }

    /// Like [`CoefficientSolver::solve`], checking `token` before every term count.
    pub fn solve_with_cancel(
        &self,
        points: &[ControlPoint],
        token: &CancellationToken,
    ) -> Result<AxisFit, WarpError> {
        self.solve_impl(points, Some(token))
    }

    fn solve_impl(
        &self,
        points: &[ControlPoint],
        token: Option<&CancellationToken>,
    ) -> Result<AxisFit, WarpError> {
        if points.is_empty() {
            return Err(WarpError::NoControlPoints);
        }

        let mut last = None;
        for term_count in self.params.initial_terms..=self.params.max_terms {
            if token.is_some_and(|t| t.is_cancelled()) {
                log::debug!("solve cancelled before {} terms", term_count);
                return Err(WarpError::Cancelled);
            }

            let now = std::time::Instant::now();
            let fit = self.fit_terms(points, term_count)?;
            log::debug!(
                "terms: {} max error: {:.4} cached max error: {:.4} elapsed: {:?}",
                term_count,
                fit.max_error,
                fit.cached_max_error,
                now.elapsed()
            );

            if fit.converged {
                return Ok(fit);
            }
            last = Some(fit);
        }

        let fit = last.ok_or_else(|| WarpError::InvalidParams("empty term range".to_string()))?;
        log::warn!(
            "no convergence with {} terms, max error {:.3} > {}",
            fit.term_count(),
            fit.max_error,
            self.params.error_bound
        );

        Ok(fit)
    }
}
