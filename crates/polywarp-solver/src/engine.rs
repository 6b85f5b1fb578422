use std::thread::JoinHandle;

use polywarp_landmarks::LandmarkStore;
use tokio_util::sync::CancellationToken;

use crate::{
    control::control_points,
    parallel::ExecutionStrategy,
    Axis, AxisFit, CoefficientSolver, ControlPoint, EvaluationMode, SolverParams,
    SurfaceEvaluator, WarpError,
};

/// Estimates the forward warp of a landmark set.
///
/// Two independent solves run from the same landmarks: one fits the x′
/// mapping to the target x coordinates, the other the y′ mapping to the
/// target y coordinates.
///
/// # Example
///
/// ```
/// use polywarp_landmarks::LandmarkStore;
/// use polywarp_solver::WarpEngine;
///
/// let mut landmarks = LandmarkStore::default();
/// landmarks.push(10, 10, 12, 11).unwrap();
/// landmarks.push(50, 10, 53, 9).unwrap();
/// landmarks.push(10, 50, 9, 52).unwrap();
///
/// let solution = WarpEngine::default().solve(&landmarks).unwrap();
/// let [x, y] = solution.evaluate_at(50.0, 10.0);
/// assert!((x - 53.0).abs() < 0.5 && (y - 9.0).abs() < 0.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WarpEngine {
    solver: CoefficientSolver,
}

impl WarpEngine {
    /// Create an engine after validating the solver parameters.
    pub fn new(params: SolverParams) -> Result<Self, WarpError> {
        Ok(Self {
            solver: CoefficientSolver::new(params)?,
        })
    }

    /// The solver parameters.
    pub fn params(&self) -> &SolverParams {
        self.solver.params()
    }

    /// Solve both axes.
    pub fn solve(&self, landmarks: &LandmarkStore) -> Result<WarpSolution, WarpError> {
        self.solve_impl(landmarks, None)
    }

    /// Solve both axes, checking `token` between term-count iterations.
    pub fn solve_with_cancel(
        &self,
        landmarks: &LandmarkStore,
        token: &CancellationToken,
    ) -> Result<WarpSolution, WarpError> {
        self.solve_impl(landmarks, Some(token))
    }

    /// Run the solve on a worker thread.
    ///
    /// The worker owns `landmarks`, a snapshot of the caller's store, so the
    /// caller may keep editing its own copy meanwhile.
    pub fn spawn_solve(&self, landmarks: LandmarkStore, token: CancellationToken) -> SolveHandle {
        let engine = self.clone();
        let worker_token = token.clone();
        let handle =
            std::thread::spawn(move || engine.solve_with_cancel(&landmarks, &worker_token));
        SolveHandle { handle, token }
    }

    fn solve_impl(
        &self,
        landmarks: &LandmarkStore,
        token: Option<&CancellationToken>,
    ) -> Result<WarpSolution, WarpError> {
        let now = std::time::Instant::now();
        let x_points = control_points(landmarks, Axis::X);
        let y_points = control_points(landmarks, Axis::Y);

        let solve_axis = |points: &[ControlPoint]| match token {
            Some(token) => self.solver.solve_with_cancel(points, token),
            None => self.solver.solve(points),
        };
        let x_fit = solve_axis(x_points.as_slice())?;
        let y_fit = solve_axis(y_points.as_slice())?;

        log::info!(
            "solved {} landmarks: x' {} terms (error {:.3}), y' {} terms (error {:.3}) in {:?}",
            landmarks.len(),
            x_fit.term_count(),
            x_fit.max_error,
            y_fit.term_count(),
            y_fit.max_error,
            now.elapsed()
        );

        let solution = WarpSolution {
            params: self.params().clone(),
            x_points,
            y_points,
            x_fit,
            y_fit,
        };
        for (axis, warning) in solution.warnings() {
            log::warn!("{:?} axis: {}", axis, warning);
        }

        Ok(solution)
    }
}

/// Handle of a solve running on a worker thread.
#[derive(Debug)]
pub struct SolveHandle {
    handle: JoinHandle<Result<WarpSolution, WarpError>>,
    token: CancellationToken,
}

impl SolveHandle {
    /// Request cancellation. The worker stops at the next term-count boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if the worker has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return its result.
    pub fn join(self) -> Result<WarpSolution, WarpError> {
        self.handle
            .join()
            .map_err(|_| WarpError::WorkerPanicked)?
    }
}

/// The two solved axes of a warp together with their control points.
#[derive(Debug, Clone)]
pub struct WarpSolution {
    params: SolverParams,
    x_points: Vec<ControlPoint>,
    y_points: Vec<ControlPoint>,
    x_fit: AxisFit,
    y_fit: AxisFit,
}

impl WarpSolution {
    /// The fit of one axis.
    pub fn fit(&self, axis: Axis) -> &AxisFit {
        match axis {
            Axis::X => &self.x_fit,
            Axis::Y => &self.y_fit,
        }
    }

    /// The x′ fit.
    pub fn x_fit(&self) -> &AxisFit {
        &self.x_fit
    }

    /// The y′ fit.
    pub fn y_fit(&self) -> &AxisFit {
        &self.y_fit
    }

    /// The control points of one axis.
    pub fn control_points(&self, axis: Axis) -> &[ControlPoint] {
        match axis {
            Axis::X => &self.x_points,
            Axis::Y => &self.y_points,
        }
    }

    /// Parameters the solution was computed with.
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Surface evaluator of one axis.
    pub fn evaluator(&self, axis: Axis) -> SurfaceEvaluator<'_> {
        SurfaceEvaluator::new(
            self.control_points(axis),
            &self.fit(axis).matrix,
            &self.params,
        )
    }

    /// Map a source point, rebuilding the basis relative to it.
    pub fn evaluate_at(&self, x: f64, y: f64) -> [f64; 2] {
        [
            self.evaluator(Axis::X).evaluate_at(x, y),
            self.evaluator(Axis::Y).evaluate_at(x, y),
        ]
    }

    /// Map a source point with the solved expansions.
    pub fn evaluate_cached(&self, x: f64, y: f64) -> [f64; 2] {
        [
            self.x_fit.matrix.evaluate(x, y),
            self.y_fit.matrix.evaluate(x, y),
        ]
    }

    /// Evaluate both axes over a `width x height` grid.
    ///
    /// # Returns
    ///
    /// The x′ and y′ maps in row-major order.
    pub fn evaluate_grid(
        &self,
        width: usize,
        height: usize,
        mode: EvaluationMode,
        strategy: ExecutionStrategy,
    ) -> Result<[Vec<f64>; 2], WarpError> {
        let map_x = self
            .evaluator(Axis::X)
            .evaluate_grid(width, height, mode, strategy)?;
        let map_y = self
            .evaluator(Axis::Y)
            .evaluate_grid(width, height, mode, strategy)?;
        Ok([map_x, map_y])
    }

    /// Whether both axes met the error bound.
    pub fn converged(&self) -> bool {
        self.x_fit.converged && self.y_fit.converged
    }

    /// Recoverable conditions of both fits.
    pub fn warnings(&self) -> Vec<(Axis, WarpError)> {
        let x = self.x_fit.warnings().into_iter().map(|w| (Axis::X, w));
        let y = self.y_fit.warnings().into_iter().map(|w| (Axis::Y, w));
        x.chain(y).collect()
    }
}
