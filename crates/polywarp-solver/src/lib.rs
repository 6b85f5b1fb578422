#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::WarpError;

/// Control points extracted from a landmark set.
pub mod control;

/// Inverse-distance weighting of control points.
pub mod weights;

/// Raw monomials and the weighted orthogonal basis built from them.
pub mod basis;

/// Adaptive coefficient solver.
pub mod solver;

/// Evaluation of fitted surfaces at points and over grids.
pub mod surface;

/// Two-axis warp estimation driven from a landmark store.
pub mod engine;

/// Linear affine estimation from the same landmarks.
pub mod affine;

/// Parallel execution helpers for grid evaluation.
pub mod parallel;

pub use affine::{fit_affine, AffineTransform};
pub use control::{Axis, ControlPoint};
pub use engine::{SolveHandle, WarpEngine, WarpSolution};
pub use parallel::ExecutionStrategy;
pub use solver::{AxisFit, CoefficientMatrix, CoefficientSolver, SolverParams};
pub use surface::{eval_poly, EvaluationMode, SurfaceEvaluator};
pub use weights::{WeightFunction, WeightParams};

/// Re-export of the cancellation token accepted by long-running solves.
pub use tokio_util::sync::CancellationToken;
