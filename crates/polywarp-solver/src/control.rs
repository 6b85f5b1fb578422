use polywarp_landmarks::LandmarkStore;

/// The output coordinate a surface maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// The x′ mapping, fitted to the target x coordinates.
    X,
    /// The y′ mapping, fitted to the target y coordinates.
    Y,
}

/// A source-space location with the target scalar the surface must reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPoint {
    /// Source x coordinate.
    pub x: f64,
    /// Source y coordinate.
    pub y: f64,
    /// Target value for the fitted axis.
    pub target: f64,
}

impl ControlPoint {
    /// Create a new control point.
    pub fn new(x: f64, y: f64, target: f64) -> Self {
        Self { x, y, target }
    }
}

/// Extract the control points of one axis from the landmark store.
///
/// The source coordinate of every pair is the control location; the target
/// is `x2` for [`Axis::X`] and `y2` for [`Axis::Y`].
pub fn control_points(landmarks: &LandmarkStore, axis: Axis) -> Vec<ControlPoint> {
    landmarks
        .iter()
        .map(|pair| {
            let target = match axis {
                Axis::X => pair.x2,
                Axis::Y => pair.y2,
            };
            ControlPoint::new(pair.x1 as f64, pair.y1 as f64, target as f64)
        })
        .collect()
}

/// Centroid of the control locations, `[0, 0]` for an empty set.
pub fn centroid(points: &[ControlPoint]) -> [f64; 2] {
    if points.is_empty() {
        return [0.0, 0.0];
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    [sx / n, sy / n]
}
