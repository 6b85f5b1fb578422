use crate::ControlPoint;

/// Parameters of the inverse-distance weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightParams {
    /// Smoothing constant added to the squared distance. `0` disables smoothing.
    pub delta: f64,
    /// Floor on the smoothed squared distance.
    ///
    /// Keeps the weight of a control point finite when it coincides with the
    /// evaluation point and `delta` is zero.
    pub min_distance_sq: f64,
}

impl Default for WeightParams {
    fn default() -> Self {
        Self {
            delta: 0.0,
            min_distance_sq: 1e-6,
        }
    }
}

/// Inverse-distance weights of control points relative to an evaluation point.
///
/// The weight of control point `i` for the evaluation point `q` is
///
/// `w_i = 1 / sqrt((x_i - q_x)^2 + (y_i - q_y)^2 + delta)`
///
/// The evaluation point is the fit reference point while solving and the
/// query point while evaluating a surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeightFunction {
    params: WeightParams,
}

impl WeightFunction {
    /// Create a new weight function.
    pub fn new(params: WeightParams) -> Self {
        Self { params }
    }

    /// The weighting parameters.
    pub fn params(&self) -> &WeightParams {
        &self.params
    }

    /// Weight of a single control point.
    #[inline]
    pub fn weight(&self, point: &ControlPoint, reference: [f64; 2]) -> f64 {
        let dx = point.x - reference[0];
        let dy = point.y - reference[1];
        let d2 = (dx * dx + dy * dy + self.params.delta).max(self.params.min_distance_sq);
        1.0 / d2.sqrt()
    }

    /// Compute the weight vector into `weights`, replacing its contents.
    pub fn compute_into(
        &self,
        points: &[ControlPoint],
        reference: [f64; 2],
        weights: &mut Vec<f64>,
    ) {
        weights.clear();
        weights.extend(points.iter().map(|p| self.weight(p, reference)));
    }

    /// Compute the weight vector.
    pub fn compute(&self, points: &[ControlPoint], reference: [f64; 2]) -> Vec<f64> {
        points.iter().map(|p| self.weight(p, reference)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_distance() {
        let wf = WeightFunction::default();
        let points = [
            ControlPoint::new(3.0, 4.0, 0.0),
            ControlPoint::new(0.0, 10.0, 0.0),
        ];
        let w = wf.compute(&points, [0.0, 0.0]);
        assert_relative_eq!(w[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(w[1], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_smoothing_delta() {
        let wf = WeightFunction::new(WeightParams {
            delta: 11.0,
            ..Default::default()
        });
        let w = wf.weight(&ControlPoint::new(3.0, 4.0, 0.0), [1.0, 2.0]);
        // sqrt(4 + 4 + 11) = sqrt(19)
        assert_relative_eq!(w, 1.0 / 19f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_coincident_point_is_finite() {
        let wf = WeightFunction::default();
        let w = wf.weight(&ControlPoint::new(5.0, 5.0, 5.0), [5.0, 5.0]);
        assert!(w.is_finite());
        assert_relative_eq!(w, 1e3, epsilon = 1e-9);
    }

    #[test]
    fn test_compute_into() {
        let wf = WeightFunction::default();
        let points = [ControlPoint::new(0.0, 2.0, 0.0)];
        let mut w = vec![7.0; 3];
        wf.compute_into(&points, [0.0, 0.0], &mut w);
        assert_eq!(w.len(), 1);
        assert_relative_eq!(w[0], 0.5, epsilon = 1e-12);
    }
}
