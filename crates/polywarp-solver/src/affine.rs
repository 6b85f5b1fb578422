use faer::prelude::SpSolverLstsq;
use polywarp_landmarks::LandmarkStore;

use crate::WarpError;

/// A 2x3 affine transform mapping source to target coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    /// The rows `[a, b, c]` and `[d, e, f]` of `x' = a x + b y + c`, `y' = d x + e y + f`.
    pub matrix: [[f64; 3]; 2],
}

impl AffineTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        }
    }

    /// Map a source point.
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> [f64; 2] {
        let [r0, r1] = &self.matrix;
        [
            r0[0] * x + r0[1] * y + r0[2],
            r1[0] * x + r1[1] * y + r1[2],
        ]
    }

    /// Largest distance between a mapped source point and its target.
    pub fn max_error(&self, landmarks: &LandmarkStore) -> f64 {
        landmarks
            .iter()
            .map(|pair| {
                let [x, y] = pair.source();
                let [u, v] = self.apply(x, y);
                let [tu, tv] = pair.target();
                ((u - tu).powi(2) + (v - tv).powi(2)).sqrt()
            })
            .fold(0.0, f64::max)
    }
}

/// Least-squares 6-parameter affine transform from the landmark pairs.
///
/// # Errors
///
/// * [`WarpError::InsufficientLandmarks`] with fewer than 3 pairs.
/// * [`WarpError::DegenerateAffine`] if the source points are colinear.
pub fn fit_affine(landmarks: &LandmarkStore) -> Result<AffineTransform, WarpError> {
    let n = landmarks.len();
    if n < 3 {
        return Err(WarpError::InsufficientLandmarks {
            required: 3,
            actual: n,
        });
    }

    let pairs = landmarks.pairs();

    // the source scatter matrix must have full rank
    let (mx, my) = pairs.iter().fold((0.0, 0.0), |(mx, my), p| {
        (mx + p.x1 as f64 / n as f64, my + p.y1 as f64 / n as f64)
    });
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in pairs {
        let (dx, dy) = (p.x1 as f64 - mx, p.y1 as f64 - my);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx * syy - sxy * sxy <= 1e-9 * (sxx + syy).powi(2) {
        return Err(WarpError::DegenerateAffine);
    }

    // construct matrix A: two rows per pair
    let mat_a = faer::Mat::<f64>::from_fn(2 * n, 6, |r, c| {
        let [x, y] = pairs[r / 2].source();
        match (r % 2, c) {
            (0, 0) | (1, 3) => x,
            (0, 1) | (1, 4) => y,
            (0, 2) | (1, 5) => 1.0,
            _ => 0.0,
        }
    });
    let mat_b = faer::Mat::<f64>::from_fn(2 * n, 1, |r, _| {
        let [u, v] = pairs[r / 2].target();
        if r % 2 == 0 {
            u
        } else {
            v
        }
    });

    let params = mat_a.qr().solve_lstsq(mat_b);
    let aff = params.col(0);

    Ok(AffineTransform {
        matrix: [[aff[0], aff[1], aff[2]], [aff[3], aff[4], aff[5]]],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_affine_translation() -> Result<(), Box<dyn std::error::Error>> {
        let mut landmarks = LandmarkStore::default();
        landmarks.push(0, 0, 1, 2)?;
        landmarks.push(10, 0, 11, 2)?;
        landmarks.push(0, 10, 1, 12)?;
        landmarks.push(10, 10, 11, 12)?;

        let affine = fit_affine(&landmarks)?;
        let expected = [[1.0, 0.0, 1.0], [0.0, 1.0, 2.0]];
        for i in 0..2 {
            for j in 0..3 {
                assert_relative_eq!(affine.matrix[i][j], expected[i][j], epsilon = 1e-9);
            }
        }
        assert_relative_eq!(affine.max_error(&landmarks), 0.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_affine_scale_shear() -> Result<(), Box<dyn std::error::Error>> {
        let truth = AffineTransform {
            matrix: [[2.0, 1.0, -3.0], [0.0, 3.0, 5.0]],
        };
        let mut landmarks = LandmarkStore::default();
        for (x, y) in [(0, 0), (4, 1), (2, 7), (9, 3)] {
            let [u, v] = truth.apply(x as f64, y as f64);
            landmarks.push(x, y, u as i32, v as i32)?;
        }
        let affine = fit_affine(&landmarks)?;
        for i in 0..2 {
            for j in 0..3 {
                assert_relative_eq!(affine.matrix[i][j], truth.matrix[i][j], epsilon = 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn test_fit_affine_errors() -> Result<(), Box<dyn std::error::Error>> {
        let mut landmarks = LandmarkStore::default();
        landmarks.push(0, 0, 0, 0)?;
        landmarks.push(1, 1, 1, 1)?;
        assert_eq!(
            fit_affine(&landmarks),
            Err(WarpError::InsufficientLandmarks {
                required: 3,
                actual: 2
            })
        );

        landmarks.push(2, 2, 3, 3)?;
        assert_eq!(fit_affine(&landmarks), Err(WarpError::DegenerateAffine));
        Ok(())
    }

    #[test]
    fn test_identity() {
        assert_eq!(AffineTransform::identity().apply(3.0, -2.0), [3.0, -2.0]);
    }
}
