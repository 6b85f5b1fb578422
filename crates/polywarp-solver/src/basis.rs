//! Weighted orthogonal polynomial basis over a set of control points.
//!
//! The raw basis is a fixed enumeration of low degree bivariate monomials:
//!
//! | slot | 0 | 1 | 2 | 3  | 4  | 5  | 6  | 7   | 8   | 9  |
//! |------|---|---|---|----|----|----|----|-----|-----|----|
//! | term | 1 | x | y | x² | y² | y² | x³ | x²y | xy² | y³ |
//!
//! Slot 5 repeats slot 4. Its orthogonalized form vanishes and the term is
//! flagged singular whenever both slots are in use.
//!
//! Orthogonal term `k` is defined recursively as
//!
//! `poly_k(x, y) = sum_{j<k} aM[k][j] * poly_j(x, y) + aM[k][k] * basis_k(x, y)`
//!
//! with `aM[k][k] = 1` and the off-diagonal entries cancelling the weighted
//! projection of `basis_k` onto every lower term.

use crate::ControlPoint;

/// Maximum number of terms of a fit.
pub const MXTERMS: usize = 10;

/// Total degree of every raw basis slot.
pub const RAW_DEGREES: [i32; MXTERMS] = [0, 1, 1, 2, 2, 2, 3, 3, 3, 3];

/// Evaluate raw basis slot `k` at `(x, y)`.
///
/// Slots outside `0..MXTERMS` evaluate to zero.
#[inline]
pub fn raw_basis(k: usize, x: f64, y: f64) -> f64 {
    match k {
        0 => 1.0,
        1 => x,
        2 => y,
        3 => x * x,
        4 | 5 => y * y,
        6 => x * x * x,
        7 => x * x * y,
        8 => x * y * y,
        9 => y * y * y,
        _ => 0.0,
    }
}

/// Scale applied to coordinates before evaluating the raw basis.
///
/// The largest absolute control coordinate, at least one. Uniform scaling
/// keeps the span of the basis and bounds the magnitude of cubic terms.
pub fn coordinate_scale(points: &[ControlPoint]) -> f64 {
    points
        .iter()
        .fold(1.0f64, |acc, p| acc.max(p.x.abs()).max(p.y.abs()))
}

/// Lower-triangular matrix stored row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangularMatrix {
    size: usize,
    data: Vec<f64>,
}

impl TriangularMatrix {
    /// Create a `size x size` lower-triangular matrix filled with zeros.
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            data: vec![0.0; size * (size + 1) / 2],
        }
    }

    /// Number of rows.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn offset(row: usize) -> usize {
        row * (row + 1) / 2
    }

    /// Get the entry at `(row, col)`. Entries above the diagonal are zero.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.size || col > row {
            return 0.0;
        }
        self.data[Self::offset(row) + col]
    }

    /// Set the entry at `(row, col)`.
    ///
    /// # Panics
    ///
    /// If `(row, col)` lies above the diagonal or outside the matrix.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        assert!(row < self.size && col <= row, "({row}, {col}) outside the triangle");
        self.data[Self::offset(row) + col] = value;
    }

    /// The entries `0..=row` of a row.
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[Self::offset(row)..Self::offset(row + 1)]
    }
}

/// Evaluate every orthogonal term at `(x, y)` into `out`.
///
/// Terms are evaluated in increasing order so each one reuses the values of
/// the lower terms already stored in `out`.
pub fn evaluate_terms(recursion: &TriangularMatrix, scale: f64, x: f64, y: f64, out: &mut [f64]) {
    let (sx, sy) = (x / scale, y / scale);
    for k in 0..recursion.size().min(out.len()) {
        let row = recursion.row(k);
        let mut v = row[k] * raw_basis(k, sx, sy);
        for j in 0..k {
            v += row[j] * out[j];
        }
        out[k] = v;
    }
}

/// Weighted orthogonal basis built over a set of control points.
///
/// Besides the recursion coefficients it keeps the value of every term at
/// every control point, so a term is evaluated once per point.
#[derive(Debug, Clone)]
pub struct OrthogonalBasis {
    recursion: TriangularMatrix,
    norms: Vec<f64>,
    singular: Vec<bool>,
    scale: f64,
    // row-major, one row of `term_count` values per control point
    values: Vec<f64>,
}

impl OrthogonalBasis {
    /// Build the basis of the first `term_count` raw slots.
    ///
    /// # Arguments
    ///
    /// * `points` - The control points.
    /// * `weights` - One weight per control point.
    /// * `term_count` - Number of terms, at most [`MXTERMS`].
    /// * `scale` - Coordinate scale, see [`coordinate_scale`].
    /// * `singular_tol` - Relative threshold below which a term is singular.
    ///
    /// A term is singular when its weighted norm after orthogonalization is
    /// below `singular_tol` times the norm of its raw slot. Singular terms get
    /// an all-zero recursion row and evaluate to zero everywhere.
    pub fn build(
        points: &[ControlPoint],
        weights: &[f64],
        term_count: usize,
        scale: f64,
        singular_tol: f64,
    ) -> Self {
        assert_eq!(points.len(), weights.len());
        assert!(term_count <= MXTERMS, "at most {MXTERMS} terms");

        let n = points.len();
        let terms = term_count;
        let mut recursion = TriangularMatrix::zeros(terms);
        let mut norms = vec![0.0; terms];
        let mut singular = vec![false; terms];
        let mut values = vec![0.0; n * terms];
        let mut residual = vec![0.0; n];

        for k in 0..terms {
            for (r, p) in residual.iter_mut().zip(points.iter()) {
                *r = raw_basis(k, p.x / scale, p.y / scale);
            }
            let raw_norm = weighted_dot(weights, &residual, &residual);

            let mut row = vec![0.0; k + 1];
            row[k] = 1.0;

            // modified Gram-Schmidt, second pass restores orthogonality lost to rounding
            for _ in 0..2 {
                for j in (0..k).filter(|&j| !singular[j]) {
                    let dot: f64 = (0..n)
                        .map(|i| weights[i] * residual[i] * values[i * terms + j])
                        .sum();
                    let c = dot / norms[j];
                    for (i, r) in residual.iter_mut().enumerate() {
                        *r -= c * values[i * terms + j];
                    }
                    row[j] -= c;
                }
            }

            let norm = weighted_dot(weights, &residual, &residual);
            if !norm.is_finite() || raw_norm <= 0.0 || norm <= singular_tol * raw_norm {
                log::debug!(
                    "term {} is singular: norm {:e}, raw norm {:e}",
                    k,
                    norm,
                    raw_norm
                );
                singular[k] = true;
                continue;
            }

            norms[k] = norm;
            for (j, &a) in row.iter().enumerate() {
                recursion.set(k, j, a);
            }
            for (i, &r) in residual.iter().enumerate() {
                values[i * terms + k] = r;
            }
        }

        Self {
            recursion,
            norms,
            singular,
            scale,
            values,
        }
    }

    /// Number of terms of the basis.
    #[inline]
    pub fn term_count(&self) -> usize {
        self.recursion.size()
    }

    /// The recursion coefficients `aM`.
    pub fn recursion(&self) -> &TriangularMatrix {
        &self.recursion
    }

    /// Consume the basis and return the recursion coefficients.
    pub fn into_recursion(self) -> TriangularMatrix {
        self.recursion
    }

    /// Coordinate scale used by the basis.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Weighted squared norm of every term, zero for singular terms.
    pub fn norms(&self) -> &[f64] {
        &self.norms
    }

    /// Check if term `k` was skipped as singular.
    pub fn is_singular(&self, k: usize) -> bool {
        self.singular.get(k).copied().unwrap_or(false)
    }

    /// Indices of the singular terms.
    pub fn singular_terms(&self) -> Vec<usize> {
        (0..self.term_count())
            .filter(|&k| self.singular[k])
            .collect()
    }

    /// Value of term `term` at control point `point`.
    #[inline]
    pub fn value(&self, point: usize, term: usize) -> f64 {
        self.values[point * self.term_count() + term]
    }

    /// Project target values onto every term.
    ///
    /// `a_k = sum_i w_i t_i poly_k(p_i) / sum_i w_i poly_k(p_i)^2`, zero for
    /// singular terms.
    pub fn project(&self, points: &[ControlPoint], weights: &[f64]) -> Vec<f64> {
        let terms = self.term_count();
        (0..terms)
            .map(|k| {
                if self.singular[k] {
                    return 0.0;
                }
                let num: f64 = points
                    .iter()
                    .zip(weights.iter())
                    .enumerate()
                    .map(|(i, (p, w))| w * p.target * self.values[i * terms + k])
                    .sum();
                num / self.norms[k]
            })
            .collect()
    }

    /// Reconstruct the fitted value at control point `point`.
    pub fn reconstruct(&self, point: usize, coefficients: &[f64]) -> f64 {
        coefficients
            .iter()
            .enumerate()
            .map(|(k, a)| a * self.value(point, k))
            .sum()
    }

    /// Evaluate every term at an arbitrary `(x, y)`.
    pub fn evaluate_into(&self, x: f64, y: f64, out: &mut [f64]) {
        evaluate_terms(&self.recursion, self.scale, x, y, out);
    }
}

fn weighted_dot(weights: &[f64], a: &[f64], b: &[f64]) -> f64 {
    weights
        .iter()
        .zip(a.iter().zip(b.iter()))
        .map(|(w, (a, b))| w * a * b)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WeightFunction;
    use approx::assert_relative_eq;

    fn grid_points() -> Vec<ControlPoint> {
        let mut points = Vec::new();
        for r in 0..4 {
            for c in 0..4 {
                let (x, y) = (10.0 + 15.0 * c as f64 + r as f64, 20.0 + 12.0 * r as f64);
                points.push(ControlPoint::new(x, y, 0.5 * x + 0.01 * x * y));
            }
        }
        points
    }

    #[test]
    fn test_raw_basis() {
        let (x, y) = (2.0, 3.0);
        let expected = [1.0, 2.0, 3.0, 4.0, 9.0, 9.0, 8.0, 12.0, 18.0, 27.0];
        for (k, e) in expected.iter().enumerate() {
            assert_eq!(raw_basis(k, x, y), *e);
        }
        assert_eq!(raw_basis(MXTERMS, x, y), 0.0);
    }

    #[test]
    fn test_triangular_matrix() {
        let mut m = TriangularMatrix::zeros(3);
        m.set(2, 1, 4.0);
        m.set(1, 1, 2.0);
        assert_eq!(m.get(2, 1), 4.0);
        assert_eq!(m.get(1, 2), 0.0);
        assert_eq!(m.get(5, 0), 0.0);
        assert_eq!(m.row(1), &[0.0, 2.0]);
        assert_eq!(m.row(2), &[0.0, 4.0, 0.0]);
    }

    #[test]
    fn test_weighted_orthogonality() {
        let points = grid_points();
        let weights = WeightFunction::default().compute(&points, [40.0, 35.0]);
        let scale = coordinate_scale(&points);
        let basis = OrthogonalBasis::build(&points, &weights, MXTERMS, scale, 1e-10);

        for j in 0..MXTERMS {
            for k in 0..j {
                let dot: f64 = (0..points.len())
                    .map(|i| weights[i] * basis.value(i, j) * basis.value(i, k))
                    .sum();
                let bound = 1e-9 * (basis.norms()[j] * basis.norms()[k]).sqrt().max(1e-300);
                assert!(dot.abs() <= bound, "terms {} and {} not orthogonal: {}", j, k, dot);
            }
        }
        assert_eq!(basis.recursion().get(0, 0), 1.0);
    }

    #[test]
    fn test_duplicate_slot_is_singular() {
        let points = grid_points();
        let weights = vec![1.0; points.len()];
        let basis = OrthogonalBasis::build(&points, &weights, 7, coordinate_scale(&points), 1e-10);
        assert_eq!(basis.singular_terms(), vec![5]);
        assert!(basis.recursion().row(5).iter().all(|&a| a == 0.0));
        assert_eq!(basis.project(&points, &weights)[5], 0.0);
    }

    #[test]
    fn test_colinear_points_are_singular() {
        let points = (0..5)
            .map(|i| ControlPoint::new(i as f64, 2.0 * i as f64 + 1.0, i as f64))
            .collect::<Vec<_>>();
        let weights = vec![1.0; points.len()];
        let basis = OrthogonalBasis::build(&points, &weights, 3, coordinate_scale(&points), 1e-10);
        assert!(!basis.is_singular(1));
        assert!(basis.is_singular(2));
        let coeffs = basis.project(&points, &weights);
        assert!(coeffs.iter().all(|a| a.is_finite()));
    }

    #[test]
    fn test_evaluate_matches_table() {
        let points = grid_points();
        let weights = WeightFunction::default().compute(&points, [0.0, 0.0]);
        let basis = OrthogonalBasis::build(&points, &weights, 9, coordinate_scale(&points), 1e-10);
        let mut out = vec![0.0; 9];
        for (i, p) in points.iter().enumerate() {
            basis.evaluate_into(p.x, p.y, &mut out);
            for (k, v) in out.iter().enumerate() {
                assert_relative_eq!(*v, basis.value(i, k), epsilon = 1e-9, max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn test_projection_reproduces_polynomial() {
        // a linear target lies in the span of the first three terms
        let points = grid_points()
            .into_iter()
            .map(|p| ControlPoint::new(p.x, p.y, 3.0 - 0.25 * p.x + 2.0 * p.y))
            .collect::<Vec<_>>();
        let weights = vec![1.0; points.len()];
        let basis = OrthogonalBasis::build(&points, &weights, 3, coordinate_scale(&points), 1e-10);
        let coeffs = basis.project(&points, &weights);
        for (i, p) in points.iter().enumerate() {
            assert_relative_eq!(basis.reconstruct(i, &coeffs), p.target, epsilon = 1e-9);
        }
    }
}
