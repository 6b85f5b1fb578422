use crate::LandmarkError;

/// Default maximum number of landmarks a store accepts.
pub const DEFAULT_MAX_LANDMARKS: usize = 100;

/// A matched point visible in both images.
///
/// The source coordinate lives in the image being warped and the target
/// coordinate in the reference image. Both are integer pixel positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkPair {
    /// Source image x coordinate.
    pub x1: i32,
    /// Source image y coordinate.
    pub y1: i32,
    /// Target image x coordinate.
    pub x2: i32,
    /// Target image y coordinate.
    pub y2: i32,
    /// Post-transform display coordinate `[ox1, oy1, ox2, oy2]`.
    pub transformed: Option<[f64; 4]>,
}

impl LandmarkPair {
    /// Create a new pair without a post-transform coordinate.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            transformed: None,
        }
    }

    /// The source coordinate as floating point.
    #[inline]
    pub fn source(&self) -> [f64; 2] {
        [self.x1 as f64, self.y1 as f64]
    }

    /// The target coordinate as floating point.
    #[inline]
    pub fn target(&self) -> [f64; 2] {
        [self.x2 as f64, self.y2 as f64]
    }

    fn same_coordinates(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> bool {
        self.x1 == x1 && self.y1 == y1 && self.x2 == x2 && self.y2 == y2
    }
}

/// Returns the display label of the landmark at `index`.
///
/// Labels run `A..Z`, then `AA, AB, ..` in spreadsheet column order.
///
/// # Example
///
/// ```
/// use polywarp_landmarks::landmark_label;
///
/// assert_eq!(landmark_label(0), "A");
/// assert_eq!(landmark_label(26), "AA");
/// ```
pub fn landmark_label(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.iter().rev().map(|&c| c as char).collect()
}

/// Ordered, capacity-bounded collection of landmark pairs.
///
/// Insertion order is significant: labels derive from the position of a pair
/// and the persistence format replays pushes in order.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkStore {
    pairs: Vec<LandmarkPair>,
    max_landmarks: usize,
}

impl Default for LandmarkStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LANDMARKS)
    }
}

impl LandmarkStore {
    /// Create an empty store accepting at most `max_landmarks` pairs.
    pub fn new(max_landmarks: usize) -> Self {
        Self {
            pairs: Vec::with_capacity(max_landmarks.min(DEFAULT_MAX_LANDMARKS)),
            max_landmarks,
        }
    }

    /// Append a landmark pair and return its index.
    ///
    /// # Errors
    ///
    /// * [`LandmarkError::Full`] if the store holds `max_landmarks` pairs.
    /// * [`LandmarkError::DuplicateOfLast`] if the pair equals the most recently
    ///   pushed one. Earlier entries are not compared.
    pub fn push(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<usize, LandmarkError> {
        if self.pairs.len() >= self.max_landmarks {
            return Err(LandmarkError::Full(self.max_landmarks));
        }

        if let Some(last) = self.pairs.last() {
            if last.same_coordinates(x1, y1, x2, y2) {
                return Err(LandmarkError::DuplicateOfLast { x1, y1, x2, y2 });
            }
        }

        self.pairs.push(LandmarkPair::new(x1, y1, x2, y2));
        log::debug!(
            "landmark {} pushed: ({}, {}) -> ({}, {})",
            landmark_label(self.pairs.len() - 1),
            x1,
            y1,
            x2,
            y2
        );

        Ok(self.pairs.len() - 1)
    }

    /// Remove the most recent pair and return the new count.
    ///
    /// Does nothing and returns 0 on an empty store.
    pub fn delete_last(&mut self) -> usize {
        self.pairs.pop();
        self.pairs.len()
    }

    /// Remove every pair.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Number of pairs in the store.
    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check if the store is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Maximum number of pairs the store accepts.
    #[inline]
    pub fn max_landmarks(&self) -> usize {
        self.max_landmarks
    }

    /// Get the pair at `index`.
    pub fn get(&self, index: usize) -> Option<&LandmarkPair> {
        self.pairs.get(index)
    }

    /// Get the most recently pushed pair.
    pub fn last(&self) -> Option<&LandmarkPair> {
        self.pairs.last()
    }

    /// Iterate over the pairs in push order.
    pub fn iter(&self) -> std::slice::Iter<'_, LandmarkPair> {
        self.pairs.iter()
    }

    /// Get as reference the pairs in push order.
    pub fn pairs(&self) -> &[LandmarkPair] {
        &self.pairs
    }

    /// Display label of the pair at `index`.
    pub fn label(&self, index: usize) -> Option<String> {
        (index < self.pairs.len()).then(|| landmark_label(index))
    }

    /// Record the post-transform display coordinate of a pair.
    pub fn set_transformed(
        &mut self,
        index: usize,
        transformed: [f64; 4],
    ) -> Result<(), LandmarkError> {
        let len = self.pairs.len();
        let pair = self
            .pairs
            .get_mut(index)
            .ok_or(LandmarkError::IndexOutOfRange { index, len })?;
        pair.transformed = Some(transformed);
        Ok(())
    }

    /// Compare how the source and target clouds spread around their centroids.
    ///
    /// Computes the sum of squared deviations from the centroid for the source
    /// points (`s1`) and for the target points (`s2`) and returns
    /// `sqrt(|s1 - s2| / n)`.
    ///
    /// # Errors
    ///
    /// [`LandmarkError::InsufficientLandmarks`] with fewer than 3 pairs.
    pub fn similarity(&self) -> Result<f64, LandmarkError> {
        let n = self.pairs.len();
        if n < 3 {
            return Err(LandmarkError::InsufficientLandmarks {
                required: 3,
                actual: n,
            });
        }

        let s1 = spread(self.pairs.iter().map(|p| p.source()));
        let s2 = spread(self.pairs.iter().map(|p| p.target()));

        Ok(((s1 - s2).abs() / n as f64).sqrt())
    }
}

impl<'a> IntoIterator for &'a LandmarkStore {
    type Item = &'a LandmarkPair;
    type IntoIter = std::slice::Iter<'a, LandmarkPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

// sum of squared distances to the centroid
fn spread(points: impl Iterator<Item = [f64; 2]> + Clone) -> f64 {
    let (mut cx, mut cy, mut n) = (0.0, 0.0, 0usize);
    for [x, y] in points.clone() {
        cx += x;
        cy += y;
        n += 1;
    }
    cx /= n as f64;
    cy /= n as f64;

    points
        .map(|[x, y]| (x - cx).powi(2) + (y - cy).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_push_increments_count() -> Result<(), LandmarkError> {
        let mut store = LandmarkStore::default();
        assert_eq!(store.push(10, 10, 12, 11)?, 0);
        assert_eq!(store.push(50, 10, 53, 9)?, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.max_landmarks(), DEFAULT_MAX_LANDMARKS);
        Ok(())
    }

    #[test]
    fn test_push_full() -> Result<(), LandmarkError> {
        let mut store = LandmarkStore::new(3);
        for i in 0..3 {
            store.push(i, i, i + 1, i + 1)?;
        }
        assert_eq!(store.push(9, 9, 9, 9), Err(LandmarkError::Full(3)));
        assert_eq!(store.len(), 3);
        Ok(())
    }

    #[test]
    fn test_push_duplicate_of_last() -> Result<(), LandmarkError> {
        let mut store = LandmarkStore::default();
        store.push(5, 5, 5, 5)?;
        assert!(matches!(
            store.push(5, 5, 5, 5),
            Err(LandmarkError::DuplicateOfLast { .. })
        ));

        // only the last entry is compared
        store.push(20, 30, 21, 31)?;
        assert_eq!(store.push(5, 5, 5, 5)?, 2);
        assert_eq!(store.len(), 3);
        Ok(())
    }

    #[test]
    fn test_delete_last() -> Result<(), LandmarkError> {
        let mut store = LandmarkStore::default();
        assert_eq!(store.delete_last(), 0);

        store.push(1, 2, 3, 4)?;
        store.push(5, 6, 7, 8)?;
        assert_eq!(store.delete_last(), 1);
        assert_eq!(store.last(), Some(&LandmarkPair::new(1, 2, 3, 4)));
        assert_eq!(store.delete_last(), 0);
        assert_eq!(store.delete_last(), 0);
        Ok(())
    }

    #[test]
    fn test_clear() -> Result<(), LandmarkError> {
        let mut store = LandmarkStore::default();
        store.push(1, 2, 3, 4)?;
        store.clear();
        assert!(store.is_empty());
        // a cleared store accepts the previously last pair again
        store.push(1, 2, 3, 4)?;
        Ok(())
    }

    #[test]
    fn test_similarity_insufficient() -> Result<(), LandmarkError> {
        let mut store = LandmarkStore::default();
        store.push(0, 0, 0, 0)?;
        store.push(1, 0, 1, 0)?;
        assert_eq!(
            store.similarity(),
            Err(LandmarkError::InsufficientLandmarks {
                required: 3,
                actual: 2
            })
        );
        Ok(())
    }

    #[test]
    fn test_similarity() -> Result<(), LandmarkError> {
        let mut store = LandmarkStore::default();
        // translated copy: identical spread
        store.push(0, 0, 10, 10)?;
        store.push(4, 0, 14, 10)?;
        store.push(0, 4, 10, 14)?;
        assert_relative_eq!(store.similarity()?, 0.0, epsilon = 1e-12);

        // target cloud scaled by 2
        let mut store = LandmarkStore::default();
        store.push(0, 0, 0, 0)?;
        store.push(3, 0, 6, 0)?;
        store.push(0, 3, 0, 6)?;
        // s1 = 12, s2 = 48
        assert_relative_eq!(store.similarity()?, (36.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_labels() {
        assert_eq!(landmark_label(0), "A");
        assert_eq!(landmark_label(25), "Z");
        assert_eq!(landmark_label(26), "AA");
        assert_eq!(landmark_label(27), "AB");
        assert_eq!(landmark_label(52), "BA");
    }

    #[test]
    fn test_set_transformed() -> Result<(), LandmarkError> {
        let mut store = LandmarkStore::default();
        store.push(1, 2, 3, 4)?;
        store.set_transformed(0, [1.5, 2.5, 3.5, 4.5])?;
        assert_eq!(
            store.get(0).and_then(|p| p.transformed),
            Some([1.5, 2.5, 3.5, 4.5])
        );
        assert_eq!(
            store.set_transformed(3, [0.0; 4]),
            Err(LandmarkError::IndexOutOfRange { index: 3, len: 1 })
        );
        assert_eq!(store.label(0).as_deref(), Some("A"));
        assert_eq!(store.label(1), None);
        Ok(())
    }
}
