/// Errors raised by the landmark store.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    /// The store already holds its maximum number of landmarks.
    #[error("landmark store is full ({0} landmarks)")]
    Full(usize),

    /// The pushed pair is identical to the most recently pushed one.
    #[error("landmark ({x1}, {y1}) -> ({x2}, {y2}) duplicates the last entry")]
    DuplicateOfLast {
        /// Source x coordinate.
        x1: i32,
        /// Source y coordinate.
        y1: i32,
        /// Target x coordinate.
        x2: i32,
        /// Target y coordinate.
        y2: i32,
    },

    /// The operation needs more landmarks than the store holds.
    #[error("at least {required} landmarks are required, got {actual}")]
    InsufficientLandmarks {
        /// Minimum number of landmarks required.
        required: usize,
        /// Number of landmarks in the store.
        actual: usize,
    },

    /// The landmark index does not exist.
    #[error("landmark index {index} out of range for {len} landmarks")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of landmarks in the store.
        len: usize,
    },
}
