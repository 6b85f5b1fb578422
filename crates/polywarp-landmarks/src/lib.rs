#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::LandmarkError;

/// Landmark pairs and the capacity-bounded store holding them.
pub mod store;
pub use store::{landmark_label, LandmarkPair, LandmarkStore, DEFAULT_MAX_LANDMARKS};

/// Reading and writing the landmark section of a state file.
pub mod state;
