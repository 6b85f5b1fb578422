#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use polywarp_landmarks as landmarks;

#[doc(inline)]
pub use polywarp_solver as solver;
