//! Binary text deltas for revfs.
//!
//! File content changes travel as a sequence of [`DeltaWindow`]s. Each window
//! rebuilds a slice of the target from three instruction kinds: copy from a
//! view of the source, copy from the target bytes already produced by this
//! window, or copy from the window's own new data.
//!
//! # Key Types
//!
//! - [`DeltaWindow`] / [`DeltaOp`] — one window and its instructions
//! - [`compute_delta`] — source and target bytes to windows (Myers, via `similar`)
//! - [`DeltaApplier`] — push windows one at a time against a source
//! - [`TextDeltaStream`] — iterator over the windows between two texts

pub mod apply;
pub mod compute;
pub mod error;
pub mod window;

pub use apply::{apply_delta, DeltaApplier};
pub use compute::{compute_delta, TextDeltaStream};
pub use error::{DeltaError, DeltaResult};
pub use window::{DeltaOp, DeltaWindow, WINDOW_SIZE};
