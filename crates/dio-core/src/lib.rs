//! Core types for composite digital I/O devices.
//!
//! This crate holds the boundary shared by line providers, the aggregation
//! engine and the mock driver:
//!
//! - [`LineHandle`] / [`LineProvider`] - acquired lines and their owner
//! - [`LineDevice`] / [`DevicePublisher`] - position-addressed multi-line devices
//! - [`LineMask`] - bitset used for selection masks and value bitmaps
//! - [`read_array`] / [`write_array`] - batched access over a handle list
//! - [`DioError`] - errors reported by providers and devices

pub mod array;
pub mod error;
pub mod line;
pub mod mask;

pub use array::{read_array, write_array};
pub use error::{DioError, DioErrorKind, DioResult};
pub use line::{
    DevicePublisher, Direction, HwIndex, LineConfig, LineDevice, LineHandle, LineProvider,
    LineSelector,
};
pub use mask::{IterOnes, LineMask};
