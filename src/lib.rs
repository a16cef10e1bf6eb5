//! # dio-aggregator
//!
//! Builds virtual multi-line digital I/O devices out of individual lines
//! owned by one or more line controllers, and forwards every operation on
//! the composite device to the lines behind it.
//!
//! ## Crate Structure
//!
//! - [`parser`] - request text to line selectors
//! - [`lookup`] - positions bound to selectors, duplicate detection
//! - [`forwarder`] - the composite device: single-line passthrough, batched
//!   get/set under a spin or blocking lock, per-line ramp delay
//! - [`registry`] - create/destroy lifecycle and id allocation
//! - [`management`] - `new_device` / `delete_device` text interface
//! - [`console`] - stdin command loop used by the binary
//! - [`config`] / [`logging`] - Figment configuration and tracing setup
//!
//! Line controllers are reached through [`dio_core::LineProvider`]; the
//! `dio-driver-mock` crate supplies simulated ones.

pub mod config;
pub mod console;
pub mod error;
pub mod forwarder;
pub mod logging;
pub mod lookup;
pub mod management;
pub mod parser;
pub mod registry;

pub use console::{Console, Reply};
pub use error::{AggregatorError, AggregatorResult, ErrorClass};
pub use forwarder::{Forwarder, ForwarderFeatures, LockKind, RampTiming};
pub use lookup::{LookupEntry, LookupTable};
pub use management::Management;
pub use parser::{parse_request, ParseError, MAX_LINES};
pub use registry::{AggregatorInfo, AggregatorRegistry, DEFAULT_DEVICE_PREFIX};
