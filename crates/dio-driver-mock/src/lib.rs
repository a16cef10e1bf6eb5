//! Mock line provider for dio-aggregator
//!
//! This crate provides simulated line controllers so the aggregation engine
//! can be exercised without hardware.
//!
//! # Components
//!
//! - [`MockChip`] - bank of lines with names, polarity and an optional IRQ base
//! - [`MockLineProvider`] - [`dio_core::LineProvider`] over mock chips, with
//!   busy tracking and an acquire/release event log; also a
//!   [`dio_core::DevicePublisher`] so published composite devices can be
//!   aggregated again
//! - [`FaultConfig`] - fault injection (fail after a count, denied access,
//!   latched hardware faults, seeded random failures)
//!
//! # Example
//!
//! ```
//! use dio_core::{LineProvider, LineSelector};
//! use dio_driver_mock::{MockChipConfig, MockLineProvider};
//!
//! let provider = MockLineProvider::from_configs([
//!     MockChipConfig::new("gpio0", 8).with_names(["reset"]),
//! ])?;
//!
//! let reset = provider.acquire(&LineSelector::named("reset"), "demo")?;
//! reset.set_direction_output(true)?;
//! assert_eq!(provider.chip("gpio0").unwrap().level(0), Some(true));
//! provider.release(&reset);
//! # Ok::<(), dio_core::DioError>(())
//! ```

pub mod chip;
pub mod faults;
pub mod provider;

pub use chip::{MockChip, MockChipConfig, MockLine, MockLineHandle};
pub use faults::{Fault, FaultConfig, LineOp};
pub use provider::{MockLineProvider, ProviderEvent};
