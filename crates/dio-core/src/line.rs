//! Line-level types and the provider boundary.
//!
//! A [`LineProvider`] owns physical lines and hands out [`LineHandle`]s for
//! them. A [`LineDevice`] is a multi-line device addressed by position; the
//! aggregator's forwarder is one, and a [`DevicePublisher`] makes such a
//! device visible to the rest of the system under a name.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DioResult;
use crate::mask::LineMask;

/// Direction of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Line is sampled
    #[default]
    Input,
    /// Line is driven
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "in"),
            Direction::Output => write!(f, "out"),
        }
    }
}

/// Electrical configuration passed through to the provider unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineConfig {
    /// No bias
    BiasDisable,
    /// Pull-up bias
    BiasPullUp,
    /// Pull-down bias
    BiasPullDown,
    /// Push-pull output
    DrivePushPull,
    /// Open-drain output
    DriveOpenDrain,
    /// Open-source output
    DriveOpenSource,
    /// Drive strength in milliamps.
    DriveStrength(u32),
    /// Input debounce period in microseconds.
    Debounce(u32),
    /// Provider-specific packed configuration word.
    Raw(u64),
}

/// Hardware index part of a line selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HwIndex {
    /// The key is itself a line name.
    ByName,
    /// The key is a controller label and this is the line offset on it.
    Offset(u32),
}

impl fmt::Display for HwIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HwIndex::ByName => write!(f, "by-name"),
            HwIndex::Offset(offset) => write!(f, "{}", offset),
        }
    }
}

/// Everything a provider needs to find one line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineSelector {
    /// Line name, or controller label when `hw_index` is an offset.
    pub key: String,
    /// Offset, or `Named` to look the line up by name.
    pub hw_index: HwIndex,
}

impl LineSelector {
    /// Select a line by its global name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            key: name.into(),
            hw_index: HwIndex::ByName,
        }
    }

    /// Select line `offset` on controller `label`.
    pub fn offset(label: impl Into<String>, offset: u32) -> Self {
        Self {
            key: label.into(),
            hw_index: HwIndex::Offset(offset),
        }
    }
}

impl fmt::Display for LineSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hw_index {
            HwIndex::ByName => write!(f, "{}", self.key),
            HwIndex::Offset(offset) => write!(f, "{} {}", self.key, offset),
        }
    }
}

/// One acquired line.
///
/// Values are logical: a provider applies the line's active-low polarity
/// before returning from `read` and before driving in `write`.
pub trait LineHandle: Send + Sync + fmt::Debug {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Whether operations on this line may sleep.
    fn may_block(&self) -> bool;

    /// Whether the logical value is inverted relative to the physical level.
    fn active_low(&self) -> bool;

    /// Current direction.
    fn direction(&self) -> DioResult<Direction>;

    /// Switch to input.
    fn set_direction_input(&self) -> DioResult<()>;

    /// Switch to output, driving `value` (logical).
    fn set_direction_output(&self, value: bool) -> DioResult<()>;

    /// Logical value, polarity applied.
    fn read(&self) -> DioResult<bool>;

    /// Drive the logical `value`.
    fn write(&self, value: bool) -> DioResult<()>;

    /// Map the line to its interrupt number.
    fn to_irq(&self) -> DioResult<u32>;

    /// Apply bias or drive configuration.
    fn set_config(&self, config: LineConfig) -> DioResult<()>;
}

/// Owner of physical lines.
pub trait LineProvider: Send + Sync {
    /// Acquire exclusive use of the selected line on behalf of `consumer`.
    fn acquire(&self, selector: &LineSelector, consumer: &str) -> DioResult<Arc<dyn LineHandle>>;

    /// Give a previously acquired line back.
    fn release(&self, handle: &Arc<dyn LineHandle>);
}

/// A multi-line device addressed by 0-based position.
pub trait LineDevice: Send + Sync {
    /// Device name.
    fn label(&self) -> &str;

    /// Number of positions.
    fn line_count(&self) -> u32;

    /// Whether any operation on this device may sleep.
    fn can_block(&self) -> bool;

    /// Check that `position` can be used.
    fn request(&self, position: u32) -> DioResult<()>;

    /// Direction of `position`.
    fn get_direction(&self, position: u32) -> DioResult<Direction>;

    /// Switch `position` to input.
    fn set_direction_input(&self, position: u32) -> DioResult<()>;

    /// Switch `position` to output, driving `value`.
    fn set_direction_output(&self, position: u32, value: bool) -> DioResult<()>;

    /// Logical value at `position`.
    fn get(&self, position: u32) -> DioResult<bool>;

    /// Read every position selected in `mask` into the same bits of `bits`.
    fn get_multiple(&self, mask: &LineMask, bits: &mut LineMask) -> DioResult<()>;

    /// Drive `position`, applying any ramp delay.
    fn set(&self, position: u32, value: bool) -> DioResult<()>;

    /// Write the bits of `bits` selected by `mask`.
    fn set_multiple(&self, mask: &LineMask, bits: &LineMask) -> DioResult<()>;

    /// Interrupt number of the line at `position`.
    fn to_irq(&self, position: u32) -> DioResult<u32>;

    /// Apply bias or drive configuration to `position`.
    fn set_config(&self, position: u32, config: LineConfig) -> DioResult<()>;
}

/// Makes devices reachable by name.
pub trait DevicePublisher: Send + Sync {
    /// Expose `device` under `name`.
    fn publish(&self, name: &str, device: Arc<dyn LineDevice>) -> DioResult<()>;

    /// Remove a published device. Unknown names are ignored.
    fn unpublish(&self, name: &str);
}
