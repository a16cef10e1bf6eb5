//! Simulated line controller.
//!
//! A [`MockChip`] is a bank of lines behind one label. Each line keeps a
//! physical level, a direction, an optional name and a fixed polarity. Handles
//! acquired from the provider see logical values (polarity applied).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dio_core::{DioError, DioResult, Direction, LineConfig, LineHandle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::faults::{FaultConfig, LineOp};

/// Declarative description of a mock chip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MockChipConfig {
    /// Controller label used by offset selectors
    pub label: String,

    /// Number of lines on the chip
    pub lines: u32,

    /// Line names, assigned from offset 0 upward; empty strings leave a line unnamed
    #[serde(default)]
    pub names: Vec<String>,

    /// Whether accesses may sleep (I2C/SPI expanders)
    #[serde(default)]
    pub may_block: bool,

    /// Offsets whose polarity is inverted
    #[serde(default)]
    pub active_low: Vec<u32>,

    /// First interrupt number; line `n` maps to `irq_base + n`
    #[serde(default)]
    pub irq_base: Option<u32>,

    /// Bus latency added to every read and write, in microseconds
    #[serde(default)]
    pub latency_us: u64,
}

impl MockChipConfig {
    /// Non-blocking chip with `lines` unnamed lines.
    pub fn new(label: impl Into<String>, lines: u32) -> Self {
        Self {
            label: label.into(),
            lines,
            names: Vec::new(),
            may_block: false,
            active_low: Vec::new(),
            irq_base: None,
            latency_us: 0,
        }
    }

    /// Name lines from offset 0 upward.
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Mark accesses as sleeping.
    pub fn may_block(mut self, may_block: bool) -> Self {
        self.may_block = may_block;
        self
    }

    /// Invert polarity of `offsets`.
    pub fn with_active_low(mut self, offsets: impl IntoIterator<Item = u32>) -> Self {
        self.active_low = offsets.into_iter().collect();
        self
    }

    /// Map line `n` to interrupt `base + n`.
    pub fn with_irq_base(mut self, base: u32) -> Self {
        self.irq_base = Some(base);
        self
    }

    /// Sleep `us` microseconds inside every read and write. Only meaningful
    /// for chips that may block.
    pub fn with_latency_us(mut self, us: u64) -> Self {
        self.latency_us = us;
        self
    }
}

/// State of one simulated line.
#[derive(Debug)]
pub struct MockLine {
    offset: u32,
    name: Option<String>,
    active_low: bool,
    level: AtomicBool,
    output: AtomicBool,
    write_edges: AtomicU64,
    config: Mutex<Option<LineConfig>>,
    pub(crate) owner: Mutex<Option<String>>,
}

impl MockLine {
    /// Offset on the chip.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Line name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether polarity is inverted.
    pub fn active_low(&self) -> bool {
        self.active_low
    }

    /// Physical level on the pin.
    pub fn level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Current direction.
    pub fn direction(&self) -> Direction {
        if self.output.load(Ordering::SeqCst) {
            Direction::Output
        } else {
            Direction::Input
        }
    }

    /// Level changes caused by `write`. Direction changes are not counted.
    pub fn write_edges(&self) -> u64 {
        self.write_edges.load(Ordering::SeqCst)
    }

    /// Last configuration pushed through `set_config`.
    pub fn config(&self) -> Option<LineConfig> {
        *self.config.lock()
    }

    /// Consumer currently holding the line.
    pub fn owner(&self) -> Option<String> {
        self.owner.lock().clone()
    }
}

/// A simulated line controller.
#[derive(Debug)]
pub struct MockChip {
    label: String,
    may_block: bool,
    irq_base: Option<u32>,
    latency: Duration,
    lines: Vec<Arc<MockLine>>,
    faults: FaultConfig,
}

impl MockChip {
    /// Chip without fault injection.
    pub fn new(config: MockChipConfig) -> Self {
        Self::with_faults(config, FaultConfig::none())
    }

    /// Chip whose every operation passes through `faults` first.
    pub fn with_faults(config: MockChipConfig, faults: FaultConfig) -> Self {
        let lines = (0..config.lines)
            .map(|offset| {
                let name = config
                    .names
                    .get(offset as usize)
                    .filter(|n| !n.is_empty())
                    .cloned();
                Arc::new(MockLine {
                    offset,
                    name,
                    active_low: config.active_low.contains(&offset),
                    level: AtomicBool::new(false),
                    output: AtomicBool::new(false),
                    write_edges: AtomicU64::new(0),
                    config: Mutex::new(None),
                    owner: Mutex::new(None),
                })
            })
            .collect();

        Self {
            label: config.label,
            may_block: config.may_block,
            irq_base: config.irq_base,
            latency: Duration::from_micros(config.latency_us),
            lines,
            faults,
        }
    }

    /// Controller label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether accesses may sleep.
    pub fn may_block(&self) -> bool {
        self.may_block
    }

    /// Number of lines.
    pub fn n_lines(&self) -> u32 {
        self.lines.len() as u32
    }

    /// Line at `offset`.
    pub fn line(&self, offset: u32) -> Option<&Arc<MockLine>> {
        self.lines.get(offset as usize)
    }

    /// Find a line by name.
    pub fn find(&self, name: &str) -> Option<&Arc<MockLine>> {
        self.lines.iter().find(|l| l.name() == Some(name))
    }

    /// Faults injected into this chip.
    pub fn faults(&self) -> &FaultConfig {
        &self.faults
    }

    /// Physical level of `offset`, as seen on the wire.
    pub fn level(&self, offset: u32) -> Option<bool> {
        self.line(offset).map(|l| l.level())
    }

    /// Drive the physical level of `offset` from outside (test stimulus).
    pub fn set_level(&self, offset: u32, level: bool) -> DioResult<()> {
        let line = self.line(offset).ok_or(DioError::InvalidPosition {
            position: offset,
            line_count: self.n_lines(),
        })?;
        line.level.store(level, Ordering::SeqCst);
        Ok(())
    }
}

/// Handle to one line of a [`MockChip`].
#[derive(Debug)]
pub struct MockLineHandle {
    chip: Arc<MockChip>,
    line: Arc<MockLine>,
    display: String,
}

impl MockLineHandle {
    pub(crate) fn new(chip: Arc<MockChip>, line: Arc<MockLine>) -> Self {
        let display = match line.name() {
            Some(name) => name.to_string(),
            None => format!("{}-{}", chip.label(), line.offset()),
        };
        Self {
            chip,
            line,
            display,
        }
    }

    fn check(&self, op: LineOp) -> DioResult<()> {
        self.chip.faults.check(&self.display, op)
    }

    fn bus_delay(&self) {
        if !self.chip.latency.is_zero() {
            thread::sleep(self.chip.latency);
        }
    }
}

impl LineHandle for MockLineHandle {
    fn name(&self) -> &str {
        &self.display
    }

    fn may_block(&self) -> bool {
        self.chip.may_block
    }

    fn active_low(&self) -> bool {
        self.line.active_low
    }

    fn direction(&self) -> DioResult<Direction> {
        self.check(LineOp::Direction)?;
        Ok(self.line.direction())
    }

    fn set_direction_input(&self) -> DioResult<()> {
        self.check(LineOp::Direction)?;
        self.line.output.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_direction_output(&self, value: bool) -> DioResult<()> {
        self.check(LineOp::Direction)?;
        self.line
            .level
            .store(value ^ self.line.active_low, Ordering::SeqCst);
        self.line.output.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self) -> DioResult<bool> {
        self.check(LineOp::Read)?;
        self.bus_delay();
        Ok(self.line.level() ^ self.line.active_low)
    }

    fn write(&self, value: bool) -> DioResult<()> {
        self.check(LineOp::Write)?;
        self.bus_delay();
        let level = value ^ self.line.active_low;
        if self.line.level.swap(level, Ordering::SeqCst) != level {
            self.line.write_edges.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn to_irq(&self) -> DioResult<u32> {
        let base = self.chip.irq_base.ok_or_else(|| DioError::NotSupported {
            message: format!("{} has no interrupt mapping", self.display),
        })?;
        Ok(base + self.line.offset)
    }

    fn set_config(&self, config: LineConfig) -> DioResult<()> {
        self.check(LineOp::Config)?;
        *self.line.config.lock() = Some(config);
        Ok(())
    }
}
