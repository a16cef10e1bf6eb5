//! Composite line device forwarding to acquired line handles.
//!
//! A [`Forwarder`] owns one handle per position and relays every line
//! operation to it. Batched reads and writes compact the selected handles
//! and values into a scratch area sized at construction, issue one
//! provider-level array call, and expand the result back to caller positions.
//!
//! # Locking
//!
//! The scratch area is guarded by a lock picked once in [`Forwarder::build`]:
//! a spin lock when every bound line is non-sleeping, a blocking mutex when
//! any line may sleep or a position is still unbound. Single-line operations
//! do not take the lock; they run under a shared gate that
//! [`Forwarder::detach`] drains, so no line operation outlives a detach.
//!
//! # Ramp delay
//!
//! With [`ForwarderFeatures::DELAY`], each position carries a
//! [`RampTiming`]. A single-line `set` waits for the rising or falling delay
//! matching the physical edge it produced. Batched writes never wait.

pub mod delay;
pub mod lock;
pub(crate) mod scratch;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bitflags::bitflags;
use dio_core::{
    read_array, write_array, DioError, DioResult, Direction, LineConfig, LineDevice, LineHandle,
    LineMask,
};
use tracing::{debug, info, trace};

pub use delay::{RampTiming, DELAY_CELLS};
pub use lock::LockKind;

use delay::{settle, DelayCell};
use lock::{FwdGate, FwdLock};
use scratch::Scratch;

bitflags! {
    /// Optional forwarder capabilities, selected at construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ForwarderFeatures: u32 {
        /// Per-position ramp delay table.
        const DELAY = 1 << 0;
    }
}

/// Virtual multi-line device over a fixed set of positions.
pub struct Forwarder {
    label: String,
    lines: Box<[OnceLock<Arc<dyn LineHandle>>]>,
    can_block: bool,
    lock: FwdLock<Scratch>,
    gate: FwdGate,
    delay_timings: Option<Box<[DelayCell]>>,
    detached: AtomicBool,
}

impl Forwarder {
    /// Build a forwarder with `line_count` positions.
    ///
    /// `handles[i]` is bound to position `i`; positions past `handles.len()`
    /// stay unbound until [`Forwarder::bind`] and make the forwarder blocking.
    pub fn build(
        label: impl Into<String>,
        line_count: u32,
        handles: Vec<Arc<dyn LineHandle>>,
        features: ForwarderFeatures,
    ) -> DioResult<Self> {
        let label = label.into();
        if line_count == 0 {
            return Err(DioError::InvalidArgument {
                message: format!("{}: forwarder needs at least one line", label),
            });
        }
        if handles.len() > line_count as usize {
            return Err(DioError::InvalidArgument {
                message: format!(
                    "{}: {} handles given for {} lines",
                    label,
                    handles.len(),
                    line_count
                ),
            });
        }

        let deferred = handles.len() < line_count as usize;
        let can_block = deferred || handles.iter().any(|h| h.may_block());

        let lines: Box<[OnceLock<Arc<dyn LineHandle>>]> =
            (0..line_count).map(|_| OnceLock::new()).collect();
        let delay_timings = features
            .contains(ForwarderFeatures::DELAY)
            .then(|| (0..line_count).map(|_| DelayCell::default()).collect());

        let forwarder = Self {
            label,
            lines,
            can_block,
            lock: FwdLock::new(can_block, Scratch::new(line_count as usize)),
            gate: FwdGate::new(can_block),
            delay_timings,
            detached: AtomicBool::new(false),
        };

        for (position, handle) in handles.into_iter().enumerate() {
            forwarder.bind(position as u32, handle)?;
        }

        info!(
            device = %forwarder.label,
            lines = line_count,
            can_block,
            lock = %forwarder.lock.kind(),
            delay = forwarder.has_delay(),
            "Built forwarder"
        );
        Ok(forwarder)
    }

    /// Bind `handle` to a position left unbound at construction.
    pub fn bind(&self, position: u32, handle: Arc<dyn LineHandle>) -> DioResult<()> {
        let slot = self.slot(position)?;
        let irq = handle.to_irq().ok();
        let name = handle.name().to_string();
        slot.set(handle)
            .map_err(|_| DioError::AlreadyBound { position })?;
        debug!(device = %self.label, position, line = %name, irq = ?irq, "Bound line");
        Ok(())
    }

    /// Device name, `<prefix>.<id>` for registry-built forwarders.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of positions.
    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    /// Fixed at construction: any line may sleep or was unbound.
    pub fn can_block(&self) -> bool {
        self.can_block
    }

    /// Lock guarding batched access.
    pub fn lock_kind(&self) -> LockKind {
        self.lock.kind()
    }

    /// Whether the ramp delay table exists.
    pub fn has_delay(&self) -> bool {
        self.delay_timings.is_some()
    }

    /// Whether `position` has a handle.
    pub fn is_bound(&self, position: u32) -> bool {
        self.lines
            .get(position as usize)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Ramp timing of `position`, if the delay feature is enabled.
    pub fn ramp_timing(&self, position: u32) -> Option<RampTiming> {
        self.delay_timings
            .as_ref()?
            .get(position as usize)
            .map(DelayCell::load)
    }

    /// Update the ramp timing of `position`. Safe while the device is in use.
    pub fn configure_ramp(&self, position: u32, timing: RampTiming) -> DioResult<()> {
        let timings = self
            .delay_timings
            .as_ref()
            .ok_or_else(|| DioError::NotSupported {
                message: format!("{}: ramp delay not enabled", self.label),
            })?;
        let cell = timings
            .get(position as usize)
            .ok_or(DioError::InvalidPosition {
                position,
                line_count: self.line_count(),
            })?;
        cell.store(timing);
        debug!(
            device = %self.label,
            position,
            rising_us = timing.rising_delay_us,
            falling_us = timing.falling_delay_us,
            "Configured ramp"
        );
        Ok(())
    }

    /// Apply a `[line, rising_us, falling_us]` delay specifier and return the line.
    pub fn xlate_delay(&self, cells: &[u32]) -> DioResult<u32> {
        let &[line, rising, falling] = cells else {
            return Err(DioError::InvalidArgument {
                message: format!(
                    "delay specifier needs {} cells, got {}",
                    DELAY_CELLS,
                    cells.len()
                ),
            });
        };
        if line >= self.line_count() {
            return Err(DioError::InvalidArgument {
                message: format!(
                    "delay specifier line {} out of range for {} lines",
                    line,
                    self.line_count()
                ),
            });
        }
        self.configure_ramp(line, RampTiming::new(rising, falling))?;
        Ok(line)
    }

    /// Stop forwarding.
    ///
    /// Returns once every single-line and batched operation already in
    /// flight has finished; later calls fail with [`DioError::Detached`].
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        self.gate.drain();
        self.lock.with(Scratch::release);
        debug!(device = %self.label, "Detached forwarder");
    }

    /// Whether [`Forwarder::detach`] has run.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn slot(&self, position: u32) -> DioResult<&OnceLock<Arc<dyn LineHandle>>> {
        self.lines
            .get(position as usize)
            .ok_or(DioError::InvalidPosition {
                position,
                line_count: self.line_count(),
            })
    }

    fn handle(&self, position: u32) -> DioResult<&Arc<dyn LineHandle>> {
        if self.is_detached() {
            return Err(DioError::Detached {
                label: self.label.clone(),
            });
        }
        self.slot(position)?
            .get()
            .ok_or(DioError::NotReady { position })
    }

    /// Run `f` on the line at `position` under the shared gate.
    fn with_line<R>(
        &self,
        position: u32,
        f: impl FnOnce(&dyn LineHandle) -> DioResult<R>,
    ) -> DioResult<R> {
        self.gate.shared(|| f(self.handle(position)?.as_ref()))
    }

    fn check_mask(&self, mask: &LineMask, bits_len: usize) -> DioResult<()> {
        if let Some(last) = mask.last_one() {
            if last >= self.lines.len() {
                return Err(DioError::InvalidPosition {
                    position: last as u32,
                    line_count: self.line_count(),
                });
            }
            if last >= bits_len {
                return Err(DioError::InvalidArgument {
                    message: format!(
                        "value bitmap holds {} bits, position {} selected",
                        bits_len, last
                    ),
                });
            }
        }
        Ok(())
    }

    /// Read the positions selected by `mask` into `bits` in one batch.
    ///
    /// Unselected bits of `bits` are left untouched. On error nothing is
    /// written to `bits`.
    pub fn get_multiple_locked(&self, mask: &LineMask, bits: &mut LineMask) -> DioResult<()> {
        self.check_mask(mask, bits.len())?;
        self.lock.with(|scratch| {
            scratch.values.clear();
            let result = scratch
                .fill(mask, |position| self.handle(position))
                .and_then(|()| read_array(&scratch.lines, &mut scratch.values));
            scratch.release();
            result?;
            scratch.expand_values(mask, bits);
            Ok(())
        })
    }

    /// Drive the positions selected by `mask` from `bits` in one batch.
    ///
    /// Ramp delays are not applied here.
    pub fn set_multiple_locked(&self, mask: &LineMask, bits: &LineMask) -> DioResult<()> {
        self.check_mask(mask, bits.len())?;
        self.lock.with(|scratch| {
            let result = scratch
                .fill(mask, |position| self.handle(position))
                .and_then(|()| {
                    scratch.compact_values(mask, bits);
                    write_array(&scratch.lines, &scratch.values)
                });
            scratch.release();
            result
        })
    }

    fn ramp_delay(&self, position: u32, rising: bool) {
        let Some(cell) = self
            .delay_timings
            .as_ref()
            .and_then(|timings| timings.get(position as usize))
        else {
            return;
        };
        let us = cell.delay_for(rising);
        if us > 0 {
            trace!(device = %self.label, position, rising, us, "Ramp delay");
        }
        settle(us, self.can_block);
    }
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("label", &self.label)
            .field("line_count", &self.lines.len())
            .field("can_block", &self.can_block)
            .field("lock", &self.lock.kind())
            .field("delay", &self.has_delay())
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl LineDevice for Forwarder {
    fn label(&self) -> &str {
        &self.label
    }

    fn line_count(&self) -> u32 {
        Forwarder::line_count(self)
    }

    fn can_block(&self) -> bool {
        self.can_block
    }

    fn request(&self, position: u32) -> DioResult<()> {
        self.with_line(position, |_| Ok(()))
    }

    fn get_direction(&self, position: u32) -> DioResult<Direction> {
        self.with_line(position, |line| line.direction())
    }

    fn set_direction_input(&self, position: u32) -> DioResult<()> {
        self.with_line(position, |line| line.set_direction_input())
    }

    fn set_direction_output(&self, position: u32, value: bool) -> DioResult<()> {
        self.with_line(position, |line| line.set_direction_output(value))
    }

    fn get(&self, position: u32) -> DioResult<bool> {
        self.with_line(position, |line| line.read())
    }

    fn get_multiple(&self, mask: &LineMask, bits: &mut LineMask) -> DioResult<()> {
        self.get_multiple_locked(mask, bits)
    }

    fn set(&self, position: u32, value: bool) -> DioResult<()> {
        // The ramp wait happens outside the gate so detach is not held up by it.
        let rising = self.with_line(position, |line| {
            line.write(value)?;
            Ok(value ^ line.active_low())
        })?;
        self.ramp_delay(position, rising);
        Ok(())
    }

    fn set_multiple(&self, mask: &LineMask, bits: &LineMask) -> DioResult<()> {
        self.set_multiple_locked(mask, bits)
    }

    fn to_irq(&self, position: u32) -> DioResult<u32> {
        self.with_line(position, |line| line.to_irq())
    }

    fn set_config(&self, position: u32, config: LineConfig) -> DioResult<()> {
        self.with_line(position, |line| line.set_config(config))
    }
}
