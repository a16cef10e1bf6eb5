//! Per-line ramp delays.
//!
//! An output driven through a slow external stage (an opto-coupler, an RC
//! filter) needs time to settle after a change. Each line keeps a rising and a
//! falling delay in microseconds; a single-line `set` waits for the one that
//! matches the physical edge it produced.

use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Number of cells in a delay specifier: line, rising, falling.
pub const DELAY_CELLS: usize = 3;

/// Settle times for one line, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampTiming {
    /// Wait after driving the line physically high.
    pub rising_delay_us: u32,
    /// Wait after driving the line physically low.
    pub falling_delay_us: u32,
}

impl RampTiming {
    /// Timing with the given delays in microseconds.
    pub fn new(rising_delay_us: u32, falling_delay_us: u32) -> Self {
        Self {
            rising_delay_us,
            falling_delay_us,
        }
    }
}

/// Storage for one line's timing. Each field is written and read on its own;
/// a reader may see a half-updated pair while a writer is storing both.
#[derive(Debug, Default)]
pub(crate) struct DelayCell {
    rising: AtomicU32,
    falling: AtomicU32,
}

impl DelayCell {
    pub(crate) fn load(&self) -> RampTiming {
        RampTiming {
            rising_delay_us: self.rising.load(Ordering::Relaxed),
            falling_delay_us: self.falling.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn store(&self, timing: RampTiming) {
        self.rising.store(timing.rising_delay_us, Ordering::Relaxed);
        self.falling.store(timing.falling_delay_us, Ordering::Relaxed);
    }

    /// Delay for the edge just produced. `rising` is the physical direction.
    pub(crate) fn delay_for(&self, rising: bool) -> u32 {
        if rising {
            self.rising.load(Ordering::Relaxed)
        } else {
            self.falling.load(Ordering::Relaxed)
        }
    }
}

/// Wait `us` microseconds. Sleeps when the caller may block, spins otherwise.
pub(crate) fn settle(us: u32, can_block: bool) {
    if us == 0 {
        return;
    }
    let wait = Duration::from_micros(u64::from(us));
    if can_block {
        thread::sleep(wait);
    } else {
        let start = Instant::now();
        while start.elapsed() < wait {
            hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_store_and_select() {
        let cell = DelayCell::default();
        assert_eq!(cell.load(), RampTiming::default());

        cell.store(RampTiming::new(10, 200));
        assert_eq!(cell.delay_for(true), 10);
        assert_eq!(cell.delay_for(false), 200);
        assert_eq!(cell.load(), RampTiming::new(10, 200));
    }

    #[test]
    fn test_zero_delay_returns_immediately() {
        let start = Instant::now();
        settle(0, true);
        settle(0, false);
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_settle_waits_at_least_requested() {
        for can_block in [false, true] {
            let start = Instant::now();
            settle(300, can_block);
            assert!(start.elapsed() >= Duration::from_micros(300));
        }
    }
}
