//! Fault injection for mock chips.
//!
//! A [`FaultConfig`] is attached to a chip at construction and consulted
//! before every line operation. Failures come back as the same
//! [`DioError`]s a real controller would report, so callers can exercise
//! their unwind and propagation paths.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dio_core::{DioError, DioResult};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Line operation classes a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineOp {
    /// Claiming the line
    Acquire,
    /// Reading or changing direction
    Direction,
    /// Reading the value
    Read,
    /// Driving the value
    Write,
    /// Bias or drive configuration
    Config,
}

impl fmt::Display for LineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineOp::Acquire => "acquire",
            LineOp::Direction => "direction",
            LineOp::Read => "read",
            LineOp::Write => "write",
            LineOp::Config => "config",
        };
        f.write_str(name)
    }
}

/// One injected failure rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// `op` succeeds `after` times, then keeps failing
    FailAfter { op: LineOp, after: u32 },
    /// Acquisition is refused with a permission error
    DenyAcquire,
    /// The first access after acquisition latches a hardware fault code;
    /// every later access fails with it until [`FaultConfig::reset`]
    Latch { code: u32 },
    /// `op` (or any operation, if `None`) fails with probability `rate`
    Random { op: Option<LineOp>, rate: f64 },
}

#[derive(Default)]
struct FaultState {
    counts: HashMap<LineOp, u32>,
    latched: Option<u32>,
}

struct Injector {
    faults: Vec<Fault>,
    rng: Mutex<ChaCha8Rng>,
    state: Mutex<FaultState>,
}

impl Injector {
    fn roll(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        rate >= 1.0 || self.rng.lock().gen::<f64>() < rate
    }
}

/// Faults attached to one chip. Cloning shares counters and latched state.
#[derive(Clone, Default)]
pub struct FaultConfig {
    injector: Option<Arc<Injector>>,
}

impl FaultConfig {
    /// No faults.
    pub fn none() -> Self {
        Self::default()
    }

    /// Inject `faults`, with random faults drawn from OS entropy.
    pub fn new(faults: impl IntoIterator<Item = Fault>) -> Self {
        Self::build(faults.into_iter().collect(), ChaCha8Rng::from_entropy())
    }

    /// Inject `faults` with a fixed seed, for reproducible random faults.
    pub fn seeded(faults: impl IntoIterator<Item = Fault>, seed: u64) -> Self {
        Self::build(faults.into_iter().collect(), ChaCha8Rng::seed_from_u64(seed))
    }

    fn build(faults: Vec<Fault>, rng: ChaCha8Rng) -> Self {
        Self {
            injector: Some(Arc::new(Injector {
                faults,
                rng: Mutex::new(rng),
                state: Mutex::new(FaultState::default()),
            })),
        }
    }

    /// Decide whether `op` on `line` fails, and with which error.
    pub fn check(&self, line: &str, op: LineOp) -> DioResult<()> {
        let Some(injector) = &self.injector else {
            return Ok(());
        };
        let mut state = injector.state.lock();

        if let Some(code) = state.latched {
            return Err(DioError::Hardware {
                message: format!("{}: fault {:#x}", line, code),
            });
        }

        for fault in &injector.faults {
            match *fault {
                Fault::FailAfter { op: target, after } if target == op => {
                    let count = state.counts.entry(op).or_insert(0);
                    *count += 1;
                    if *count > after {
                        return Err(DioError::Hardware {
                            message: format!("{}: injected {} failure after {}", line, op, after),
                        });
                    }
                }
                Fault::DenyAcquire if op == LineOp::Acquire => {
                    return Err(DioError::PermissionDenied {
                        selector: line.to_string(),
                    });
                }
                Fault::Latch { code } if op != LineOp::Acquire => {
                    state.latched = Some(code);
                    return Err(DioError::Hardware {
                        message: format!("{}: fault {:#x}", line, code),
                    });
                }
                Fault::Random { op: target, rate }
                    if target.map_or(true, |t| t == op) && injector.roll(rate) =>
                {
                    return Err(DioError::Hardware {
                        message: format!("{}: random {} failure", line, op),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Clear counters and any latched fault.
    pub fn reset(&self) {
        if let Some(injector) = &self.injector {
            *injector.state.lock() = FaultState::default();
        }
    }
}

impl fmt::Debug for FaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.injector {
            None => f.write_str("FaultConfig(none)"),
            Some(injector) => f
                .debug_struct("FaultConfig")
                .field("faults", &injector.faults)
                .field("latched", &injector.state.lock().latched)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_fails() {
        let faults = FaultConfig::none();
        for op in [LineOp::Acquire, LineOp::Read, LineOp::Write] {
            assert!(faults.check("gpio0 1", op).is_ok());
        }
    }

    #[test]
    fn test_fail_after() {
        let faults = FaultConfig::new([Fault::FailAfter {
            op: LineOp::Read,
            after: 3,
        }]);
        for _ in 0..3 {
            assert!(faults.check("l", LineOp::Read).is_ok());
        }
        assert!(faults.check("l", LineOp::Read).is_err());
        assert!(faults.check("l", LineOp::Read).is_err());
        // Other operations are unaffected
        assert!(faults.check("l", LineOp::Write).is_ok());

        faults.reset();
        assert!(faults.check("l", LineOp::Read).is_ok());
    }

    #[test]
    fn test_deny_acquire() {
        let faults = FaultConfig::new([Fault::DenyAcquire]);
        assert_eq!(
            faults.check("gpio0 4", LineOp::Acquire),
            Err(DioError::PermissionDenied {
                selector: "gpio0 4".into()
            })
        );
        assert!(faults.check("gpio0 4", LineOp::Read).is_ok());
    }

    #[test]
    fn test_latch_is_sticky() {
        let faults = FaultConfig::new([Fault::Latch { code: 0x42 }]);
        assert!(faults.check("l", LineOp::Acquire).is_ok());

        let err = faults.check("l", LineOp::Read).unwrap_err();
        assert!(err.to_string().contains("0x42"));
        assert!(faults.check("l", LineOp::Acquire).is_err());

        faults.reset();
        assert!(faults.check("l", LineOp::Acquire).is_ok());
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let run = || {
            let faults = FaultConfig::seeded([Fault::Random { op: None, rate: 0.5 }], 7);
            (0..200)
                .map(|_| faults.check("l", LineOp::Write).is_err())
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, run());
        let failures = first.iter().filter(|f| **f).count();
        assert!(failures > 60 && failures < 140, "got {} failures", failures);
    }

    #[test]
    fn test_random_targets_one_op() {
        let faults = FaultConfig::seeded(
            [Fault::Random {
                op: Some(LineOp::Config),
                rate: 1.0,
            }],
            1,
        );
        assert!(faults.check("l", LineOp::Config).is_err());
        assert!(faults.check("l", LineOp::Read).is_ok());
    }
}
