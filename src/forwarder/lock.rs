//! Forwarder lock, chosen once at construction.
//!
//! A forwarder whose lines never sleep serializes batched access with a spin
//! lock so it stays usable from contexts that must not block. If any line may
//! sleep, a blocking mutex is used instead.

/// Which lock a forwarder was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Busy-waiting lock; never sleeps.
    Spin,
    /// Sleeping mutex, for forwarders with lines that may block.
    Blocking,
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKind::Spin => write!(f, "spin"),
            LockKind::Blocking => write!(f, "blocking"),
        }
    }
}

pub(crate) enum FwdLock<T> {
    Spin(spin::Mutex<T>),
    Blocking(parking_lot::Mutex<T>),
}

impl<T> FwdLock<T> {
    pub(crate) fn new(can_block: bool, value: T) -> Self {
        if can_block {
            FwdLock::Blocking(parking_lot::Mutex::new(value))
        } else {
            FwdLock::Spin(spin::Mutex::new(value))
        }
    }

    pub(crate) fn kind(&self) -> LockKind {
        match self {
            FwdLock::Spin(_) => LockKind::Spin,
            FwdLock::Blocking(_) => LockKind::Blocking,
        }
    }

    /// Run `f` with the protected value locked.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        match self {
            FwdLock::Spin(lock) => f(&mut lock.lock()),
            FwdLock::Blocking(lock) => f(&mut lock.lock()),
        }
    }
}

/// Shared/exclusive gate over single-line operations.
///
/// Line operations run under the shared side; detaching takes the exclusive
/// side once, which returns only after every operation already in flight has
/// finished. Same spin/blocking choice as [`FwdLock`].
pub(crate) enum FwdGate {
    Spin(spin::RwLock<()>),
    Blocking(parking_lot::RwLock<()>),
}

impl FwdGate {
    pub(crate) fn new(can_block: bool) -> Self {
        if can_block {
            FwdGate::Blocking(parking_lot::RwLock::new(()))
        } else {
            FwdGate::Spin(spin::RwLock::new(()))
        }
    }

    pub(crate) fn shared<R>(&self, f: impl FnOnce() -> R) -> R {
        match self {
            FwdGate::Spin(gate) => {
                let _guard = gate.read();
                f()
            }
            FwdGate::Blocking(gate) => {
                let _guard = gate.read();
                f()
            }
        }
    }

    /// Wait until no shared holder is left.
    pub(crate) fn drain(&self) {
        match self {
            FwdGate::Spin(gate) => drop(gate.write()),
            FwdGate::Blocking(gate) => drop(gate.write()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_kind_follows_can_block() {
        assert_eq!(FwdLock::new(false, ()).kind(), LockKind::Spin);
        assert_eq!(FwdLock::new(true, ()).kind(), LockKind::Blocking);
    }

    #[test]
    fn test_mutual_exclusion() {
        for can_block in [false, true] {
            let lock = Arc::new(FwdLock::new(can_block, 0u64));
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let lock = lock.clone();
                    thread::spawn(move || {
                        for _ in 0..1000 {
                            lock.with(|n| *n += 1);
                        }
                    })
                })
                .collect();
            for w in workers {
                w.join().unwrap();
            }
            assert_eq!(lock.with(|n| *n), 4000);
        }
    }

    #[test]
    fn test_gate_drain_waits_for_shared_holders() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        for can_block in [false, true] {
            let gate = Arc::new(FwdGate::new(can_block));
            let done = Arc::new(AtomicBool::new(false));
            let (tx, rx) = std::sync::mpsc::channel();

            let holder = {
                let gate = gate.clone();
                let done = done.clone();
                thread::spawn(move || {
                    gate.shared(|| {
                        tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(50));
                        done.store(true, Ordering::SeqCst);
                    })
                })
            };
            rx.recv().unwrap();
            gate.drain();
            assert!(done.load(Ordering::SeqCst));
            holder.join().unwrap();

            // Shared access works again once drained.
            assert_eq!(gate.shared(|| 7), 7);
        }
    }
}
