//! Cooperative cancellation shared by every chain in a run.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A one-way stop flag.
///
/// Cloning shares the flag. Once raised it stays raised; a new run gets a
/// new signal. Hot loops poll [`StopSignal::is_raised`], timed waits use
/// [`StopSignal::wait_timeout`] so a raise interrupts them immediately.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    flag: AtomicBool,
    raised: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter.
    pub fn raise(&self) {
        self.inner.flag.store(true, Ordering::Release);
        let mut raised = self.inner.raised.lock();
        *raised = true;
        self.inner.cvar.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Block for up to `timeout`, returning early if the flag is raised.
    ///
    /// Returns `true` if the flag is raised when the wait ends.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return self.is_raised();
        }

        let mut raised = self.inner.raised.lock();
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                while !*raised {
                    if self.inner.cvar.wait_until(&mut raised, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while !*raised {
                    self.inner.cvar.wait(&mut raised);
                }
            }
        }
        *raised
    }
}
