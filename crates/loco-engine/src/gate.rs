//! Operator confirmation that ends the opening ceremony.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Shared one-shot latch. Cloning yields another handle to the same gate.
///
/// The scheduler polls [`is_confirmed`](Self::is_confirmed) once per tick;
/// other threads may block in [`wait`](Self::wait).
#[derive(Clone, Debug, Default)]
pub struct OpeningGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl OpeningGate {
    /// A closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate and wake all waiters.
    pub fn confirm(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// Whether the gate has been opened.
    pub fn is_confirmed(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the gate again for the next ceremony.
    pub fn reset(&self) {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Block until the gate is open or `timeout` elapses. `None` waits
    /// forever. Returns whether the gate is open.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut open = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = timeout.map(|t| Instant::now() + t);
        while !*open {
            match deadline {
                None => {
                    open = cvar.wait(open).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    open = cvar
                        .wait_timeout(open, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        *open
    }
}
