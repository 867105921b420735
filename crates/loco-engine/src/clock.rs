//! Wall-clock source for off-time decisions.
//!
//! The update loop advances its own timers by a fixed `dt` per tick; the
//! clock is consulted only for the local time of day.

use chrono::{Local, NaiveTime};

/// Source of the local time of day.
pub trait Clock: Send + 'static {
    /// Current local time of day.
    fn time_of_day(&self) -> NaiveTime;
}

/// [`Clock`] backed by the system's local time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn time_of_day(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// [`Clock`] stuck at a fixed time of day.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveTime);

impl Clock for FixedClock {
    fn time_of_day(&self) -> NaiveTime {
        self.0
    }
}
