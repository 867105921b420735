//! Test utilities for loco development.
//!
//! Provides a [`ManualClock`] that tests move by hand, a
//! [`RecordingSink`] that keeps every hardware command, and the museum
//! layout fixtures in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, NaiveTime};
use loco_core::{SegmentId, SwitchId, SwitchPosition};
use loco_engine::{Clock, SignalCommand, SignalSink};

/// Time of day shared between a test and the engine it drives.
///
/// Clones share the same time, so a test keeps one handle and boxes the
/// other into the engine.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveTime>>,
}

impl ManualClock {
    pub fn at(hour: u32, min: u32) -> Self {
        Self {
            now: Arc::new(Mutex::new(hm(hour, min))),
        }
    }

    pub fn set(&self, hour: u32, min: u32) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = hm(hour, min);
    }

    /// Move the clock forward, wrapping at midnight.
    pub fn advance_min(&self, minutes: i64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.overflowing_add_signed(Duration::minutes(minutes)).0;
    }
}

impl Clock for ManualClock {
    fn time_of_day(&self) -> NaiveTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shorthand for a whole-minute time of day.
pub fn hm(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).unwrap_or(NaiveTime::MIN)
}

/// Keeps every command handed to it.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<SignalCommand>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn commands(&self) -> Vec<SignalCommand> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of commands recorded so far.
    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Power commands that energise a segment, with their speed code.
    pub fn powered(&self) -> Vec<(SegmentId, u8)> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                SignalCommand::Power {
                    segment,
                    level: Some(code),
                } => Some((segment, code)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SignalSink for RecordingSink {
    fn power(&mut self, segment: SegmentId, level: Option<u8>) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SignalCommand::Power { segment, level });
    }

    fn route(&mut self, switch: SwitchId, position: SwitchPosition) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SignalCommand::Route { switch, position });
    }
}
