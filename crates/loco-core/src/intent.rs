//! Control intents, intent payloads, receipts, and the small enums they carry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Rejection;
use crate::id::{SegmentList, SwitchId, TickId, TrainId};

/// Priority class for emergency stops. Drained before everything else.
pub const PRIORITY_EMERGENCY: u8 = 0;
/// Priority class for operator and admin intents.
pub const PRIORITY_ADMIN: u8 = 1;
/// Priority class for intents generated by a scheduling program.
pub const PRIORITY_SCHEDULED: u8 = 2;

/// Operating round of the museum layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundKind {
    /// The standard two-train alternating service.
    Regular,
    /// Express running on the outer ring.
    Fast,
    /// Both trains sharing the outer ring.
    Outside,
    /// One-shot ceremony run before the first regular round.
    Opening,
}

impl RoundKind {
    /// Lower-case name as used in configuration files and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Fast => "fast",
            Self::Outside => "outside",
            Self::Opening => "opening",
        }
    }
}

impl fmt::Display for RoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Self::Regular),
            "fast" => Ok(Self::Fast),
            "outside" => Ok(Self::Outside),
            "opening" => Ok(Self::Opening),
            other => Err(format!("unknown round '{other}'")),
        }
    }
}

/// Throw position of a switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchPosition {
    /// Trunk connects to the straight branch.
    #[default]
    Straight,
    /// Trunk connects to the diverging branch.
    Diverging,
}

impl fmt::Display for SwitchPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Straight => f.write_str("straight"),
            Self::Diverging => f.write_str("diverging"),
        }
    }
}

/// Lifecycle phase of a train.
///
/// ```text
/// PoweredOff → ChecklistPending → Ready → PoweredOn → (Stopping) → PoweredOff
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TrainPhase {
    /// No track power, not armed for the current round.
    #[default]
    PoweredOff,
    /// Armed; waiting for the admin checklist to be completed.
    ChecklistPending,
    /// Checklist complete; may be powered on.
    Ready,
    /// Track power on; commanded speed may change.
    PoweredOn,
    /// Ramping down to zero before the power cut.
    Stopping,
}

impl TrainPhase {
    /// Whether a train in this phase holds its occupied segments as a claim.
    pub fn holds_claim(self) -> bool {
        matches!(self, Self::PoweredOn | Self::Stopping)
    }
}

impl fmt::Display for TrainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PoweredOff => "powered off",
            Self::ChecklistPending => "checklist pending",
            Self::Ready => "ready",
            Self::PoweredOn => "powered on",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// A request submitted to the controller via the ingress queue.
///
/// Intents are ordered by `priority_class` (lower = higher priority),
/// then by `source_id`, then by `source_seq`, then by `arrival_seq` as a
/// final tiebreaker. Emergency stops always carry
/// [`PRIORITY_EMERGENCY`] and are therefore applied before any other
/// intent drained in the same tick.
///
/// # Examples
///
/// ```
/// use loco_core::{Intent, IntentPayload, TrainId, PRIORITY_ADMIN, PRIORITY_EMERGENCY};
///
/// let on = Intent::power_on(TrainId(0));
/// assert_eq!(on.priority_class, PRIORITY_ADMIN);
///
/// let stop = Intent::emergency_stop();
/// assert_eq!(stop.priority_class, PRIORITY_EMERGENCY);
/// assert!(matches!(stop.payload, IntentPayload::EmergencyStop));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Intent {
    /// The operation to perform.
    pub payload: IntentPayload,
    /// Optional source identifier (client, program) for ordering.
    pub source_id: Option<u64>,
    /// Optional per-source sequence number for ordering.
    pub source_seq: Option<u64>,
    /// Priority class. Lower values = higher priority.
    pub priority_class: u8,
    /// Monotonic arrival sequence number, set by the ingress queue.
    pub arrival_seq: u64,
}

impl Intent {
    /// Wrap a payload with the default priority for its kind.
    pub fn new(payload: IntentPayload) -> Self {
        let priority_class = match payload {
            IntentPayload::EmergencyStop => PRIORITY_EMERGENCY,
            _ => PRIORITY_ADMIN,
        };
        Self {
            payload,
            source_id: None,
            source_seq: None,
            priority_class,
            arrival_seq: 0,
        }
    }

    /// Tag the intent with its source and per-source sequence number.
    pub fn with_source(mut self, source_id: u64, source_seq: u64) -> Self {
        self.source_id = Some(source_id);
        self.source_seq = Some(source_seq);
        self
    }

    /// Override the priority class. Emergency stops keep [`PRIORITY_EMERGENCY`].
    pub fn with_priority(mut self, priority_class: u8) -> Self {
        if !matches!(self.payload, IntentPayload::EmergencyStop) {
            self.priority_class = priority_class;
        }
        self
    }

    /// `power_on(train)`.
    pub fn power_on(train: TrainId) -> Self {
        Self::new(IntentPayload::PowerOn { train })
    }

    /// `power_off(train)` with a speed ramp.
    pub fn power_off(train: TrainId) -> Self {
        Self::new(IntentPayload::PowerOff {
            train,
            emergency: false,
        })
    }

    /// `set_speed(train, value)`.
    pub fn set_speed(train: TrainId, value: f64) -> Self {
        Self::new(IntentPayload::SetSpeed { train, value })
    }

    /// `select_round(round)`.
    pub fn select_round(round: RoundKind) -> Self {
        Self::new(IntentPayload::SelectRound { round })
    }

    /// `update_checklist(train, item, value)`.
    pub fn update_checklist(train: TrainId, item: impl Into<String>, value: bool) -> Self {
        Self::new(IntentPayload::UpdateChecklist {
            train,
            item: item.into(),
            value,
        })
    }

    /// `emergency_stop()`.
    pub fn emergency_stop() -> Self {
        Self::new(IntentPayload::EmergencyStop)
    }

    /// `clear_emergency()`.
    pub fn clear_emergency() -> Self {
        Self::new(IntentPayload::ClearEmergency)
    }

    /// `throw_switch(train, switch, position)`.
    pub fn throw_switch(train: TrainId, switch: SwitchId, position: SwitchPosition) -> Self {
        Self::new(IntentPayload::ThrowSwitch {
            train,
            switch,
            position,
        })
    }
}

/// All intent payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum IntentPayload {
    /// Turn on track power for a train. Only valid from `Ready`.
    PowerOn {
        /// The train to power.
        train: TrainId,
    },
    /// Turn off a train, ramping down unless `emergency` is set.
    PowerOff {
        /// The train to stop.
        train: TrainId,
        /// Cut power immediately, bypassing the ramp.
        emergency: bool,
    },
    /// Change the commanded speed. Ignored unless the train is powered on.
    SetSpeed {
        /// The train to command.
        train: TrainId,
        /// Signed speed in km/h (scale), sign = direction.
        value: f64,
    },
    /// Stage a round change, committed at the next tick boundary.
    SelectRound {
        /// The round to switch to.
        round: RoundKind,
    },
    /// Tick or untick an admin checklist item.
    UpdateChecklist {
        /// The train whose checklist is updated.
        train: TrainId,
        /// Name of the checklist item.
        item: String,
        /// New value of the item.
        value: bool,
    },
    /// Stop every train immediately and latch the halted flag.
    EmergencyStop,
    /// Release the halted latch.
    ClearEmergency,
    /// Throw a switch on behalf of a train, validated by the conflict resolver.
    ThrowSwitch {
        /// The train requesting the route.
        train: TrainId,
        /// The switch to throw.
        switch: SwitchId,
        /// Requested position.
        position: SwitchPosition,
    },
    /// Set (or with `None`, remove) a named speed limit.
    SetSpeedLimit {
        /// The train to limit, or `None` for every train.
        train: Option<TrainId>,
        /// Name of the limit; limits with the same name replace each other.
        name: String,
        /// Absolute limit in km/h, `None` removes the limit.
        limit: Option<f64>,
    },
    /// Lock or unlock all switches.
    LockSwitches {
        /// Whether switches are locked.
        locked: bool,
    },
    /// Correct the inferred position of an unpowered train.
    OverridePosition {
        /// The train to relocate.
        train: TrainId,
        /// Segments the train actually occupies.
        segments: SegmentList,
    },
    /// Master pause: cut power to every train and refuse power-on.
    Pause,
    /// Undo a master pause.
    Resume,
}

impl IntentPayload {
    /// Short operation name, used in logs and rejection messages.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::PowerOn { .. } => "power_on",
            Self::PowerOff { .. } => "power_off",
            Self::SetSpeed { .. } => "set_speed",
            Self::SelectRound { .. } => "select_round",
            Self::UpdateChecklist { .. } => "update_checklist",
            Self::EmergencyStop => "emergency_stop",
            Self::ClearEmergency => "clear_emergency",
            Self::ThrowSwitch { .. } => "throw_switch",
            Self::SetSpeedLimit { .. } => "set_speed_limit",
            Self::LockSwitches { .. } => "lock_switches",
            Self::OverridePosition { .. } => "override_position",
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }
}

/// Receipt returned for each intent in a submitted batch.
///
/// # Examples
///
/// ```
/// use loco_core::{Receipt, TickId};
///
/// let receipt = Receipt {
///     accepted: true,
///     applied_tick_id: Some(TickId(5)),
///     reason: None,
///     command_index: 0,
/// };
///
/// assert!(receipt.accepted);
/// assert_eq!(receipt.applied_tick_id, Some(TickId(5)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Receipt {
    /// Whether the intent was accepted (and, once applied, succeeded).
    pub accepted: bool,
    /// The tick at which the intent was applied, if applicable.
    pub applied_tick_id: Option<TickId>,
    /// The reason the intent was rejected, if applicable.
    pub reason: Option<Rejection>,
    /// Index of this intent within the submitted batch.
    pub command_index: usize,
}

impl Receipt {
    /// Receipt for an intent accepted into the queue but not yet applied.
    pub fn queued(command_index: usize) -> Self {
        Self {
            accepted: true,
            applied_tick_id: None,
            reason: None,
            command_index,
        }
    }

    /// Receipt for a rejected intent.
    pub fn rejected(command_index: usize, reason: Rejection) -> Self {
        Self {
            accepted: false,
            applied_tick_id: None,
            reason: Some(reason),
            command_index,
        }
    }

    /// Convert the receipt into a `Result` for callers that only care
    /// about success.
    pub fn into_result(self) -> Result<(), Rejection> {
        match self.reason {
            Some(reason) if !self.accepted => Err(reason),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emergency_stop_keeps_top_priority() {
        let stop = Intent::emergency_stop().with_priority(PRIORITY_SCHEDULED);
        assert_eq!(stop.priority_class, PRIORITY_EMERGENCY);
        let speed = Intent::set_speed(TrainId(1), 40.0).with_priority(PRIORITY_SCHEDULED);
        assert_eq!(speed.priority_class, PRIORITY_SCHEDULED);
    }

    #[test]
    fn round_kind_parses_its_own_names() {
        for kind in [
            RoundKind::Regular,
            RoundKind::Fast,
            RoundKind::Outside,
            RoundKind::Opening,
        ] {
            assert_eq!(kind.as_str().parse::<RoundKind>(), Ok(kind));
        }
        assert!("ceremony".parse::<RoundKind>().is_err());
    }

    #[test]
    fn only_powered_phases_hold_claims() {
        assert!(TrainPhase::PoweredOn.holds_claim());
        assert!(TrainPhase::Stopping.holds_claim());
        assert!(!TrainPhase::Ready.holds_claim());
        assert!(!TrainPhase::ChecklistPending.holds_claim());
        assert!(!TrainPhase::PoweredOff.holds_claim());
    }

    #[test]
    fn rejected_receipt_converts_to_err() {
        let r = Receipt::rejected(3, Rejection::EmergencyHalted);
        assert_eq!(r.command_index, 3);
        assert_eq!(r.into_result(), Err(Rejection::EmergencyHalted));
        assert_eq!(Receipt::queued(0).into_result(), Ok(()));
    }
}
