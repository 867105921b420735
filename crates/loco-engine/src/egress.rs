//! Published state: what dashboards and exhibition displays read.
//!
//! A [`ControlSnapshot`] is built at the end of every tick from the
//! railway state and the scheduler, then published as an `Arc` so
//! readers never observe a half-applied tick.

use chrono::NaiveTime;
use loco_core::{RoundKind, SegmentList, SwitchId, SwitchPosition, TickId, TrainId, TrainPhase};

use crate::config::ModeFlags;
use crate::round::{RoundScheduler, SchedulerPhase};
use crate::speed::SpeedController;
use crate::state::RailwayState;
use crate::train::TrainState;

/// Position of one switch.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchView {
    /// Switch id.
    pub id: SwitchId,
    /// Configured name.
    pub name: String,
    /// Current position.
    pub position: SwitchPosition,
}

/// Everything a client needs to render one train.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainView {
    /// Train id.
    pub id: TrainId,
    /// Configured name.
    pub name: String,
    /// Display text: label with a direction arrow, marked when unpowered.
    pub label: String,
    /// Whether the train is shown at all. Hidden during the opening
    /// ceremony and while withdrawn from the current round.
    pub visible: bool,
    /// Whether admin controls for this train are disabled.
    pub admin_disabled: bool,
    /// Whether `power_on` would currently succeed.
    pub power_on_permitted: bool,
    /// Why `power_on` would be refused.
    pub permit_reason: Option<String>,
    /// Displayed speed in km/h, signed.
    pub speed: f64,
    /// Commanded speed in km/h, signed.
    pub target_speed: f64,
    /// Lifecycle phase.
    pub phase: TrainPhase,
    /// Occupied segments.
    pub segments: SegmentList,
    /// Decoder speed code for the displayed speed.
    pub speed_code: u8,
    /// Odometer in model millimetres.
    pub distance_mm: f64,
    /// Admin checklist items and whether each is ticked.
    pub checklist: Vec<(String, bool)>,
    /// Ramp used to interpolate `speed` between snapshots.
    pub controller: SpeedController,
}

impl TrainView {
    fn from_state(train: &TrainState, state: &RailwayState, hidden: bool) -> Self {
        let permit = state.check_power_on(train.id());
        let member = state.is_member(train.id());
        Self {
            id: train.id(),
            name: train.name().to_string(),
            label: display_label(train),
            visible: !hidden && (member || train.is_powered()),
            admin_disabled: !member || state.read_only(),
            power_on_permitted: permit.is_ok(),
            permit_reason: permit.err().map(|e| e.to_string()),
            speed: train.speed(),
            target_speed: train.target(),
            phase: train.phase(),
            segments: train.segments().clone(),
            speed_code: train.speed_code(),
            distance_mm: train.distance_mm(),
            checklist: train
                .checklist()
                .map(|(item, done)| (item.to_string(), done))
                .collect(),
            controller: train.controller(),
        }
    }

    /// Displayed speed `elapsed` seconds after the snapshot was taken,
    /// assuming the target does not change.
    pub fn speed_after(&self, elapsed: f64) -> f64 {
        self.controller
            .project(self.speed, self.target_speed, elapsed)
    }
}

fn display_label(train: &TrainState) -> String {
    let heading = if train.target() != 0.0 {
        train.target()
    } else {
        train.speed()
    };
    let mut text = if heading < 0.0 {
        format!("◀ {}", train.label())
    } else {
        format!("{} ▶", train.label())
    };
    if !train.is_powered() {
        text.push_str(" (no power)");
    }
    text
}

/// The state of the whole railway after one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlSnapshot {
    /// Tick that produced the snapshot.
    pub tick_id: TickId,
    /// Time of day the tick ran at.
    pub time_of_day: NaiveTime,
    /// Current round.
    pub round: Option<RoundKind>,
    /// Round that follows.
    pub next_round: Option<RoundKind>,
    /// What the scheduler is doing.
    pub scheduler: SchedulerPhase,
    /// Emergency latch.
    pub halted: bool,
    /// Master pause.
    pub paused: bool,
    /// Whether off-time is enforced right now.
    pub off_time: bool,
    /// Operator switch lock.
    pub switches_locked: bool,
    /// Sound enabled for this process.
    pub sound: bool,
    /// Show mode: clients should offer no controls.
    pub read_only: bool,
    /// Every switch in id order.
    pub switches: Vec<SwitchView>,
    /// Every train in id order.
    pub trains: Vec<TrainView>,
}

impl ControlSnapshot {
    pub(crate) fn build(
        tick_id: TickId,
        state: &RailwayState,
        scheduler: &RoundScheduler,
        flags: &ModeFlags,
    ) -> Self {
        let topology = state.topology();
        let hidden = scheduler.ceremony_active();
        Self {
            tick_id,
            time_of_day: state.now(),
            round: scheduler.current(),
            next_round: scheduler.next(),
            scheduler: scheduler.phase(),
            halted: state.safety().halted(),
            paused: state.safety().paused(),
            off_time: state.off_time_active(),
            switches_locked: state.switches_locked(),
            sound: flags.sound,
            read_only: state.read_only(),
            switches: state
                .switches()
                .iter()
                .map(|(id, position)| SwitchView {
                    id,
                    name: topology.switch_name(id).unwrap_or_default().to_string(),
                    position,
                })
                .collect(),
            trains: state
                .trains()
                .iter()
                .map(|t| TrainView::from_state(t, state, hidden))
                .collect(),
        }
    }

    /// View of one train.
    pub fn train(&self, id: TrainId) -> Option<&TrainView> {
        self.trains.get(id.0 as usize)
    }

    /// View of the train with the given configured name.
    pub fn train_by_name(&self, name: &str) -> Option<&TrainView> {
        self.trains.iter().find(|t| t.name == name)
    }

    /// Position of the named switch.
    pub fn switch_position(&self, name: &str) -> Option<SwitchPosition> {
        self.switches
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(speed: f64, target: f64) -> TrainView {
        TrainView {
            id: TrainId(0),
            name: "A".into(),
            label: "A ▶".into(),
            visible: true,
            admin_disabled: false,
            power_on_permitted: false,
            permit_reason: None,
            speed,
            target_speed: target,
            phase: TrainPhase::PoweredOn,
            segments: SegmentList::new(),
            speed_code: 0,
            distance_mm: 0.0,
            checklist: Vec::new(),
            controller: SpeedController::new(10.0, 20.0),
        }
    }

    #[test]
    fn speed_after_interpolates_toward_target() {
        let v = view(0.0, 40.0);
        assert!((v.speed_after(1.0) - 10.0).abs() < 1e-9);
        assert!((v.speed_after(10.0) - 40.0).abs() < 1e-9);
        let v = view(40.0, 0.0);
        assert!((v.speed_after(1.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn lookup_by_name() {
        let snap = ControlSnapshot {
            tick_id: TickId(1),
            time_of_day: NaiveTime::MIN,
            round: None,
            next_round: None,
            scheduler: SchedulerPhase::Idle,
            halted: false,
            paused: false,
            off_time: false,
            switches_locked: false,
            sound: true,
            read_only: false,
            switches: vec![SwitchView {
                id: SwitchId(0),
                name: "W1".into(),
                position: SwitchPosition::Diverging,
            }],
            trains: vec![view(0.0, 0.0)],
        };
        assert_eq!(snap.train_by_name("A").map(|t| t.id), Some(TrainId(0)));
        assert!(snap.train_by_name("B").is_none());
        assert!(snap.train(TrainId(0)).is_some());
        assert_eq!(
            snap.switch_position("W1"),
            Some(SwitchPosition::Diverging)
        );
    }
}
