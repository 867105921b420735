//! The mutable railway: trains, switches, latches, and round membership.
//!
//! [`RailwayState`] is the single path through which anything changes.
//! Operator intents and the round scheduler both call the same methods,
//! so safety gating and conflict checks cannot be bypassed.

use std::sync::Arc;

use chrono::NaiveTime;
use loco_core::{
    Precondition, Rejection, SegmentId, SegmentList, SwitchId, SwitchPosition, TrainId,
    TrainPhase,
};
use loco_track::{
    Claim, ConflictResolver, SwitchGrant, SwitchRequest, SwitchStates, Topology, Violation,
};
use smallvec::smallvec;
use tracing::{info, warn};

use crate::safety::{OffTimeWindow, SafetyManager};
use crate::train::{Advance, TrainState};

/// Everything the update loop mutates, apart from the scheduler.
#[derive(Clone, Debug)]
pub struct RailwayState {
    topology: Arc<Topology>,
    trains: Vec<TrainState>,
    switches: SwitchStates,
    switches_locked: bool,
    safety: SafetyManager,
    read_only: bool,
    now: NaiveTime,
    members: Vec<bool>,
    round_windows: Vec<OffTimeWindow>,
}

impl RailwayState {
    /// State at startup: all trains powered off, switches at their initial
    /// positions, no round entered.
    pub fn new(
        topology: Arc<Topology>,
        trains: Vec<TrainState>,
        safety: SafetyManager,
        read_only: bool,
    ) -> Self {
        let switches = SwitchStates::new(&topology);
        let members = vec![false; trains.len()];
        Self {
            topology,
            trains,
            switches,
            switches_locked: false,
            safety,
            read_only,
            now: NaiveTime::MIN,
            members,
            round_windows: Vec::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Track layout.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// All trains in id order.
    pub fn trains(&self) -> &[TrainState] {
        &self.trains
    }

    /// One train.
    pub fn train(&self, id: TrainId) -> Result<&TrainState, Rejection> {
        self.trains
            .get(id.0 as usize)
            .ok_or(Rejection::UnknownTrain(id))
    }

    fn train_mut(&mut self, id: TrainId) -> Result<&mut TrainState, Rejection> {
        self.trains
            .get_mut(id.0 as usize)
            .ok_or(Rejection::UnknownTrain(id))
    }

    /// Switch positions.
    pub fn switches(&self) -> &SwitchStates {
        &self.switches
    }

    /// Whether the operator locked all switches.
    pub fn switches_locked(&self) -> bool {
        self.switches_locked
    }

    /// Safety policy and latches.
    pub fn safety(&self) -> &SafetyManager {
        &self.safety
    }

    /// Whether control intents are refused (show mode).
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Time of day used for off-time decisions.
    pub fn now(&self) -> NaiveTime {
        self.now
    }

    /// Update the time of day.
    pub fn set_time(&mut self, now: NaiveTime) {
        self.now = now;
    }

    /// Whether the train belongs to the current round.
    pub fn is_member(&self, id: TrainId) -> bool {
        self.members.get(id.0 as usize).copied().unwrap_or(false)
    }

    /// Whether off-time is enforced right now.
    pub fn off_time_active(&self) -> bool {
        self.safety.off_time_active(self.now, &self.round_windows)
    }

    /// Power claims of every train.
    pub fn claims(&self) -> Vec<Claim> {
        self.trains
            .iter()
            .map(|t| Claim {
                train: t.id(),
                segments: t.segments().clone(),
                powered: t.is_powered(),
            })
            .collect()
    }

    /// First pair of powered trains holding conflicting segments.
    pub fn find_violation(&self) -> Option<Violation> {
        ConflictResolver::find_violation(&self.topology, &self.claims())
    }

    /// Desired track power per segment: `None` when no powered train is
    /// on it, otherwise the highest speed code among the powered trains
    /// there. A powered train at rest keeps its segment at `Some(0)`.
    pub fn power_levels(&self) -> Vec<Option<u8>> {
        let mut levels = vec![None; self.topology.segment_count()];
        for train in self.trains.iter().filter(|t| t.is_powered()) {
            let code = train.speed_code();
            for seg in train.segments() {
                if let Some(level) = levels.get_mut(seg.0 as usize) {
                    *level = (*level).max(Some(code));
                }
            }
        }
        levels
    }

    // ── Power ───────────────────────────────────────────────────────

    /// Dry run of [`power_on`](Self::power_on).
    pub fn check_power_on(&self, id: TrainId) -> Result<(), Rejection> {
        let train = self.train(id)?;
        let open = train.checklist_open();
        if open > 0 {
            return Err(Rejection::PreconditionFailed {
                train: id,
                reason: Precondition::ChecklistIncomplete { open },
            });
        }
        if self.read_only {
            return Err(Rejection::ReadOnly);
        }
        if self.safety.halted() {
            return Err(Rejection::EmergencyHalted);
        }
        if self.safety.paused() {
            return Err(Rejection::Paused);
        }
        if self.off_time_active() {
            return Err(Rejection::PreconditionFailed {
                train: id,
                reason: Precondition::OffTime,
            });
        }
        if let Some(remaining_s) = self.safety.cooldown_remaining(train.since_cut()) {
            return Err(Rejection::PreconditionFailed {
                train: id,
                reason: Precondition::Cooldown { remaining_s },
            });
        }
        self.check_claim(id, train.segments())?;
        if train.phase() != TrainPhase::Ready {
            return Err(Rejection::InvalidTransition {
                train: id,
                phase: train.phase(),
                operation: "power_on",
            });
        }
        Ok(())
    }

    /// Turn on track power for a `Ready` train.
    pub fn power_on(&mut self, id: TrainId) -> Result<(), Rejection> {
        self.check_power_on(id)?;
        let train = self.train_mut(id)?;
        train.power_on()?;
        info!(train = train.name(), "power on");
        Ok(())
    }

    /// Stop a train; see [`TrainState::power_off`].
    pub fn power_off(&mut self, id: TrainId, emergency: bool) -> Result<(), Rejection> {
        let train = self.train_mut(id)?;
        if train.power_off(emergency) {
            info!(train = train.name(), emergency, "power off");
        }
        Ok(())
    }

    /// Change the commanded speed. A no-op unless the train is powered on.
    pub fn set_speed(&mut self, id: TrainId, value: f64) -> Result<(), Rejection> {
        if self.read_only {
            return Err(Rejection::ReadOnly);
        }
        self.train_mut(id)?.set_speed(value);
        Ok(())
    }

    /// Tick or untick a checklist item.
    pub fn update_checklist(&mut self, id: TrainId, item: &str, value: bool) -> Result<(), Rejection> {
        self.train_mut(id)?.update_checklist(item, value)
    }

    /// Set or remove a named speed limit on one train or on all of them.
    pub fn set_speed_limit(
        &mut self,
        id: Option<TrainId>,
        name: &str,
        limit: Option<f64>,
    ) -> Result<(), Rejection> {
        match id {
            Some(id) => self.train_mut(id)?.set_speed_limit(name, limit),
            None => self
                .trains
                .iter_mut()
                .for_each(|t| t.set_speed_limit(name, limit)),
        }
        Ok(())
    }

    // ── Track ───────────────────────────────────────────────────────

    /// Whether `id` may hold `segments` under power.
    pub fn check_claim(&self, id: TrainId, segments: &[SegmentId]) -> Result<(), Rejection> {
        let claims = self.claims();
        ConflictResolver::new(&self.topology, &self.switches, &claims)
            .check_claim(id, segments)
            .map_err(Rejection::Impossible)
    }

    /// Whether `to` can be reached from `from` with the switches as set.
    pub fn check_route(&self, from: SegmentId, to: SegmentId) -> Result<(), Rejection> {
        ConflictResolver::new(&self.topology, &self.switches, &[])
            .check_route(from, to)
            .map_err(Rejection::Impossible)
    }

    /// Throw a switch on behalf of a train after the resolver agrees.
    pub fn throw_switch(
        &mut self,
        id: TrainId,
        switch: SwitchId,
        position: SwitchPosition,
    ) -> Result<SwitchGrant, Rejection> {
        if self.read_only {
            return Err(Rejection::ReadOnly);
        }
        self.train(id)?;
        if self.topology.trunk(switch).is_none() {
            return Err(Rejection::UnknownSwitch(switch));
        }
        let claims = self.claims();
        let grant = ConflictResolver::new(&self.topology, &self.switches, &claims)
            .locked(self.switches_locked)
            .check_switch(&SwitchRequest {
                train: id,
                switch,
                position,
            })?;
        self.switches.apply(&grant);
        if grant.changed {
            info!(
                switch = self.topology.switch_name(switch).unwrap_or("?"),
                %position,
                "switch thrown"
            );
        }
        Ok(grant)
    }

    /// Lock or unlock all switches.
    pub fn lock_switches(&mut self, locked: bool) {
        self.switches_locked = locked;
    }

    /// Correct the occupied segments of an unpowered train.
    pub fn override_position(&mut self, id: TrainId, segments: SegmentList) -> Result<(), Rejection> {
        if let Some(&bad) = segments
            .iter()
            .find(|s| !self.topology.contains_segment(**s))
        {
            return Err(Rejection::UnknownSegment(bad));
        }
        self.train_mut(id)?.override_position(segments)
    }

    /// Start a scheduled drive: the train claims its head segment and
    /// `target` until it arrives.
    pub(crate) fn depart(&mut self, id: TrainId, target: SegmentId) -> Result<(), Rejection> {
        let train = self.train(id)?;
        let head = train.segments().last().copied().unwrap_or(target);
        let span: SegmentList = if head == target {
            smallvec![target]
        } else {
            smallvec![head, target]
        };
        self.check_claim(id, &span)?;
        self.train_mut(id)?.arrive(span);
        Ok(())
    }

    /// Finish a scheduled drive: occupancy moves to `target`.
    pub(crate) fn arrive(&mut self, id: TrainId, target: SegmentId) -> Result<(), Rejection> {
        self.train_mut(id)?.arrive(smallvec![target]);
        Ok(())
    }

    // ── Latches ─────────────────────────────────────────────────────

    /// Cut power to every train immediately and withdraw the unpowered
    /// ones from service, without latching. Every train ends `PoweredOff`.
    pub fn cut_power(&mut self) {
        for train in &mut self.trains {
            train.power_off(true);
            train.disarm();
        }
    }

    /// Teardown: cut power and drop the halted latch without re-arming.
    pub fn shutdown(&mut self) {
        self.cut_power();
        self.safety.set_halted(false);
    }

    /// Cut power to every train immediately and latch the halted flag.
    pub fn emergency_stop(&mut self) {
        self.cut_power();
        if !self.safety.halted() {
            warn!("emergency stop");
        }
        self.safety.set_halted(true);
    }

    /// Release the emergency latch and re-arm the round's members.
    pub fn clear_emergency(&mut self) {
        if !self.safety.halted() {
            return;
        }
        self.safety.set_halted(false);
        for (i, train) in self.trains.iter_mut().enumerate() {
            if self.members[i] {
                train.arm();
            }
        }
        info!("emergency cleared");
    }

    /// Master pause: ramp every train down and refuse power-on.
    pub fn pause(&mut self) {
        for train in &mut self.trains {
            train.power_off(false);
        }
        self.safety.set_paused(true);
        info!("paused");
    }

    /// Release the master pause.
    pub fn resume(&mut self) {
        self.safety.set_paused(false);
        info!("resumed");
    }

    // ── Rounds ──────────────────────────────────────────────────────

    /// Make `members` the current round: arm them, withdraw everyone else.
    pub(crate) fn enter_round(&mut self, members: &[TrainId], windows: Vec<OffTimeWindow>) {
        self.round_windows = windows;
        for train in &mut self.trains {
            let member = members.contains(&train.id());
            self.members[train.id().0 as usize] = member;
            if member {
                train.arm();
            } else {
                train.power_off(false);
                train.disarm();
            }
        }
    }

    // ── Time ────────────────────────────────────────────────────────

    /// Advance speeds, odometers, and stop timers by `dt` simulated
    /// seconds. Members whose power was cut are re-armed.
    pub fn advance(&mut self, dt: f64) {
        let timeout = self.safety.stop_timeout_s();
        for (i, train) in self.trains.iter_mut().enumerate() {
            if let Advance::PowerCut { timed_out } = train.advance(dt, timeout) {
                if timed_out {
                    warn!(train = train.name(), "stop timeout, power cut while moving");
                } else {
                    info!(train = train.name(), "power cut");
                }
                if self.members[i] {
                    train.arm();
                }
            }
        }
    }

    /// Ramp idle powered trains down while off-time is in force.
    pub fn enforce_off_time(&mut self) {
        if !self.off_time_active() {
            return;
        }
        for train in self.trains.iter_mut().filter(|t| t.is_idle()) {
            train.power_off(false);
            info!(train = train.name(), "off-time, ramping down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, ModeFlags, SafetyConfig, TrainConfig, WindowConfig};
    use loco_core::ConflictReason;
    use loco_track::{SegmentConfig, SwitchConfig, TopologyConfig};

    // trunk ─ W1 ─┬─ S2 (straight)
    //             └─ S1 (diverging, G1)
    // S3 (G1), yard
    fn layout() -> Arc<Topology> {
        let config = TopologyConfig {
            segments: vec![
                SegmentConfig::new("trunk"),
                SegmentConfig::new("S1").in_group("G1"),
                SegmentConfig::new("S2"),
                SegmentConfig::new("S3").in_group("G1"),
                SegmentConfig::new("yard"),
            ],
            links: vec![["S2".into(), "yard".into()]],
            switches: vec![SwitchConfig {
                name: "W1".into(),
                trunk: "trunk".into(),
                straight: "S2".into(),
                diverging: "S1".into(),
                initial: SwitchPosition::Straight,
            }],
        };
        Arc::new(Topology::from_config(&config).unwrap())
    }

    fn train_config(name: &str, checklist: &[&str]) -> TrainConfig {
        TrainConfig {
            name: name.into(),
            label: None,
            speeds: (0..15).map(|i| f64::from(i) * 10.0).collect(),
            acceleration: 50.0,
            deceleration: None,
            max_speed: None,
            checklist: checklist.iter().map(|s| s.to_string()).collect(),
            start: Vec::new(),
        }
    }

    fn state_with(flags: ModeFlags, safety: SafetyConfig) -> RailwayState {
        let topology = layout();
        let seg = |n: &str| topology.segment_id(n).unwrap();
        let trains = vec![
            TrainState::from_config(TrainId(0), &train_config("A", &[]), smallvec![seg("S1")]),
            TrainState::from_config(TrainId(1), &train_config("B", &[]), smallvec![seg("trunk")]),
            TrainState::from_config(
                TrainId(2),
                &train_config("C", &["wheels"]),
                smallvec![seg("yard")],
            ),
        ];
        let safety = SafetyManager::new(&safety, &EngineConfig::default(), &flags);
        let mut state = RailwayState::new(topology, trains, safety, flags.show);
        state.set_time(NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        state.enter_round(&[TrainId(0), TrainId(1), TrainId(2)], Vec::new());
        state
    }

    fn state() -> RailwayState {
        state_with(ModeFlags::default(), SafetyConfig::default())
    }

    #[test]
    fn group_conflict_blocks_switch_throw() {
        let mut s = state();
        s.power_on(TrainId(0)).unwrap();
        let w1 = s.topology().switch_id("W1").unwrap();
        let err = s
            .throw_switch(TrainId(1), w1, SwitchPosition::Diverging)
            .unwrap_err();
        // S1 itself is held by A; the group is reported.
        assert_eq!(err.to_string(), "impossible: group G1 occupied");
        assert_eq!(s.switches().get(w1), Some(SwitchPosition::Straight));
    }

    #[test]
    fn checklist_reported_first() {
        let mut s = state_with(
            ModeFlags {
                show: true,
                ..ModeFlags::default()
            },
            SafetyConfig::default(),
        );
        s.emergency_stop();
        assert!(matches!(
            s.power_on(TrainId(2)),
            Err(Rejection::PreconditionFailed {
                reason: Precondition::ChecklistIncomplete { open: 1 },
                ..
            })
        ));
        assert_eq!(s.power_on(TrainId(0)), Err(Rejection::ReadOnly));
    }

    #[test]
    fn emergency_latch() {
        let mut s = state();
        s.power_on(TrainId(0)).unwrap();
        assert_eq!(s.trains()[1].phase(), TrainPhase::Ready);
        assert_eq!(s.trains()[2].phase(), TrainPhase::ChecklistPending);
        s.emergency_stop();
        assert!(s
            .trains()
            .iter()
            .all(|t| t.phase() == TrainPhase::PoweredOff));
        assert!(s.safety().halted());
        assert_eq!(s.power_on(TrainId(1)), Err(Rejection::EmergencyHalted));
        s.clear_emergency();
        s.power_on(TrainId(1)).unwrap();
    }

    #[test]
    fn off_time_rejects_outside_debug() {
        let safety = SafetyConfig {
            off_time: vec![WindowConfig {
                start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            }],
            ..SafetyConfig::default()
        };
        let mut s = state_with(ModeFlags::default(), safety.clone());
        assert!(matches!(
            s.power_on(TrainId(0)),
            Err(Rejection::PreconditionFailed {
                reason: Precondition::OffTime,
                ..
            })
        ));
        let mut s = state_with(
            ModeFlags {
                debug: true,
                ..ModeFlags::default()
            },
            safety,
        );
        s.power_on(TrainId(0)).unwrap();
    }

    #[test]
    fn cooldown_after_cut() {
        let mut s = state();
        s.power_on(TrainId(0)).unwrap();
        s.power_off(TrainId(0), false).unwrap();
        s.advance(0.1);
        assert_eq!(s.trains()[0].phase(), TrainPhase::Ready);
        assert!(matches!(
            s.power_on(TrainId(0)),
            Err(Rejection::PreconditionFailed {
                reason: Precondition::Cooldown { .. },
                ..
            })
        ));
        for _ in 0..50 {
            s.advance(0.1);
        }
        s.power_on(TrainId(0)).unwrap();
    }

    #[test]
    fn power_on_conflict_is_impossible() {
        let mut s = state();
        let s3 = s.topology().segment_id("S3").unwrap();
        s.override_position(TrainId(1), smallvec![s3]).unwrap();
        s.power_on(TrainId(0)).unwrap();
        assert!(matches!(
            s.power_on(TrainId(1)),
            Err(Rejection::Impossible(ConflictReason::GroupOccupied { .. }))
        ));
        assert!(s.find_violation().is_none());
    }

    #[test]
    fn pause_ramps_down_and_blocks_power_on() {
        let mut s = state();
        s.power_on(TrainId(0)).unwrap();
        s.pause();
        assert_eq!(s.trains()[0].phase(), TrainPhase::Stopping);
        assert_eq!(s.power_on(TrainId(1)), Err(Rejection::Paused));
        s.resume();
        s.power_on(TrainId(1)).unwrap();
    }

    #[test]
    fn non_members_are_withdrawn() {
        let mut s = state();
        s.power_on(TrainId(1)).unwrap();
        s.enter_round(&[TrainId(0)], Vec::new());
        assert!(!s.is_member(TrainId(1)));
        assert_eq!(s.trains()[1].phase(), TrainPhase::Stopping);
        s.advance(0.1);
        assert_eq!(s.trains()[1].phase(), TrainPhase::PoweredOff);
    }

    #[test]
    fn power_levels_follow_powered_trains() {
        let mut s = state();
        s.power_on(TrainId(0)).unwrap();
        s.set_speed(TrainId(0), 30.0).unwrap();
        for _ in 0..10 {
            s.advance(0.1);
        }
        let s1 = s.topology().segment_id("S1").unwrap();
        let levels = s.power_levels();
        assert_eq!(levels[s1.0 as usize], Some(3));
        assert_eq!(levels.iter().filter(|l| l.is_some()).count(), 1);
    }

    #[test]
    fn train_at_rest_keeps_its_segment_powered() {
        let mut s = state();
        let s1 = s.topology().segment_id("S1").unwrap();
        assert_eq!(s.power_levels()[s1.0 as usize], None);
        s.power_on(TrainId(0)).unwrap();
        assert_eq!(s.power_levels()[s1.0 as usize], Some(0));
        s.power_off(TrainId(0), true).unwrap();
        assert_eq!(s.power_levels()[s1.0 as usize], None);
    }

    #[test]
    fn override_rejects_unknown_segment() {
        let mut s = state();
        assert_eq!(
            s.override_position(TrainId(0), smallvec![SegmentId(99)]),
            Err(Rejection::UnknownSegment(SegmentId(99)))
        );
    }
}
