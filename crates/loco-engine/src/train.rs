//! Per-train state machine.
//!
//! ```text
//! PoweredOff ─arm()─▶ ChecklistPending ⇄ Ready ─power_on()─▶ PoweredOn
//!      ▲                                                        │
//!      └──────────── cut (speed 0 or timeout) ◀── Stopping ◀────┘ power_off()
//! ```
//!
//! The state machine only checks what it can see on its own: phase and
//! checklist. Safety gating (emergency latch, off-time, cooldown, track
//! conflicts) happens before [`TrainState::power_on`] is called.

use indexmap::IndexMap;
use loco_core::{Precondition, Rejection, SegmentList, TrainId, TrainPhase};

use crate::config::{TrainConfig, SPEED_STEPS};
use crate::speed::SpeedController;

/// Decoder speed steps of one train.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeedTable {
    steps: [f64; SPEED_STEPS],
}

impl SpeedTable {
    /// Table from exactly [`SPEED_STEPS`] entries; `None` for any other length.
    pub fn new(steps: &[f64]) -> Option<Self> {
        Some(Self {
            steps: steps.try_into().ok()?,
        })
    }

    /// Index of the entry nearest to `|speed|`. Ties go to the lower code.
    pub fn code_for(&self, speed: f64) -> u8 {
        let wanted = speed.abs();
        let mut best = 0usize;
        for (i, s) in self.steps.iter().enumerate() {
            if (s - wanted).abs() < (self.steps[best] - wanted).abs() {
                best = i;
            }
        }
        best as u8
    }

    /// Speed of the top step.
    pub fn top(&self) -> f64 {
        self.steps[SPEED_STEPS - 1]
    }

    /// Speed for a given code.
    pub fn speed(&self, code: u8) -> Option<f64> {
        self.steps.get(code as usize).copied()
    }
}

/// Live state of one train.
#[derive(Clone, Debug)]
pub struct TrainState {
    id: TrainId,
    name: String,
    label: String,
    phase: TrainPhase,
    speed: f64,
    target: f64,
    segments: SegmentList,
    checklist: IndexMap<String, bool>,
    limits: IndexMap<String, f64>,
    max_speed: f64,
    table: SpeedTable,
    controller: SpeedController,
    distance_mm: f64,
    stopping_for: f64,
    since_cut: Option<f64>,
}

/// What [`TrainState::advance`] observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// Nothing noteworthy.
    Running,
    /// The ramp-down completed and track power was cut.
    PowerCut {
        /// The stop timeout expired before the train came to rest.
        timed_out: bool,
    },
}

/// Scale factor between model speed and model distance: 1:87 (H0),
/// km/h to mm/s.
const MM_PER_S_PER_KMH: f64 = 1_000_000.0 / 3_600.0 / 87.0;

impl TrainState {
    /// Build the initial state from configuration. `segments` are the
    /// resolved start segments.
    pub fn from_config(id: TrainId, config: &TrainConfig, segments: SegmentList) -> Self {
        let table = SpeedTable::new(&config.speeds).unwrap_or(SpeedTable {
            steps: [0.0; SPEED_STEPS],
        });
        let max_speed = config.max_speed.unwrap_or_else(|| table.top());
        Self {
            id,
            name: config.name.clone(),
            label: config.label.clone().unwrap_or_else(|| config.name.clone()),
            phase: TrainPhase::PoweredOff,
            speed: 0.0,
            target: 0.0,
            segments,
            checklist: config
                .checklist
                .iter()
                .map(|item| (item.clone(), false))
                .collect(),
            limits: IndexMap::new(),
            max_speed,
            table,
            controller: SpeedController::new(config.acceleration, config.deceleration()),
            distance_mm: 0.0,
            stopping_for: 0.0,
            since_cut: None,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Train id.
    pub fn id(&self) -> TrainId {
        self.id
    }

    /// Configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current phase.
    pub fn phase(&self) -> TrainPhase {
        self.phase
    }

    /// Displayed (interpolated) speed, signed.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Commanded speed, signed.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Occupied segments.
    pub fn segments(&self) -> &SegmentList {
        &self.segments
    }

    /// Rate limits.
    pub fn controller(&self) -> SpeedController {
        self.controller
    }

    /// Odometer in model millimetres, signed by direction.
    pub fn distance_mm(&self) -> f64 {
        self.distance_mm
    }

    /// Whether the train holds its segments as a power claim.
    pub fn is_powered(&self) -> bool {
        self.phase.holds_claim()
    }

    /// Whether the train is powered, commanded to zero, and at rest.
    pub fn is_idle(&self) -> bool {
        self.phase == TrainPhase::PoweredOn && self.target == 0.0 && self.speed == 0.0
    }

    /// Number of unticked checklist items.
    pub fn checklist_open(&self) -> usize {
        self.checklist.values().filter(|v| !**v).count()
    }

    /// Checklist items in configuration order.
    pub fn checklist(&self) -> impl Iterator<Item = (&str, bool)> {
        self.checklist.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Min of the configured maximum and all named limits.
    pub fn effective_max(&self) -> f64 {
        self.limits
            .values()
            .copied()
            .fold(self.max_speed, f64::min)
    }

    /// Named limits in insertion order.
    pub fn limits(&self) -> impl Iterator<Item = (&str, f64)> {
        self.limits.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Decoder code for the displayed speed.
    pub fn speed_code(&self) -> u8 {
        self.table.code_for(self.speed)
    }

    /// Speed table.
    pub fn speed_table(&self) -> &SpeedTable {
        &self.table
    }

    /// Seconds since the last power cut, `None` if power was never cut.
    pub fn since_cut(&self) -> Option<f64> {
        self.since_cut
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// `PoweredOff → ChecklistPending`, straight to `Ready` when the
    /// checklist is already complete. No effect in other phases.
    pub fn arm(&mut self) -> bool {
        if self.phase != TrainPhase::PoweredOff {
            return false;
        }
        self.phase = if self.checklist_open() == 0 {
            TrainPhase::Ready
        } else {
            TrainPhase::ChecklistPending
        };
        true
    }

    /// Withdraw an unpowered train from service: back to `PoweredOff`.
    pub fn disarm(&mut self) {
        if matches!(
            self.phase,
            TrainPhase::ChecklistPending | TrainPhase::Ready
        ) {
            self.phase = TrainPhase::PoweredOff;
        }
    }

    /// `Ready → PoweredOn`. Checklist is checked first in every phase.
    pub fn power_on(&mut self) -> Result<(), Rejection> {
        let open = self.checklist_open();
        if open > 0 {
            return Err(Rejection::PreconditionFailed {
                train: self.id,
                reason: Precondition::ChecklistIncomplete { open },
            });
        }
        if self.phase != TrainPhase::Ready {
            return Err(self.invalid("power_on"));
        }
        self.phase = TrainPhase::PoweredOn;
        self.speed = 0.0;
        self.target = 0.0;
        Ok(())
    }

    /// Stop the train. Returns `true` if the phase changed.
    ///
    /// Non-emergency: target to zero and `Stopping`; power is cut later by
    /// [`advance`](Self::advance). Emergency: immediate `PoweredOff`, both
    /// speeds zeroed. A no-op outside `PoweredOn`/`Stopping`.
    pub fn power_off(&mut self, emergency: bool) -> bool {
        match self.phase {
            TrainPhase::PoweredOn | TrainPhase::Stopping if emergency => {
                self.cut();
                true
            }
            TrainPhase::PoweredOn => {
                self.phase = TrainPhase::Stopping;
                self.target = 0.0;
                self.stopping_for = 0.0;
                true
            }
            _ => false,
        }
    }

    /// Set the commanded speed, clamped to [`effective_max`](Self::effective_max).
    /// Ignored unless `PoweredOn`. Returns `true` if the target changed.
    pub fn set_speed(&mut self, value: f64) -> bool {
        if self.phase != TrainPhase::PoweredOn || !value.is_finite() {
            return false;
        }
        let clamped = self.clamp(value);
        if clamped == self.target {
            return false;
        }
        self.target = clamped;
        true
    }

    /// Tick or untick a checklist item; re-evaluates `Ready`.
    pub fn update_checklist(&mut self, item: &str, value: bool) -> Result<(), Rejection> {
        if !matches!(
            self.phase,
            TrainPhase::ChecklistPending | TrainPhase::Ready
        ) {
            return Err(self.invalid("update_checklist"));
        }
        let Some(slot) = self.checklist.get_mut(item) else {
            return Err(Rejection::UnknownChecklistItem {
                train: self.id,
                item: item.to_string(),
            });
        };
        *slot = value;
        self.phase = if self.checklist_open() == 0 {
            TrainPhase::Ready
        } else {
            TrainPhase::ChecklistPending
        };
        Ok(())
    }

    /// Set or remove a named speed limit, then re-clamp the target.
    pub fn set_speed_limit(&mut self, name: &str, limit: Option<f64>) {
        match limit {
            Some(value) => {
                self.limits.insert(name.to_string(), value.max(0.0));
            }
            None => {
                self.limits.shift_remove(name);
            }
        }
        self.target = self.clamp(self.target);
    }

    /// Replace the occupied segments. Only while unpowered.
    pub fn override_position(&mut self, segments: SegmentList) -> Result<(), Rejection> {
        if self.is_powered() {
            return Err(self.invalid("override_position"));
        }
        self.segments = segments;
        Ok(())
    }

    /// Move occupancy to `segments` on arrival of a scheduled drive.
    pub(crate) fn arrive(&mut self, segments: SegmentList) {
        self.segments = segments;
    }

    /// Advance the displayed speed, the odometer, and the stop timer.
    pub fn advance(&mut self, dt: f64, stop_timeout: f64) -> Advance {
        let before = self.speed;
        self.speed = self.controller.step(self.speed, self.target, dt);
        self.distance_mm += 0.5 * (before + self.speed) * dt * MM_PER_S_PER_KMH;
        if let Some(t) = self.since_cut.as_mut() {
            *t += dt;
        }
        if self.phase != TrainPhase::Stopping {
            return Advance::Running;
        }
        self.stopping_for += dt;
        let at_rest = self.speed == 0.0;
        let timed_out = !at_rest && self.stopping_for >= stop_timeout;
        if at_rest || timed_out {
            self.cut();
            return Advance::PowerCut { timed_out };
        }
        Advance::Running
    }

    fn cut(&mut self) {
        self.phase = TrainPhase::PoweredOff;
        self.speed = 0.0;
        self.target = 0.0;
        self.stopping_for = 0.0;
        self.since_cut = Some(0.0);
    }

    fn clamp(&self, value: f64) -> f64 {
        let max = self.effective_max();
        value.clamp(-max, max)
    }

    fn invalid(&self, operation: &'static str) -> Rejection {
        Rejection::InvalidTransition {
            train: self.id,
            phase: self.phase,
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loco_core::SegmentId;
    use smallvec::smallvec;

    fn config(checklist: &[&str]) -> TrainConfig {
        TrainConfig {
            name: "ICE".into(),
            label: None,
            speeds: (0..15).map(|i| f64::from(i) * 20.0).collect(),
            acceleration: 40.0,
            deceleration: Some(80.0),
            max_speed: Some(200.0),
            checklist: checklist.iter().map(|s| s.to_string()).collect(),
            start: vec!["platform".into()],
        }
    }

    fn train(checklist: &[&str]) -> TrainState {
        TrainState::from_config(TrainId(0), &config(checklist), smallvec![SegmentId(0)])
    }

    fn powered() -> TrainState {
        let mut t = train(&[]);
        assert!(t.arm());
        t.power_on().unwrap();
        t
    }

    #[test]
    fn arm_skips_to_ready_without_checklist() {
        let mut t = train(&[]);
        assert_eq!(t.phase(), TrainPhase::PoweredOff);
        assert!(t.arm());
        assert_eq!(t.phase(), TrainPhase::Ready);
        assert!(!t.arm());
    }

    #[test]
    fn checklist_gates_ready() {
        let mut t = train(&["wheels", "coupling"]);
        t.arm();
        assert_eq!(t.phase(), TrainPhase::ChecklistPending);
        t.update_checklist("wheels", true).unwrap();
        assert_eq!(t.phase(), TrainPhase::ChecklistPending);
        t.update_checklist("coupling", true).unwrap();
        assert_eq!(t.phase(), TrainPhase::Ready);
        t.update_checklist("wheels", false).unwrap();
        assert_eq!(t.phase(), TrainPhase::ChecklistPending);
        assert_eq!(
            t.update_checklist("brakes", true),
            Err(Rejection::UnknownChecklistItem {
                train: TrainId(0),
                item: "brakes".into()
            })
        );
    }

    #[test]
    fn power_on_reports_checklist_before_phase() {
        let mut t = train(&["wheels"]);
        // Not armed yet, but the checklist is what gets reported.
        assert_eq!(
            t.power_on(),
            Err(Rejection::PreconditionFailed {
                train: TrainId(0),
                reason: Precondition::ChecklistIncomplete { open: 1 }
            })
        );
        let mut t = train(&[]);
        assert!(matches!(
            t.power_on(),
            Err(Rejection::InvalidTransition {
                operation: "power_on",
                phase: TrainPhase::PoweredOff,
                ..
            })
        ));
    }

    #[test]
    fn set_speed_is_clamped_and_idempotent() {
        let mut t = powered();
        assert!(t.set_speed(500.0));
        assert_eq!(t.target(), 200.0);
        assert!(!t.set_speed(500.0));
        assert_eq!(t.target(), 200.0);
        t.set_speed_limit("station", Some(60.0));
        assert_eq!(t.target(), 60.0);
        t.set_speed_limit("visitors", Some(40.0));
        assert_eq!(t.effective_max(), 40.0);
        t.set_speed_limit("visitors", None);
        assert_eq!(t.effective_max(), 60.0);
        assert!(t.set_speed(-100.0));
        assert_eq!(t.target(), -60.0);
    }

    #[test]
    fn set_speed_ignored_unless_powered() {
        let mut t = train(&[]);
        assert!(!t.set_speed(50.0));
        assert_eq!(t.target(), 0.0);
        t.arm();
        assert!(!t.set_speed(50.0));
    }

    #[test]
    fn ramped_stop_cuts_power_at_rest() {
        let mut t = powered();
        t.set_speed(80.0);
        for _ in 0..20 {
            t.advance(0.25, 30.0);
        }
        assert_eq!(t.speed(), 80.0);
        assert!(t.power_off(false));
        assert_eq!(t.phase(), TrainPhase::Stopping);
        assert!(!t.set_speed(50.0));
        // 80 km/h at 80 km/h/s: one second to rest.
        let mut cut = None;
        for _ in 0..4 {
            if let Advance::PowerCut { timed_out } = t.advance(0.25, 30.0) {
                cut = Some(timed_out);
            }
        }
        assert_eq!(cut, Some(false));
        assert_eq!(t.phase(), TrainPhase::PoweredOff);
        assert_eq!(t.since_cut(), Some(0.0));
    }

    #[test]
    fn stop_timeout_forces_cut() {
        let mut t = powered();
        t.set_speed(200.0);
        for _ in 0..40 {
            t.advance(0.25, 30.0);
        }
        t.power_off(false);
        assert_eq!(t.advance(0.25, 0.5), Advance::Running);
        assert_eq!(
            t.advance(0.25, 0.5),
            Advance::PowerCut { timed_out: true }
        );
        assert_eq!(t.speed(), 0.0);
    }

    #[test]
    fn emergency_is_immediate() {
        let mut t = powered();
        t.set_speed(100.0);
        t.advance(1.0, 30.0);
        assert!(t.power_off(true));
        assert_eq!(t.phase(), TrainPhase::PoweredOff);
        assert_eq!(t.speed(), 0.0);
        assert_eq!(t.target(), 0.0);
        assert!(!t.power_off(true));
    }

    #[test]
    fn odometer_integrates_displayed_speed() {
        let mut t = powered();
        t.set_speed(40.0);
        t.advance(1.0, 30.0); // 0 → 40 km/h, mean 20
        let expected = 20.0 * MM_PER_S_PER_KMH;
        assert!((t.distance_mm() - expected).abs() < 1e-9);
    }

    #[test]
    fn override_only_while_unpowered() {
        let mut t = train(&[]);
        t.override_position(smallvec![SegmentId(3)]).unwrap();
        assert_eq!(t.segments().as_slice(), &[SegmentId(3)]);
        let mut t = powered();
        assert!(t.override_position(smallvec![SegmentId(3)]).is_err());
    }

    #[test]
    fn speed_code_is_nearest_step() {
        let table = SpeedTable::new(&(0..15).map(|i| f64::from(i) * 20.0).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(table.code_for(0.0), 0);
        assert_eq!(table.code_for(29.0), 1);
        assert_eq!(table.code_for(-31.0), 2);
        assert_eq!(table.code_for(10.0), 0);
        assert_eq!(table.code_for(999.0), 14);
        assert!(SpeedTable::new(&[0.0; 3]).is_none());
    }
}
