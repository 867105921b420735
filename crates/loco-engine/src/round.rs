//! Round scheduler: sequences operating rounds and dispatches their legs.
//!
//! Rounds rotate `Regular → Fast → Outside → Regular …` over the kinds that
//! are configured. With the `opening` flag the opening ceremony runs
//! first: trains are placed on their ceremony markers while unpowered and
//! hidden, then the scheduler waits for the [`OpeningGate`].
//!
//! Every change the scheduler makes goes through [`RailwayState`], the
//! same path operator intents take.

use std::fmt;

use loco_core::{
    Precondition, Rejection, RoundKind, SegmentId, SegmentList, SwitchId, SwitchPosition, TrainId,
    TrainPhase,
};
use loco_track::Topology;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::{resolve_segment, ConfigError, ControlConfig, ModeFlags, RoundConfig};
use crate::gate::OpeningGate;
use crate::safety::OffTimeWindow;
use crate::state::RailwayState;

/// Order in which regular service rounds follow each other.
const CYCLE: [RoundKind; 3] = [RoundKind::Regular, RoundKind::Fast, RoundKind::Outside];

/// What the scheduler is doing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SchedulerPhase {
    /// Nothing to schedule: show mode, or no rounds configured.
    #[default]
    Idle,
    /// Placing trains on their ceremony markers.
    Staging,
    /// Ceremony staged; waiting for the operator.
    AwaitingConfirmation,
    /// Waiting for the next round start slot.
    WaitingForSlot,
    /// Dispatching legs.
    Running,
    /// All legs done; ramping members down.
    Finishing,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Staging => "staging",
            Self::AwaitingConfirmation => "awaiting confirmation",
            Self::WaitingForSlot => "waiting for slot",
            Self::Running => "running",
            Self::Finishing => "finishing",
        };
        f.write_str(s)
    }
}

/// One scheduled drive with names resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct LegPlan {
    /// The train that drives.
    pub train: TrainId,
    /// Segment occupied on arrival.
    pub target: SegmentId,
    /// Commanded speed.
    pub speed: f64,
    /// Travel time.
    pub travel_s: f64,
    /// Fixed pause after arrival.
    pub pause_s: f64,
    /// Upper bound of the random extra pause.
    pub pause_jitter_s: f64,
    /// Switches set before departure.
    pub switches: Vec<(SwitchId, SwitchPosition)>,
}

/// A round with names resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundPlan {
    /// Round kind.
    pub kind: RoundKind,
    /// Member trains.
    pub members: Vec<TrainId>,
    /// Round-specific off-time windows.
    pub windows: Vec<OffTimeWindow>,
    /// Legs in dispatch order.
    pub legs: Vec<LegPlan>,
    /// Passes over the legs per round.
    pub repeat: u32,
    /// Ceremony markers (opening only).
    pub ceremony: Vec<(TrainId, SegmentList)>,
}

impl RoundPlan {
    /// Resolve a validated round configuration.
    pub fn from_config(
        round: &RoundConfig,
        config: &ControlConfig,
        topology: &Topology,
    ) -> Result<Self, ConfigError> {
        let context = format!("round '{}'", round.kind);
        let train = |name: &str| {
            config
                .train_index(name)
                .map(|i| TrainId(i as u32))
                .ok_or_else(|| ConfigError::UnknownReference {
                    context: context.clone(),
                    kind: "train",
                    name: name.to_string(),
                })
        };
        let members: Vec<TrainId> = round
            .trains
            .iter()
            .map(|n| train(n.as_str()))
            .collect::<Result<_, _>>()?;
        let mut legs = Vec::with_capacity(round.legs.len());
        for leg in &round.legs {
            let switches: Vec<(SwitchId, SwitchPosition)> = leg
                .switches
                .iter()
                .map(|s| {
                    topology
                        .switch_id(&s.switch)
                        .map(|id| (id, s.position))
                        .ok_or_else(|| ConfigError::UnknownReference {
                            context: context.clone(),
                            kind: "switch",
                            name: s.switch.clone(),
                        })
                })
                .collect::<Result<_, _>>()?;
            legs.push(LegPlan {
                train: train(leg.train.as_str())?,
                target: resolve_segment(topology, &context, &leg.target)?,
                speed: leg.speed,
                travel_s: leg.travel_s,
                pause_s: leg.pause_s,
                pause_jitter_s: leg.pause_jitter_s,
                switches,
            });
        }
        let mut ceremony = Vec::with_capacity(round.ceremony.len());
        for pos in &round.ceremony {
            let segments: SegmentList = pos
                .segments
                .iter()
                .map(|s| resolve_segment(topology, &context, s))
                .collect::<Result<_, _>>()?;
            ceremony.push((train(pos.train.as_str())?, segments));
        }
        Ok(Self {
            kind: round.kind,
            members,
            windows: round.off_time.iter().copied().map(Into::into).collect(),
            legs,
            repeat: round.repeat.max(1),
            ceremony,
        })
    }
}

/// Progress of one dispatched leg.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LegStage {
    /// Setting switches and powering the train.
    Waiting,
    /// Driving toward the target.
    Travelling {
        /// Travel time left.
        remaining_s: f64,
    },
    /// Standing at the target.
    Pausing {
        /// Pause left.
        remaining_s: f64,
    },
}

#[derive(Clone, Debug)]
struct ActiveLeg {
    leg: usize,
    stage: LegStage,
    blocked: Option<Rejection>,
}

/// Sequences rounds and drives their legs, one tick at a time.
pub struct RoundScheduler {
    plans: Vec<RoundPlan>,
    cycle: Vec<RoundKind>,
    current: Option<usize>,
    next: Option<RoundKind>,
    // Flag-selected round queued behind the regular round that follows
    // the opening ceremony.
    follow_up: Option<RoundKind>,
    pending: Option<RoundKind>,
    phase: SchedulerPhase,
    active: Vec<ActiveLeg>,
    next_leg: usize,
    pass: u32,
    elapsed_s: f64,
    rng: ChaCha8Rng,
    gate: OpeningGate,
    measure: bool,
    enabled: bool,
}

impl RoundScheduler {
    /// Build the scheduler. Nothing happens until [`start`](Self::start).
    pub fn new(
        config: &ControlConfig,
        topology: &Topology,
        flags: &ModeFlags,
        gate: OpeningGate,
    ) -> Result<Self, ConfigError> {
        let plans = config
            .rounds
            .iter()
            .map(|r| RoundPlan::from_config(r, config, topology))
            .collect::<Result<Vec<_>, _>>()?;
        let cycle = CYCLE
            .into_iter()
            .filter(|k| plans.iter().any(|p| p.kind == *k))
            .collect();
        Ok(Self {
            plans,
            cycle,
            current: None,
            next: None,
            follow_up: None,
            pending: None,
            phase: SchedulerPhase::Idle,
            active: Vec::new(),
            next_leg: 0,
            pass: 0,
            elapsed_s: 0.0,
            rng: ChaCha8Rng::seed_from_u64(config.engine.seed),
            gate,
            measure: flags.measure,
            enabled: !flags.show,
        })
    }

    /// Set up the first round. With no rounds configured every train is
    /// armed for manual operation.
    pub fn start(&mut self, state: &mut RailwayState, flags: &ModeFlags) {
        if !self.enabled {
            return;
        }
        let first = flags
            .round
            .filter(|k| *k != RoundKind::Opening)
            .or_else(|| self.cycle.first().copied());
        let opening = flags.opening || flags.round == Some(RoundKind::Opening);
        if opening && self.plan_index(RoundKind::Opening).is_some() {
            if self.plan_index(RoundKind::Regular).is_some() {
                self.next = Some(RoundKind::Regular);
                self.follow_up = first.filter(|k| *k != RoundKind::Regular);
            } else {
                self.next = first;
            }
            self.enter(RoundKind::Opening, state);
            return;
        }
        match first {
            Some(kind) => {
                self.next = Some(kind);
                self.phase = SchedulerPhase::WaitingForSlot;
            }
            None => {
                let all: Vec<TrainId> = state.trains().iter().map(|t| t.id()).collect();
                state.enter_round(&all, Vec::new());
                info!("no rounds configured, manual operation");
            }
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Current phase.
    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Kind of the current round.
    pub fn current(&self) -> Option<RoundKind> {
        self.current.map(|i| self.plans[i].kind)
    }

    /// Round that begins after the current one.
    pub fn next(&self) -> Option<RoundKind> {
        self.next
    }

    /// Round staged by [`select_round`](Self::select_round).
    pub fn pending(&self) -> Option<RoundKind> {
        self.pending
    }

    /// Whether the opening ceremony is staged or awaiting confirmation.
    /// Trains are hidden and signals suppressed meanwhile.
    pub fn ceremony_active(&self) -> bool {
        matches!(
            self.phase,
            SchedulerPhase::Staging | SchedulerPhase::AwaitingConfirmation
        )
    }

    /// Number of dispatched, unfinished legs.
    pub fn active_legs(&self) -> usize {
        self.active.len()
    }

    /// Stage of the active leg of `train`, if any.
    pub fn leg_stage(&self, train: TrainId) -> Option<LegStage> {
        let plan = &self.plans[self.current?];
        self.active
            .iter()
            .find(|a| plan.legs[a.leg].train == train)
            .map(|a| a.stage)
    }

    /// Handle used to confirm the opening ceremony.
    pub fn gate(&self) -> &OpeningGate {
        &self.gate
    }

    fn plan_index(&self, kind: RoundKind) -> Option<usize> {
        self.plans.iter().position(|p| p.kind == kind)
    }

    fn cycle_after(&self, kind: RoundKind) -> Option<RoundKind> {
        match self.cycle.iter().position(|k| *k == kind) {
            Some(i) => Some(self.cycle[(i + 1) % self.cycle.len()]),
            None => self.cycle.first().copied(),
        }
    }

    // ── Round transitions ───────────────────────────────────────────

    /// Stage a round change for the next tick boundary.
    pub fn select_round(&mut self, kind: RoundKind) -> Result<(), Rejection> {
        if !self.enabled {
            return Err(Rejection::ReadOnly);
        }
        if self.plan_index(kind).is_none() {
            return Err(Rejection::UnknownRound(kind));
        }
        self.pending = Some(kind);
        Ok(())
    }

    /// Commit a staged round change. Trains on an interrupted leg are
    /// commanded to zero; the new round is entered without waiting for a
    /// start slot.
    pub fn commit_pending(&mut self, state: &mut RailwayState) {
        let Some(kind) = self.pending.take() else {
            return;
        };
        if let Some(i) = self.current {
            for leg in self.active.drain(..) {
                let train = self.plans[i].legs[leg.leg].train;
                let _ = state.set_speed(train, 0.0);
            }
            info!(from = %self.plans[i].kind, to = %kind, "round changed by operator");
        }
        if kind == RoundKind::Opening {
            self.next = self.current().or_else(|| self.cycle.first().copied());
        } else {
            self.follow_up = None;
        }
        self.enter(kind, state);
    }

    fn enter(&mut self, kind: RoundKind, state: &mut RailwayState) {
        let Some(i) = self.plan_index(kind) else {
            self.phase = SchedulerPhase::Idle;
            return;
        };
        self.current = Some(i);
        self.active.clear();
        self.next_leg = 0;
        self.pass = 0;
        self.elapsed_s = 0.0;
        let plan = &self.plans[i];
        if kind == RoundKind::Opening {
            self.gate.reset();
            state.enter_round(&[], plan.windows.clone());
            self.phase = SchedulerPhase::Staging;
            info!("opening ceremony, staging trains");
        } else {
            state.enter_round(&plan.members, plan.windows.clone());
            self.phase = SchedulerPhase::Running;
            info!(round = %kind, members = plan.members.len(), "round started");
        }
    }

    // ── Tick ────────────────────────────────────────────────────────

    /// Advance by `dt` simulated seconds.
    pub fn advance(&mut self, state: &mut RailwayState, dt: f64) {
        if !self.enabled {
            return;
        }
        self.elapsed_s += dt;
        match self.phase {
            SchedulerPhase::Idle => {}
            SchedulerPhase::Staging => self.stage(state),
            SchedulerPhase::AwaitingConfirmation => {
                if self.gate.is_confirmed() {
                    self.log_completion(RoundKind::Opening);
                    match self.next.take() {
                        Some(kind) => self.enter(kind, state),
                        None => self.phase = SchedulerPhase::Idle,
                    }
                }
            }
            SchedulerPhase::WaitingForSlot => {
                if state.safety().round_start_permitted(state.now()) {
                    match self.next.take() {
                        Some(kind) => self.enter(kind, state),
                        None => self.phase = SchedulerPhase::Idle,
                    }
                }
            }
            SchedulerPhase::Running => self.run_legs(state, dt),
            SchedulerPhase::Finishing => {
                let Some(i) = self.current else {
                    self.phase = SchedulerPhase::Idle;
                    return;
                };
                let plan = &self.plans[i];
                let all_down = plan
                    .members
                    .iter()
                    .all(|m| state.train(*m).is_ok_and(|t| !t.is_powered()));
                if all_down {
                    let kind = plan.kind;
                    self.log_completion(kind);
                    self.next = self.follow_up.take().or_else(|| self.cycle_after(kind));
                    self.phase = SchedulerPhase::WaitingForSlot;
                }
            }
        }
    }

    fn log_completion(&self, kind: RoundKind) {
        if self.measure {
            info!(round = %kind, duration_s = self.elapsed_s, "round completed");
        } else {
            info!(round = %kind, "round completed");
        }
    }

    fn stage(&mut self, state: &mut RailwayState) {
        let Some(i) = self.current else {
            return;
        };
        let mut placed = true;
        for (train, segments) in &self.plans[i].ceremony {
            let Ok(t) = state.train(*train) else {
                continue;
            };
            if t.is_powered() {
                let _ = state.power_off(*train, false);
                placed = false;
                continue;
            }
            if t.segments() != segments {
                match state.override_position(*train, segments.clone()) {
                    Ok(()) => debug!(train = %train, "moved to ceremony marker"),
                    Err(e) => {
                        warn!(train = %train, reason = %e, "ceremony placement failed");
                        placed = false;
                    }
                }
            }
        }
        if placed {
            self.phase = SchedulerPhase::AwaitingConfirmation;
            info!("opening ceremony staged, awaiting confirmation");
        }
    }

    fn run_legs(&mut self, state: &mut RailwayState, dt: f64) {
        let Some(i) = self.current else {
            return;
        };
        let plan = &self.plans[i];

        // Dispatch in order; a train runs one leg at a time.
        while let Some(leg) = plan.legs.get(self.next_leg) {
            if self
                .active
                .iter()
                .any(|a| plan.legs[a.leg].train == leg.train)
            {
                break;
            }
            self.active.push(ActiveLeg {
                leg: self.next_leg,
                stage: LegStage::Waiting,
                blocked: None,
            });
            self.next_leg += 1;
        }

        for active in &mut self.active {
            let leg = &plan.legs[active.leg];
            let outcome = match active.stage {
                LegStage::Waiting => depart(state, leg).map(|()| {
                    info!(train = %leg.train, target = %leg.target, "leg departed");
                    LegStage::Travelling {
                        remaining_s: leg.travel_s,
                    }
                }),
                LegStage::Travelling { remaining_s } => {
                    travel(state, leg, remaining_s - dt).map(|arrived| {
                        if arrived {
                            info!(train = %leg.train, target = %leg.target, "leg arrived");
                            let jitter = leg.pause_jitter_s * unit_f64(&mut self.rng);
                            LegStage::Pausing {
                                remaining_s: leg.pause_s + jitter,
                            }
                        } else if state.train(leg.train).is_ok_and(|t| t.is_powered()) {
                            LegStage::Travelling {
                                remaining_s: remaining_s - dt,
                            }
                        } else {
                            LegStage::Travelling { remaining_s }
                        }
                    })
                }
                LegStage::Pausing { remaining_s } => Ok(LegStage::Pausing {
                    remaining_s: remaining_s - dt,
                }),
            };
            match outcome {
                Ok(stage) => {
                    active.stage = stage;
                    active.blocked = None;
                }
                Err(reason) => {
                    if active.blocked.as_ref() != Some(&reason) {
                        warn!(train = %leg.train, %reason, "leg blocked");
                        active.blocked = Some(reason);
                    }
                }
            }
        }
        self.active.retain(|a| {
            !matches!(a.stage, LegStage::Pausing { remaining_s } if remaining_s <= 0.0)
        });

        if self.active.is_empty() && self.next_leg >= plan.legs.len() && !plan.legs.is_empty() {
            self.pass += 1;
            if self.pass < plan.repeat {
                self.next_leg = 0;
                debug!(round = %plan.kind, pass = self.pass, "next pass");
            } else {
                for &member in &plan.members {
                    let _ = state.power_off(member, false);
                }
                self.phase = SchedulerPhase::Finishing;
                info!(round = %plan.kind, "all legs done, ramping down");
            }
        }
    }
}

/// Set the route, power the train, and start it toward the target.
fn depart(state: &mut RailwayState, leg: &LegPlan) -> Result<(), Rejection> {
    if state.off_time_active() {
        return Err(Rejection::PreconditionFailed {
            train: leg.train,
            reason: Precondition::OffTime,
        });
    }
    for &(switch, position) in &leg.switches {
        state.throw_switch(leg.train, switch, position)?;
    }
    let train = state.train(leg.train)?;
    let head = train.segments().last().copied().unwrap_or(leg.target);
    let phase = train.phase();
    state.check_route(head, leg.target)?;
    state.check_claim(leg.train, &[leg.target])?;
    match phase {
        TrainPhase::PoweredOn => {}
        TrainPhase::Ready => state.power_on(leg.train)?,
        phase => {
            return Err(Rejection::InvalidTransition {
                train: leg.train,
                phase,
                operation: "depart",
            })
        }
    }
    state.depart(leg.train, leg.target)?;
    state.set_speed(leg.train, leg.speed)
}

/// Keep a travelling train going. Returns `true` on arrival. A train that
/// lost power on the way is powered again before the clock resumes.
fn travel(state: &mut RailwayState, leg: &LegPlan, remaining_s: f64) -> Result<bool, Rejection> {
    let phase = state.train(leg.train)?.phase();
    match phase {
        TrainPhase::PoweredOn => {}
        TrainPhase::Ready => {
            state.power_on(leg.train)?;
            state.set_speed(leg.train, leg.speed)?;
            return Ok(false);
        }
        _ => return Ok(false),
    }
    if remaining_s > 0.0 {
        return Ok(false);
    }
    state.set_speed(leg.train, 0.0)?;
    state.arrive(leg.train, leg.target)?;
    Ok(true)
}

/// Uniform draw from `[0, 1)`.
fn unit_f64(rng: &mut ChaCha8Rng) -> f64 {
    (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
}
