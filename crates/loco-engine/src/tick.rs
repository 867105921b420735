//! Tick engine: the single-threaded control loop.
//!
//! [`TickEngine`] owns the railway state, the round scheduler, the
//! ingress queue, and the hardware sink, and runs one fixed-period tick
//! at a time. It spawns no threads; [`LockstepController`] calls it
//! directly and [`RealtimeController`] drives it from a tick thread.
//!
//! [`LockstepController`]: crate::LockstepController
//! [`RealtimeController`]: crate::RealtimeController

use std::sync::Arc;
use std::time::Instant;

use loco_core::{
    Intent, IntentPayload, Receipt, Rejection, SegmentList, SwitchPosition, TickId, TrainId,
};
use loco_track::Topology;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::config::{resolve_segment, ConfigError, ControlConfig, ModeFlags};
use crate::egress::ControlSnapshot;
use crate::gate::OpeningGate;
use crate::ingress::IngressQueue;
use crate::metrics::StepMetrics;
use crate::round::RoundScheduler;
use crate::safety::SafetyManager;
use crate::signal::{SignalSink, SignalState};
use crate::state::RailwayState;
use crate::train::TrainState;

// ── Submission / TickResult ──────────────────────────────────────

/// Outcome of [`TickEngine::submit_intents`].
#[derive(Debug)]
pub struct Submission {
    /// Batch number assigned by the ingress queue.
    pub batch: u64,
    /// One receipt per submitted intent. Accepted intents are only queued;
    /// their final receipt comes from the tick that applies them.
    pub receipts: Vec<Receipt>,
}

/// Result of one tick.
#[derive(Debug)]
pub struct TickResult {
    /// Final receipts for every intent drained this tick, in apply order.
    pub receipts: Vec<Receipt>,
    /// `batches[i]` is the submission batch of `receipts[i]`.
    pub batches: Vec<u64>,
    /// Timing and counters for this tick.
    pub metrics: StepMetrics,
}

impl TickResult {
    /// Receipts belonging to one submission batch, ordered by
    /// `command_index`.
    pub fn receipts_for(&self, batch: u64) -> Vec<Receipt> {
        let mut out: Vec<Receipt> = self
            .receipts
            .iter()
            .zip(&self.batches)
            .filter(|(_, b)| **b == batch)
            .map(|(r, _)| r.clone())
            .collect();
        out.sort_by_key(|r| r.command_index);
        out
    }
}

// ── TickEngine ───────────────────────────────────────────────────

/// Single-threaded control engine.
///
/// Each [`execute_tick`](Self::execute_tick) call commits any staged
/// round change, applies drained intents (emergency stops first), advances
/// trains and the scheduler by one period, enforces off-time, sends
/// changed hardware signals, and publishes a new snapshot.
pub struct TickEngine {
    state: RailwayState,
    scheduler: RoundScheduler,
    ingress: IngressQueue,
    clock: Box<dyn Clock>,
    sink: Box<dyn SignalSink>,
    signals: SignalState,
    flags: ModeFlags,
    dt: f64,
    current_tick: TickId,
    shutting_down: bool,
    queue_full_rejections: u64,
    snapshot: Arc<ControlSnapshot>,
    last_metrics: StepMetrics,
}

impl TickEngine {
    /// Construct an engine from a [`ControlConfig`] and process flags.
    ///
    /// Validates the configuration, builds the topology and the trains at
    /// their start segments, and sets up the first round.
    pub fn new(
        config: ControlConfig,
        flags: ModeFlags,
        clock: Box<dyn Clock>,
        sink: Box<dyn SignalSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        config.validate_flags(&flags)?;
        let topology = Arc::new(Topology::from_config(&config.topology)?);

        let mut trains = Vec::with_capacity(config.trains.len());
        for (i, train) in config.trains.iter().enumerate() {
            let context = format!("train '{}'", train.name);
            let segments: SegmentList = train
                .start
                .iter()
                .map(|s| resolve_segment(&topology, &context, s))
                .collect::<Result<_, _>>()?;
            trains.push(TrainState::from_config(TrainId(i as u32), train, segments));
        }

        let safety = SafetyManager::new(&config.safety, &config.engine, &flags);
        let mut state = RailwayState::new(Arc::clone(&topology), trains, safety, flags.show);
        state.set_time(clock.time_of_day());

        let mut scheduler = RoundScheduler::new(&config, &topology, &flags, OpeningGate::new())?;
        scheduler.start(&mut state, &flags);

        let signals = SignalState::new(topology.segment_count(), topology.switch_count());
        let snapshot = Arc::new(ControlSnapshot::build(
            TickId(0),
            &state,
            &scheduler,
            &flags,
        ));

        Ok(Self {
            state,
            scheduler,
            ingress: IngressQueue::new(config.engine.max_ingress_queue),
            clock,
            sink,
            signals,
            flags,
            dt: 1.0 / config.engine.tick_rate_hz,
            current_tick: TickId(0),
            shutting_down: false,
            queue_full_rejections: 0,
            snapshot,
            last_metrics: StepMetrics::default(),
        })
    }

    /// Queue intents for the next tick.
    pub fn submit_intents(&mut self, intents: Vec<Intent>) -> Submission {
        let (batch, receipts) = self.ingress.submit(intents, self.shutting_down);
        self.queue_full_rejections += receipts
            .iter()
            .filter(|r| r.reason == Some(Rejection::QueueFull))
            .count() as u64;
        Submission { batch, receipts }
    }

    /// Execute one tick. Rejected intents are reported in the receipts
    /// and never abort the tick.
    pub fn execute_tick(&mut self) -> TickResult {
        let tick_start = Instant::now();
        let next_tick = TickId(self.current_tick.0 + 1);

        // 0. Time of day, staged round change.
        self.state.set_time(self.clock.time_of_day());
        self.scheduler.commit_pending(&mut self.state);

        // 1. Drain and apply intents, emergency stops first.
        let cmd_start = Instant::now();
        let drained = self.ingress.drain();
        let mut receipts = Vec::with_capacity(drained.len());
        let mut batches = Vec::with_capacity(drained.len());
        let mut intents_applied = 0u32;
        let mut intents_rejected = 0u32;
        for d in drained {
            let operation = d.intent.payload.operation();
            let receipt = match self.apply(d.intent.payload) {
                Ok(()) => {
                    intents_applied += 1;
                    Receipt {
                        accepted: true,
                        applied_tick_id: Some(next_tick),
                        reason: None,
                        command_index: d.command_index,
                    }
                }
                Err(reason) => {
                    intents_rejected += 1;
                    warn!(operation, %reason, "intent rejected");
                    Receipt::rejected(d.command_index, reason)
                }
            };
            receipts.push(receipt);
            batches.push(d.batch);
        }
        let command_processing_us = cmd_start.elapsed().as_micros() as u64;

        // 2. Trains, then the scheduler, then off-time.
        let sim_dt = self.state.safety().sim_dt(self.dt);
        self.state.advance(sim_dt);
        let scheduler_start = Instant::now();
        self.scheduler.advance(&mut self.state, sim_dt);
        let scheduler_us = scheduler_start.elapsed().as_micros() as u64;
        self.state.enforce_off_time();

        if let Some(violation) = self.state.find_violation() {
            error!(
                train = %violation.train,
                reason = %violation.reason,
                "track claim violated, cutting power"
            );
            let _ = self.state.power_off(violation.train, true);
        }

        // 3. Hardware signals.
        let signal_start = Instant::now();
        let signals_emitted = self.emit_signals();
        let signal_us = signal_start.elapsed().as_micros() as u64;

        // 4. Publish.
        let publish_start = Instant::now();
        self.current_tick = next_tick;
        self.snapshot = Arc::new(ControlSnapshot::build(
            next_tick,
            &self.state,
            &self.scheduler,
            &self.flags,
        ));
        let snapshot_publish_us = publish_start.elapsed().as_micros() as u64;

        let metrics = StepMetrics {
            total_us: tick_start.elapsed().as_micros() as u64,
            command_processing_us,
            scheduler_us,
            signal_us,
            snapshot_publish_us,
            intents_applied,
            intents_rejected,
            signals_emitted,
            queue_full_rejections: self.queue_full_rejections,
        };
        if self.flags.measure {
            debug!(
                tick = next_tick.0,
                total_us = metrics.total_us,
                scheduler_us,
                "tick"
            );
        }
        self.last_metrics = metrics.clone();

        TickResult {
            receipts,
            batches,
            metrics,
        }
    }

    fn apply(&mut self, payload: IntentPayload) -> Result<(), Rejection> {
        match payload {
            IntentPayload::PowerOn { train } => self.state.power_on(train),
            IntentPayload::PowerOff { train, emergency } => self.state.power_off(train, emergency),
            IntentPayload::SetSpeed { train, value } => self.state.set_speed(train, value),
            IntentPayload::SelectRound { round } => self.scheduler.select_round(round),
            IntentPayload::UpdateChecklist { train, item, value } => {
                self.state.update_checklist(train, &item, value)
            }
            IntentPayload::EmergencyStop => {
                self.state.emergency_stop();
                Ok(())
            }
            IntentPayload::ClearEmergency => {
                self.state.clear_emergency();
                Ok(())
            }
            IntentPayload::ThrowSwitch {
                train,
                switch,
                position,
            } => self.state.throw_switch(train, switch, position).map(|_| ()),
            IntentPayload::SetSpeedLimit { train, name, limit } => {
                self.state.set_speed_limit(train, &name, limit)
            }
            IntentPayload::LockSwitches { locked } => {
                self.state.lock_switches(locked);
                Ok(())
            }
            IntentPayload::OverridePosition { train, segments } => {
                self.state.override_position(train, segments)
            }
            IntentPayload::Pause => {
                self.state.pause();
                Ok(())
            }
            IntentPayload::Resume => {
                self.state.resume();
                Ok(())
            }
        }
    }

    /// Send the power levels and switch routes that changed since the
    /// last emission. Returns the number of commands sent.
    fn emit_signals(&mut self) -> u32 {
        if !self.flags.emits_signals() || self.scheduler.ceremony_active() {
            return 0;
        }
        let routes: Vec<SwitchPosition> = self.state.switches().iter().map(|(_, p)| p).collect();
        let commands = self.signals.diff(&self.state.power_levels(), &routes);
        for command in &commands {
            debug!(?command, "signal");
            command.send(self.sink.as_mut());
        }
        commands.len() as u32
    }

    /// Latch the emergency stop outside the intent queue.
    pub fn raise_emergency(&mut self) {
        self.state.emergency_stop();
    }

    /// Cut all power for shutdown and refuse further intents. The
    /// published snapshot reflects the unpowered railway.
    pub fn shutdown_power(&mut self) {
        self.shutting_down = true;
        self.state.shutdown();
        self.emit_signals();
        self.snapshot = Arc::new(ControlSnapshot::build(
            self.current_tick,
            &self.state,
            &self.scheduler,
            &self.flags,
        ));
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The snapshot published by the most recent tick.
    pub fn snapshot(&self) -> &ControlSnapshot {
        &self.snapshot
    }

    /// Shared handle to the most recent snapshot.
    pub fn shared_snapshot(&self) -> Arc<ControlSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Handle used to confirm the opening ceremony.
    pub fn opening_gate(&self) -> OpeningGate {
        self.scheduler.gate().clone()
    }

    /// Current tick ID.
    pub fn current_tick(&self) -> TickId {
        self.current_tick
    }

    /// Railway state.
    pub fn state(&self) -> &RailwayState {
        &self.state
    }

    /// Round scheduler.
    pub fn scheduler(&self) -> &RoundScheduler {
        &self.scheduler
    }

    /// Process flags the engine runs with.
    pub fn flags(&self) -> &ModeFlags {
        &self.flags
    }

    /// Wall seconds per tick.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Metrics from the most recent tick.
    pub fn last_metrics(&self) -> &StepMetrics {
        &self.last_metrics
    }
}
