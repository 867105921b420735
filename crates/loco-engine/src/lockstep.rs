//! Lockstep (synchronous) controller.
//!
//! [`LockstepController`] drives the engine from the caller's thread:
//! each [`step_sync()`](LockstepController::step_sync) submits intents,
//! executes exactly one tick, and returns the resulting snapshot. Time
//! only moves when the caller steps, which makes it the controller of
//! choice for tests and replays. No background threads are involved.

use std::sync::Arc;

use loco_core::{Intent, Receipt, TickId};

use crate::clock::Clock;
use crate::config::{ConfigError, ControlConfig, ModeFlags};
use crate::egress::ControlSnapshot;
use crate::gate::OpeningGate;
use crate::metrics::StepMetrics;
use crate::signal::SignalSink;
use crate::tick::TickEngine;

// Compile-time assertion: LockstepController can move between threads.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<LockstepController>();
    }
};

// ── StepResult ──────────────────────────────────────────────────

/// Result of one [`LockstepController::step_sync()`] call.
#[derive(Debug)]
pub struct StepResult {
    /// Snapshot of the railway after this tick.
    pub snapshot: Arc<ControlSnapshot>,
    /// One receipt per submitted intent, ordered by `command_index`.
    /// Intents refused at submission (`QueueFull`, `ShuttingDown`) are
    /// included alongside those accepted or rejected by the tick.
    pub receipts: Vec<Receipt>,
    /// Timing and counters for this tick.
    pub metrics: StepMetrics,
}

// ── LockstepController ──────────────────────────────────────────

/// Single-threaded controller for lockstep execution.
///
/// ```ignore
/// let mut ctl = LockstepController::new(config, flags, clock, sink)?;
/// let step = ctl.step_sync(vec![Intent::power_on(TrainId(0))]);
/// assert!(step.receipts[0].accepted);
/// ```
pub struct LockstepController {
    engine: TickEngine,
}

impl LockstepController {
    /// Validate the configuration and build a ready-to-step controller.
    pub fn new(
        config: ControlConfig,
        flags: ModeFlags,
        clock: Box<dyn Clock>,
        sink: Box<dyn SignalSink>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            engine: TickEngine::new(config, flags, clock, sink)?,
        })
    }

    /// Submit `intents` and execute one tick.
    pub fn step_sync(&mut self, intents: Vec<Intent>) -> StepResult {
        let submission = self.engine.submit_intents(intents);

        // Accepted intents get their final receipts from execute_tick.
        let mut receipts: Vec<Receipt> = submission
            .receipts
            .into_iter()
            .filter(|r| !r.accepted)
            .collect();

        let tick_result = self.engine.execute_tick();
        receipts.extend(tick_result.receipts_for(submission.batch));
        receipts.sort_by_key(|r| r.command_index);

        StepResult {
            snapshot: self.engine.shared_snapshot(),
            receipts,
            metrics: tick_result.metrics,
        }
    }

    /// Execute `n` ticks without intents and return the last snapshot.
    pub fn run_for(&mut self, n: u64) -> Arc<ControlSnapshot> {
        for _ in 0..n {
            self.engine.execute_tick();
        }
        self.engine.shared_snapshot()
    }

    /// Handle used to confirm the opening ceremony.
    pub fn opening_gate(&self) -> OpeningGate {
        self.engine.opening_gate()
    }

    /// The snapshot published by the most recent tick.
    pub fn snapshot(&self) -> Arc<ControlSnapshot> {
        self.engine.shared_snapshot()
    }

    /// Current tick ID.
    pub fn current_tick(&self) -> TickId {
        self.engine.current_tick()
    }

    /// The underlying engine.
    pub fn engine(&self) -> &TickEngine {
        &self.engine
    }

    /// Metrics from the most recent tick.
    pub fn last_metrics(&self) -> &StepMetrics {
        self.engine.last_metrics()
    }
}

impl std::fmt::Debug for LockstepController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockstepController")
            .field("current_tick", &self.engine.current_tick())
            .field("flags", self.engine.flags())
            .finish()
    }
}
