//! [`RealtimeController`]: the engine on its own tick thread.
//!
//! ```text
//! Operator thread(s)                 Tick thread
//!     |                                  |
//!     |--submit_intents()--------------->| cmd_rx.try_recv()
//!     |   [cmd_tx: bounded(64)]          | engine.submit_intents()
//!     |                                  | engine.execute_tick()
//!     |<--receipts via reply_tx----------| ring.push(snapshot)
//!     |                                  | park_timeout(budget - elapsed)
//!     |--emergency_stop()--[atomic]----->| raise_emergency() at tick start
//!     |--latest_snapshot()--[ring]       |
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};
use loco_core::{Intent, Receipt, TickId};
use thiserror::Error;
use tracing::info;

use crate::clock::Clock;
use crate::config::{ConfigError, ControlConfig, ModeFlags};
use crate::egress::ControlSnapshot;
use crate::gate::OpeningGate;
use crate::ring::SnapshotRing;
use crate::signal::SignalSink;
use crate::tick::TickEngine;
use crate::tick_thread::{IngressBatch, TickThreadState};

// Compile-time assertion: operator threads share one controller.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<RealtimeController>();
};

// ── Error types ──────────────────────────────────────────────────

/// Why a batch could not be handed to the tick thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The tick thread has shut down.
    #[error("tick thread has shut down")]
    Shutdown,
    /// The intent channel is full; retry after the next tick.
    #[error("intent channel full")]
    ChannelFull,
}

// ── ShutdownReport ───────────────────────────────────────────────

/// Timing of a [`RealtimeController::shutdown`].
#[derive(Clone, Copy, Debug)]
pub struct ShutdownReport {
    /// Total time spent in shutdown.
    pub total_ms: u64,
    /// Time until the tick thread acknowledged the shutdown.
    pub drain_ms: u64,
    /// Whether the tick thread was joined.
    pub tick_joined: bool,
}

// ── RealtimeController ───────────────────────────────────────────

/// Runs a [`TickEngine`] at `tick_rate_hz` on a background thread.
///
/// Intents are applied at the next tick boundary and
/// [`submit_intents`](Self::submit_intents) blocks until that tick has
/// run, so the returned receipts are final. Dropping the controller
/// cuts all track power and stops the thread.
pub struct RealtimeController {
    ring: Arc<SnapshotRing>,
    cmd_tx: Option<Sender<IngressBatch>>,
    shutdown_flag: Arc<AtomicBool>,
    emergency_flag: Arc<AtomicBool>,
    tick_stopped: Arc<AtomicBool>,
    tick_thread: Option<JoinHandle<TickEngine>>,
    gate: OpeningGate,
    stopped: bool,
}

impl RealtimeController {
    /// Build the engine and start the tick thread.
    pub fn new(
        config: ControlConfig,
        flags: ModeFlags,
        clock: Box<dyn Clock>,
        sink: Box<dyn SignalSink>,
    ) -> Result<Self, ConfigError> {
        let ring_size = config.engine.ring_buffer_size;
        let engine = TickEngine::new(config, flags, clock, sink)?;
        let gate = engine.opening_gate();

        let ring = Arc::new(SnapshotRing::new(ring_size));
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let emergency_flag = Arc::new(AtomicBool::new(false));
        let tick_stopped = Arc::new(AtomicBool::new(false));

        // Intent channel: bounded(64); the tick thread drains it every tick.
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(64);

        let tick_ring = Arc::clone(&ring);
        let tick_shutdown = Arc::clone(&shutdown_flag);
        let tick_emergency = Arc::clone(&emergency_flag);
        let tick_stopped_flag = Arc::clone(&tick_stopped);
        let tick_thread = thread::Builder::new()
            .name("loco-tick".into())
            .spawn(move || {
                TickThreadState::new(
                    engine,
                    tick_ring,
                    cmd_rx,
                    tick_shutdown,
                    tick_emergency,
                    tick_stopped_flag,
                )
                .run()
            })
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("tick thread: {e}"),
            })?;

        Ok(Self {
            ring,
            cmd_tx: Some(cmd_tx),
            shutdown_flag,
            emergency_flag,
            tick_stopped,
            tick_thread: Some(tick_thread),
            gate,
            stopped: false,
        })
    }

    /// Submit intents and wait for the tick that applies them.
    ///
    /// Returns one receipt per intent, ordered by `command_index`.
    pub fn submit_intents(&self, intents: Vec<Intent>) -> Result<Vec<Receipt>, SubmitError> {
        let cmd_tx = self.cmd_tx.as_ref().ok_or(SubmitError::Shutdown)?;

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let batch = IngressBatch {
            intents,
            reply: reply_tx,
        };
        cmd_tx.try_send(batch).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::ChannelFull,
            TrySendError::Disconnected(_) => SubmitError::Shutdown,
        })?;

        reply_rx.recv().map_err(|_| SubmitError::Shutdown)
    }

    /// Stop every train at the start of the next tick, from any thread,
    /// without waiting for the intent channel.
    pub fn emergency_stop(&self) {
        self.emergency_flag.store(true, Ordering::Release);
        if let Some(handle) = &self.tick_thread {
            handle.thread().unpark();
        }
    }

    /// Handle used to confirm the opening ceremony.
    pub fn opening_gate(&self) -> &OpeningGate {
        &self.gate
    }

    /// The most recently published snapshot.
    pub fn latest_snapshot(&self) -> Option<Arc<ControlSnapshot>> {
        self.ring.latest()
    }

    /// Retained snapshots published after `after`, oldest first.
    pub fn snapshots_since(&self, after: TickId) -> Vec<Arc<ControlSnapshot>> {
        self.ring.since(after)
    }

    /// Stop the tick thread. All track power is cut before it exits.
    /// Calling this more than once is harmless.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.stopped {
            return ShutdownReport {
                total_ms: 0,
                drain_ms: 0,
                tick_joined: true,
            };
        }
        let start = Instant::now();
        self.shutdown_flag.store(true, Ordering::Release);
        if let Some(handle) = &self.tick_thread {
            handle.thread().unpark();
        }

        let drain_deadline = Instant::now() + Duration::from_millis(500);
        while !self.tick_stopped.load(Ordering::Acquire) {
            if Instant::now() > drain_deadline {
                break;
            }
            thread::yield_now();
        }
        let drain_ms = start.elapsed().as_millis() as u64;

        self.cmd_tx.take();
        let tick_joined = match self.tick_thread.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        };
        self.stopped = true;

        let total_ms = start.elapsed().as_millis() as u64;
        info!(total_ms, tick_joined, "controller shut down");
        ShutdownReport {
            total_ms,
            drain_ms,
            tick_joined,
        }
    }
}

impl Drop for RealtimeController {
    fn drop(&mut self) {
        if !self.stopped {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for RealtimeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeController")
            .field("published", &self.ring.published())
            .field("stopped", &self.stopped)
            .finish()
    }
}
