//! Tick loop and intent channel draining for the realtime controller.
//!
//! The tick thread owns [`TickEngine`] exclusively (moved in via
//! `thread::spawn`). Intent batches arrive over a bounded crossbeam
//! channel; each batch's reply is sent after the tick that applied it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use loco_core::{Intent, Receipt};
use tracing::{debug, info};

use crate::ring::SnapshotRing;
use crate::tick::TickEngine;

/// A batch of intents sent from a submitter to the tick thread.
pub(crate) struct IngressBatch {
    pub intents: Vec<Intent>,
    pub reply: Sender<Vec<Receipt>>,
}

/// A submitted batch waiting for the tick that applies it.
struct PendingReply {
    batch: u64,
    receipts: Vec<Receipt>,
    reply: Sender<Vec<Receipt>>,
}

/// State owned by the tick thread.
pub(crate) struct TickThreadState {
    engine: TickEngine,
    ring: Arc<SnapshotRing>,
    cmd_rx: Receiver<IngressBatch>,
    shutdown_flag: Arc<AtomicBool>,
    emergency_flag: Arc<AtomicBool>,
    tick_stopped: Arc<AtomicBool>,
    tick_budget: Duration,
    pending: Vec<PendingReply>,
}

impl TickThreadState {
    pub fn new(
        engine: TickEngine,
        ring: Arc<SnapshotRing>,
        cmd_rx: Receiver<IngressBatch>,
        shutdown_flag: Arc<AtomicBool>,
        emergency_flag: Arc<AtomicBool>,
        tick_stopped: Arc<AtomicBool>,
    ) -> Self {
        let tick_budget = Duration::from_secs_f64(engine.dt());
        Self {
            engine,
            ring,
            cmd_rx,
            shutdown_flag,
            emergency_flag,
            tick_stopped,
            tick_budget,
            pending: Vec::new(),
        }
    }

    /// Run until the shutdown flag is set, then cut all power, publish a
    /// final snapshot, and hand the engine back.
    pub fn run(mut self) -> TickEngine {
        self.ring.push(self.engine.shared_snapshot());
        loop {
            if self.shutdown_flag.load(Ordering::Acquire) {
                break;
            }
            let tick_start = Instant::now();

            // 1. Out-of-band emergency stop.
            if self.emergency_flag.swap(false, Ordering::AcqRel) {
                self.engine.raise_emergency();
            }

            // 2. Drain the intent channel.
            self.drain_command_channel();

            // 3. Execute the tick and answer the batches it applied.
            let result = self.engine.execute_tick();
            for mut pending in self.pending.drain(..) {
                pending.receipts.extend(result.receipts_for(pending.batch));
                pending.receipts.sort_by_key(|r| r.command_index);
                // The submitter may have given up waiting.
                let _ = pending.reply.send(pending.receipts);
            }

            // 4. Publish.
            self.ring.push(self.engine.shared_snapshot());

            // 5. Sleep for the remaining budget; shutdown unparks us.
            let elapsed = tick_start.elapsed();
            match self.tick_budget.checked_sub(elapsed) {
                Some(remaining) => std::thread::park_timeout(remaining),
                None => debug!(
                    elapsed_us = elapsed.as_micros() as u64,
                    "tick overran its budget"
                ),
            }
        }

        self.engine.shutdown_power();
        // Batches that raced the shutdown are refused by the engine.
        self.drain_command_channel();
        for pending in self.pending.drain(..) {
            let _ = pending.reply.send(pending.receipts);
        }
        self.ring.push(self.engine.shared_snapshot());
        info!(tick = self.engine.current_tick().0, "tick thread stopped");

        self.tick_stopped.store(true, Ordering::Release);
        self.engine
    }

    fn drain_command_channel(&mut self) {
        while let Ok(batch) = self.cmd_rx.try_recv() {
            let submission = self.engine.submit_intents(batch.intents);
            let receipts = submission
                .receipts
                .into_iter()
                .filter(|r| !r.accepted)
                .collect();
            self.pending.push(PendingReply {
                batch: submission.batch,
                receipts,
                reply: batch.reply,
            });
        }
    }
}
