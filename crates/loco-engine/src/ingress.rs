//! Bounded intent queue with deterministic ordering.
//!
//! [`IngressQueue`] buffers intents between submission and tick execution.
//! It enforces a capacity limit, assigns monotonic arrival sequence
//! numbers, tags every accepted intent with the batch it arrived in, and
//! sorts intents into a deterministic order for the tick engine.
//!
//! # Ordering
//!
//! Intents are sorted by the composite key:
//! `(priority_class, source_id|MAX, source_seq|MAX, arrival_seq)`
//!
//! This ensures:
//! - Emergency stops (class 0) are applied before anything else.
//! - Within a priority class, source-keyed intents sort before anonymous ones.
//! - Intents from the same source are applied in sequence order.
//! - Anonymous intents are applied in arrival order.

use std::collections::VecDeque;

use loco_core::{Intent, Receipt, Rejection};

/// An intent paired with where it came from.
///
/// The tick engine uses `batch` and `command_index` to route the final
/// receipt back to the submitter after priority reordering.
#[derive(Debug)]
pub struct DrainedIntent {
    /// The intent to apply.
    pub intent: Intent,
    /// Index of the intent within its submitted batch.
    pub command_index: usize,
    /// Number of the `submit()` call that delivered the intent.
    pub batch: u64,
}

struct QueueEntry {
    intent: Intent,
    command_index: usize,
    batch: u64,
}

/// Bounded intent queue feeding the tick engine.
pub struct IngressQueue {
    queue: VecDeque<QueueEntry>,
    capacity: usize,
    next_arrival_seq: u64,
    next_batch: u64,
}

impl IngressQueue {
    /// Create a new queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "IngressQueue capacity must be at least 1");
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            next_arrival_seq: 0,
            next_batch: 0,
        }
    }

    /// Submit a batch of intents.
    ///
    /// Returns the batch number and one [`Receipt`] per input intent.
    /// Intents are accepted in order until the queue is full; the rest
    /// receive `QueueFull` receipts. With `shutting_down` set every intent
    /// is rejected with `ShuttingDown`.
    ///
    /// Arrival sequence numbers come from a counter that persists across
    /// calls and overwrite whatever the caller set on `Intent::arrival_seq`.
    pub fn submit(&mut self, intents: Vec<Intent>, shutting_down: bool) -> (u64, Vec<Receipt>) {
        let batch = self.next_batch;
        self.next_batch += 1;
        let mut receipts = Vec::with_capacity(intents.len());

        for (i, mut intent) in intents.into_iter().enumerate() {
            if shutting_down {
                receipts.push(Receipt::rejected(i, Rejection::ShuttingDown));
                continue;
            }
            if self.queue.len() >= self.capacity {
                receipts.push(Receipt::rejected(i, Rejection::QueueFull));
                continue;
            }

            intent.arrival_seq = self.next_arrival_seq;
            self.next_arrival_seq += 1;
            self.queue.push_back(QueueEntry {
                intent,
                command_index: i,
                batch,
            });
            receipts.push(Receipt::queued(i));
        }

        (batch, receipts)
    }

    /// Drain the queue in deterministic order.
    pub fn drain(&mut self) -> Vec<DrainedIntent> {
        let mut drained: Vec<DrainedIntent> = self
            .queue
            .drain(..)
            .map(|e| DrainedIntent {
                intent: e.intent,
                command_index: e.command_index,
                batch: e.batch,
            })
            .collect();

        drained.sort_unstable_by_key(|d| {
            (
                d.intent.priority_class,
                d.intent.source_id.unwrap_or(u64::MAX),
                d.intent.source_seq.unwrap_or(u64::MAX),
                d.intent.arrival_seq,
            )
        });
        drained
    }

    /// Number of intents currently buffered.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of intents this queue can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
