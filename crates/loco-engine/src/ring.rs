//! Recent control snapshots, shared between the tick thread and readers.
//!
//! The tick thread publishes one [`ControlSnapshot`] per tick. A dashboard
//! that polls slower than the tick rate can catch up on the ticks it
//! missed with [`SnapshotRing::since`] instead of jumping straight to the
//! latest speed values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use loco_core::TickId;

use crate::egress::ControlSnapshot;

// Compile-time assertion: readers on any thread.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SnapshotRing>();
};

/// Slot contents tagged with the publish sequence number.
type Slot = Option<(u64, Arc<ControlSnapshot>)>;

/// Fixed-capacity ring of published snapshots.
///
/// One publisher, any number of readers. Each slot has its own lock so a
/// reader never blocks the tick thread for longer than one `Arc` clone.
pub struct SnapshotRing {
    slots: Vec<Mutex<Slot>>,
    published: AtomicU64,
}

impl SnapshotRing {
    /// Ring holding the last `capacity` snapshots. At least two slots are
    /// kept so the newest snapshot is never the one being overwritten.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.max(2)).map(|_| Mutex::new(None)).collect();
        Self {
            slots,
            published: AtomicU64::new(0),
        }
    }

    fn slot(&self, seq: u64) -> &Mutex<Slot> {
        &self.slots[(seq % self.slots.len() as u64) as usize]
    }

    /// Publish the snapshot of the tick that just ran.
    pub fn push(&self, snapshot: Arc<ControlSnapshot>) {
        let seq = self.published.load(Ordering::Relaxed);
        *self.slot(seq).lock().unwrap_or_else(PoisonError::into_inner) = Some((seq, snapshot));
        self.published.store(seq + 1, Ordering::Release);
    }

    fn read(&self, seq: u64) -> Option<Arc<ControlSnapshot>> {
        let slot = self.slot(seq).lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((tag, snap)) if *tag == seq => Some(Arc::clone(snap)),
            _ => None,
        }
    }

    /// The newest snapshot.
    pub fn latest(&self) -> Option<Arc<ControlSnapshot>> {
        let published = self.published.load(Ordering::Acquire);
        published.checked_sub(1).and_then(|seq| self.read(seq))
    }

    /// Retained snapshots newer than `after`, oldest first.
    pub fn since(&self, after: TickId) -> Vec<Arc<ControlSnapshot>> {
        let published = self.published.load(Ordering::Acquire);
        let oldest = published.saturating_sub(self.slots.len() as u64);
        (oldest..published)
            .filter_map(|seq| self.read(seq))
            .filter(|snap| snap.tick_id > after)
            .collect()
    }

    /// Number of snapshots retained.
    pub fn len(&self) -> usize {
        let published = self.published.load(Ordering::Acquire);
        published.min(self.slots.len() as u64) as usize
    }

    /// Whether nothing has been published yet.
    pub fn is_empty(&self) -> bool {
        self.published.load(Ordering::Acquire) == 0
    }

    /// Total number of snapshots ever published.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }
}
