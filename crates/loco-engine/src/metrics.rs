//! Per-tick timing and counters.

/// Timing and counters collected during a single tick.
///
/// Durations are in microseconds. Counters named `*_rejections` are
/// cumulative over the engine's lifetime; the rest describe one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire tick.
    pub total_us: u64,
    /// Time spent applying drained intents.
    pub command_processing_us: u64,
    /// Time spent in the round scheduler.
    pub scheduler_us: u64,
    /// Time spent computing and sending hardware signals.
    pub signal_us: u64,
    /// Time spent building the snapshot.
    pub snapshot_publish_us: u64,
    /// Intents applied successfully this tick.
    pub intents_applied: u32,
    /// Intents rejected while being applied this tick.
    pub intents_rejected: u32,
    /// Hardware commands sent this tick.
    pub signals_emitted: u32,
    /// Cumulative number of submissions refused because the queue was full.
    pub queue_full_rejections: u64,
}
