//! Rejection taxonomy for control intents.
//!
//! A [`Rejection`] never aborts a tick. It is returned in the intent's
//! [`Receipt`](crate::Receipt), logged, and mirrored as reason text in the
//! published snapshot.

use thiserror::Error;

use crate::id::{GroupId, SegmentId, SwitchId, TrainId};
use crate::intent::{RoundKind, TrainPhase};

/// Why an intent was not applied.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Rejection {
    /// A safety precondition for the operation does not hold.
    #[error("train {train}: {reason}")]
    PreconditionFailed {
        /// The train the intent targeted.
        train: TrainId,
        /// The failing precondition.
        reason: Precondition,
    },
    /// The conflict resolver refused the request.
    #[error("impossible: {0}")]
    Impossible(#[from] ConflictReason),
    /// The emergency-stop latch is set.
    #[error("emergency stop active")]
    EmergencyHalted,
    /// The intent named a train that is not configured.
    #[error("unknown train {0}")]
    UnknownTrain(TrainId),
    /// The checklist item does not exist for this train.
    #[error("train {train}: unknown checklist item '{item}'")]
    UnknownChecklistItem {
        /// The train the intent targeted.
        train: TrainId,
        /// The item name as submitted.
        item: String,
    },
    /// The operation is not valid in the train's current phase.
    #[error("train {train}: cannot {operation} while {phase}")]
    InvalidTransition {
        /// The train the intent targeted.
        train: TrainId,
        /// Phase at the time the intent was applied.
        phase: TrainPhase,
        /// Name of the rejected operation.
        operation: &'static str,
    },
    /// The controller runs in show mode and accepts no control intents.
    #[error("controller is read-only")]
    ReadOnly,
    /// The master pause is active.
    #[error("control is paused")]
    Paused,
    /// The ingress queue had no room for the intent.
    #[error("ingress queue full")]
    QueueFull,
    /// The controller is shutting down.
    #[error("controller is shutting down")]
    ShuttingDown,
    /// The intent named a switch that is not configured.
    #[error("unknown switch {0}")]
    UnknownSwitch(SwitchId),
    /// The intent named a segment that is not configured.
    #[error("unknown segment {0}")]
    UnknownSegment(SegmentId),
    /// The requested round is not configured.
    #[error("round '{0}' is not configured")]
    UnknownRound(RoundKind),
}

/// A failed `power_on` precondition.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Precondition {
    /// Admin checklist items are still open.
    #[error("checklist incomplete ({open} open)")]
    ChecklistIncomplete {
        /// Number of unticked items.
        open: usize,
    },
    /// The current time lies inside an off-time window.
    #[error("off-time")]
    OffTime,
    /// Power was cut too recently.
    #[error("cooldown ({remaining_s:.1} s remaining)")]
    Cooldown {
        /// Seconds until power-on is permitted again.
        remaining_s: f64,
    },
}

/// Why the conflict resolver refused a switch change or a power claim.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConflictReason {
    /// Switches are locked by the operator.
    #[error("switches locked")]
    Locked,
    /// Throwing the switch would cut the route under a powered train.
    #[error("would strand train {train} on segment {segment}")]
    StrandsTrain {
        /// The train that would be stranded.
        train: TrainId,
        /// The segment it occupies.
        segment: SegmentId,
    },
    /// Another powered train holds the segment.
    #[error("segment {segment} occupied by train {holder}")]
    SegmentOccupied {
        /// The contested segment.
        segment: SegmentId,
        /// The train holding it.
        holder: TrainId,
    },
    /// Another powered train holds a segment of a shared conflict group.
    #[error("group {group_name} occupied")]
    GroupOccupied {
        /// The contested group.
        group: GroupId,
        /// Configured name of the group.
        group_name: String,
        /// The train holding it.
        holder: TrainId,
    },
    /// The target cannot be reached over the current switch positions.
    #[error("segment {to} not reachable from segment {from}")]
    Unreachable {
        /// Where the train stands.
        from: SegmentId,
        /// Where it should go.
        to: SegmentId,
    },
    /// The request named a switch that is not in the topology.
    #[error("unknown switch {0}")]
    UnknownSwitch(SwitchId),
    /// The request named a segment that is not in the topology.
    #[error("unknown segment {0}")]
    UnknownSegment(SegmentId),
}

impl ConflictReason {
    /// Stable machine-readable code for dashboards and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::StrandsTrain { .. } => "strands_train",
            Self::SegmentOccupied { .. } => "segment_occupied",
            Self::GroupOccupied { .. } => "group_occupied",
            Self::Unreachable { .. } => "unreachable",
            Self::UnknownSwitch(_) => "unknown_switch",
            Self::UnknownSegment(_) => "unknown_segment",
        }
    }

    /// The train whose claim caused the conflict, if any.
    pub fn holder(&self) -> Option<TrainId> {
        match self {
            Self::StrandsTrain { train, .. } => Some(*train),
            Self::SegmentOccupied { holder, .. } | Self::GroupOccupied { holder, .. } => {
                Some(*holder)
            }
            _ => None,
        }
    }
}
