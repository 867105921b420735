//! Core types for the loco train control engine.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! vocabulary shared by the topology, the engine, and any client that
//! talks to a running controller: typed identifiers, control intents and
//! their receipts, and the rejection taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod intent;

pub use error::{ConflictReason, Precondition, Rejection};
pub use id::{GroupId, SegmentId, SegmentList, SwitchId, TickId, TrainId};
pub use intent::{
    Intent, IntentPayload, Receipt, RoundKind, SwitchPosition, TrainPhase, PRIORITY_ADMIN,
    PRIORITY_EMERGENCY, PRIORITY_SCHEDULED,
};
