//! Track topology and conflict resolution for the loco train control engine.
//!
//! The [`Topology`] is a static graph of segments and switches loaded once
//! from a [`TopologyConfig`]. [`SwitchStates`] holds the live switch
//! positions, and the [`ConflictResolver`] decides whether a switch change
//! or a power claim is safe given the claims of every train.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod conflict;
pub mod error;
pub mod switch;
pub mod topology;

pub use config::{SegmentConfig, SwitchConfig, TopologyConfig};
pub use conflict::{Claim, ConflictResolver, SwitchGrant, SwitchRequest, Violation};
pub use error::TopologyError;
pub use switch::SwitchStates;
pub use topology::Topology;
