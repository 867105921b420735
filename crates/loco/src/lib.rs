//! Loco: train control for the museum model railway.
//!
//! Facade over the loco sub-crates. Depend on `loco` alone unless you
//! only need the identifier types.
//!
//! # Quick start
//!
//! ```rust
//! use loco::prelude::*;
//! use loco::track::{SegmentConfig, TopologyConfig};
//!
//! let config = ControlConfig {
//!     engine: EngineConfig::default(),
//!     safety: SafetyConfig::default(),
//!     topology: TopologyConfig {
//!         segments: vec![SegmentConfig::new("S1"), SegmentConfig::new("S2")],
//!         links: vec![["S1".into(), "S2".into()]],
//!         switches: Vec::new(),
//!     },
//!     trains: vec![TrainConfig {
//!         name: "A".into(),
//!         label: None,
//!         speeds: (0..15).map(|i| f64::from(i) * 10.0).collect(),
//!         acceleration: 50.0,
//!         deceleration: None,
//!         max_speed: None,
//!         checklist: Vec::new(),
//!         start: vec!["S1".into()],
//!     }],
//!     rounds: Vec::new(),
//! };
//! let mut ctl = LockstepController::new(
//!     config,
//!     ModeFlags::simulation(),
//!     Box::new(loco::engine::FixedClock(Default::default())),
//!     Box::new(loco::engine::NullSink),
//! )
//! .unwrap();
//! let step = ctl.step_sync(vec![Intent::power_on(TrainId(0))]);
//! assert!(step.receipts[0].accepted);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `loco-core` | IDs, intents, receipts, rejection reasons |
//! | [`track`] | `loco-track` | Topology, switches, conflict resolver |
//! | [`engine`] | `loco-engine` | Tick engine, scheduler, lockstep and realtime controllers |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Identifiers, intents, and rejection types (`loco-core`).
pub use loco_core as types;

/// Track topology and the conflict resolver (`loco-track`).
///
/// [`track::ConflictResolver`] decides every power-on and switch throw.
pub use loco_track as track;

/// The control engine (`loco-engine`).
///
/// [`engine::LockstepController`] for tests and simulation,
/// [`engine::RealtimeController`] for running the layout.
pub use loco_engine as engine;

/// Common imports.
///
/// ```rust
/// use loco::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use loco_core::{
        Intent, IntentPayload, Receipt, Rejection, RoundKind, SegmentId, SwitchId, SwitchPosition,
        TrainId, TrainPhase,
    };

    // Configuration
    pub use loco_engine::{
        ControlConfig, EngineConfig, ModeFlags, RoundConfig, SafetyConfig, TrainConfig,
    };

    // Engine
    pub use loco_engine::{
        ControlSnapshot, LockstepController, OpeningGate, RealtimeController, SignalSink,
        StepResult,
    };
}
