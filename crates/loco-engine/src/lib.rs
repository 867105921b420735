//! Train control engine for the loco museum railway.
//!
//! Owns the live state of every train, switch, and round, applies
//! operator intents at fixed tick boundaries, keeps trains from colliding,
//! and tells the track hardware what changed. Runs either in lockstep
//! ([`LockstepController`]) or on its own tick thread
//! ([`RealtimeController`]).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod egress;
pub mod gate;
pub mod ingress;
pub mod lockstep;
pub mod metrics;
pub mod realtime;
pub mod ring;
pub mod round;
pub mod safety;
pub mod signal;
pub mod speed;
pub mod state;
pub mod tick;
mod tick_thread;
pub mod train;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    CeremonyConfig, ConfigError, ControlConfig, EngineConfig, LegConfig, ModeFlags,
    OperatingHoursConfig, RoundConfig, RoundStartConfig, SafetyConfig, SwitchSetting,
    TrainConfig, WindowConfig, SPEED_STEPS,
};
pub use egress::{ControlSnapshot, SwitchView, TrainView};
pub use gate::OpeningGate;
pub use ingress::{DrainedIntent, IngressQueue};
pub use lockstep::{LockstepController, StepResult};
pub use metrics::StepMetrics;
pub use realtime::{RealtimeController, ShutdownReport, SubmitError};
pub use ring::SnapshotRing;
pub use round::{LegPlan, LegStage, RoundPlan, RoundScheduler, SchedulerPhase};
pub use safety::{OffTimeWindow, RoundStartSlot, SafetyManager};
pub use signal::{LoggingSink, NullSink, SignalCommand, SignalSink};
pub use speed::SpeedController;
pub use state::RailwayState;
pub use tick::{Submission, TickEngine, TickResult};
pub use train::{Advance, SpeedTable, TrainState};
