//! The museum layout used across the engine's integration tests.
//!
//! ```text
//!  depot ── yard ── S2 ─┐
//!                       W1 ── trunk ── S3 (G1)
//!            S1 (G1) ───┘
//! ```
//!
//! S1 and S3 share conflict group G1. Train A starts on S1, B on the
//! trunk, C in the depot. C has a two-item checklist; A and B have none.

use loco_core::{RoundKind, SwitchPosition, TrainId};
use loco_engine::{
    CeremonyConfig, ControlConfig, EngineConfig, LegConfig, LockstepController, ModeFlags,
    RoundConfig, SafetyConfig, SwitchSetting, TrainConfig, WindowConfig,
};
use loco_track::{SegmentConfig, SwitchConfig, TopologyConfig};

use crate::{hm, ManualClock, RecordingSink};

pub const A: TrainId = TrainId(0);
pub const B: TrainId = TrainId(1);
pub const C: TrainId = TrainId(2);

pub fn museum_layout() -> TopologyConfig {
    TopologyConfig {
        segments: vec![
            SegmentConfig::new("trunk"),
            SegmentConfig::new("S1").in_group("G1"),
            SegmentConfig::new("S2"),
            SegmentConfig::new("S3").in_group("G1"),
            SegmentConfig::new("yard"),
            SegmentConfig::new("depot"),
        ],
        links: vec![
            ["trunk".into(), "S3".into()],
            ["S2".into(), "yard".into()],
            ["yard".into(), "depot".into()],
        ],
        switches: vec![SwitchConfig {
            name: "W1".into(),
            trunk: "trunk".into(),
            straight: "S2".into(),
            diverging: "S1".into(),
            initial: SwitchPosition::Straight,
        }],
    }
}

pub fn train(name: &str, start: &str, checklist: &[&str]) -> TrainConfig {
    TrainConfig {
        name: name.into(),
        label: None,
        speeds: (0..15).map(|i| f64::from(i) * 10.0).collect(),
        acceleration: 50.0,
        deceleration: None,
        max_speed: None,
        checklist: checklist.iter().map(|s| s.to_string()).collect(),
        start: vec![start.into()],
    }
}

/// Lunch break off-time from 12:00 to 12:30.
pub fn lunch_break() -> SafetyConfig {
    SafetyConfig {
        off_time: vec![WindowConfig {
            start: hm(12, 0),
            end: hm(12, 30),
        }],
        ..SafetyConfig::default()
    }
}

/// Three trains, no rounds: every train is armed for manual operation.
pub fn museum_config() -> ControlConfig {
    ControlConfig {
        engine: EngineConfig::default(),
        safety: lunch_break(),
        topology: museum_layout(),
        trains: vec![
            train("A", "S1", &[]),
            train("B", "trunk", &[]),
            train("C", "depot", &["water", "coal"]),
        ],
        rounds: Vec::new(),
    }
}

pub fn leg(train: &str, target: &str, switches: &[(&str, SwitchPosition)]) -> LegConfig {
    LegConfig {
        train: train.into(),
        target: target.into(),
        speed: 40.0,
        travel_s: 2.0,
        pause_s: 1.0,
        pause_jitter_s: 0.0,
        switches: switches
            .iter()
            .map(|(switch, position)| SwitchSetting {
                switch: switch.to_string(),
                position: *position,
            })
            .collect(),
    }
}

/// Regular and fast service for A and B: B clears the trunk to the yard,
/// A runs S1 → trunk → S3, B returns to S2. The outside round takes C
/// from the depot to the yard and back. The opening ceremony places every
/// train on a marker.
pub fn museum_rounds() -> Vec<RoundConfig> {
    let service = |kind, speed: f64| RoundConfig {
        kind,
        trains: vec!["A".into(), "B".into()],
        off_time: Vec::new(),
        legs: vec![
            leg("B", "yard", &[("W1", SwitchPosition::Straight)]),
            leg("A", "trunk", &[("W1", SwitchPosition::Diverging)]),
            leg("A", "S3", &[]),
            leg("B", "S2", &[]),
        ]
        .into_iter()
        .map(|l| LegConfig { speed, ..l })
        .collect(),
        repeat: 1,
        ceremony: Vec::new(),
    };
    vec![
        service(RoundKind::Regular, 40.0),
        service(RoundKind::Fast, 80.0),
        RoundConfig {
            kind: RoundKind::Outside,
            trains: vec!["C".into()],
            off_time: Vec::new(),
            legs: vec![leg("C", "yard", &[]), leg("C", "depot", &[])],
            repeat: 1,
            ceremony: Vec::new(),
        },
        RoundConfig {
            kind: RoundKind::Opening,
            trains: vec!["A".into(), "B".into(), "C".into()],
            off_time: Vec::new(),
            legs: Vec::new(),
            repeat: 1,
            ceremony: vec![
                CeremonyConfig {
                    train: "A".into(),
                    segments: vec!["S3".into()],
                },
                CeremonyConfig {
                    train: "B".into(),
                    segments: vec!["S2".into()],
                },
                CeremonyConfig {
                    train: "C".into(),
                    segments: vec!["depot".into()],
                },
            ],
        },
    ]
}

pub fn museum_config_with_rounds() -> ControlConfig {
    ControlConfig {
        rounds: museum_rounds(),
        ..museum_config()
    }
}

/// Lockstep controller at 10:00 with a recording sink.
pub fn lockstep(
    config: ControlConfig,
    flags: ModeFlags,
) -> (LockstepController, ManualClock, RecordingSink) {
    let clock = ManualClock::at(10, 0);
    let sink = RecordingSink::new();
    let ctl = LockstepController::new(
        config,
        flags,
        Box::new(clock.clone()),
        Box::new(sink.clone()),
    )
    .unwrap_or_else(|e| panic!("museum fixture rejected: {e}"));
    (ctl, clock, sink)
}

/// Hardware attached, timers real.
pub fn hardware() -> ModeFlags {
    ModeFlags::default()
}
