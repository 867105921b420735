//! The shipped demo layout loads and runs through the facade.

use chrono::NaiveTime;
use loco::engine::{FixedClock, NullSink, SchedulerPhase};
use loco::prelude::*;

const DEMO: &str = include_str!("../../../demos/museum.toml");

fn controller(flags: ModeFlags) -> LockstepController {
    let config = ControlConfig::from_toml_str(DEMO).unwrap();
    LockstepController::new(
        config,
        flags,
        Box::new(FixedClock(NaiveTime::from_hms_opt(10, 30, 0).unwrap())),
        Box::new(NullSink),
    )
    .unwrap()
}

#[test]
fn demo_layout_is_valid() {
    let config = ControlConfig::from_toml_str(DEMO).unwrap();
    assert_eq!(config.trains.len(), 3);
    assert_eq!(config.rounds.len(), 4);
    let flags = ModeFlags {
        opening: true,
        round: Some(RoundKind::Outside),
        ..ModeFlags::default()
    };
    config.validate_flags(&flags).unwrap();
}

#[test]
fn demo_regular_round_runs_without_conflict() {
    let mut ctl = controller(ModeFlags::simulation());
    let snap = ctl.run_for(1);
    assert_eq!(snap.round, Some(RoundKind::Regular));
    assert_eq!(snap.scheduler, SchedulerPhase::Running);
    assert!(snap.trains[1].label.starts_with("RB 14"));

    for _ in 0..2000 {
        ctl.run_for(1);
        assert!(ctl.engine().state().find_violation().is_none());
    }
    assert!(ctl.snapshot().trains[1].distance_mm > 0.0);
}

#[test]
fn steam_engine_needs_its_checklist() {
    let mut ctl = controller(ModeFlags::simulation());
    let step = ctl.step_sync(vec![Intent::power_on(TrainId(2))]);
    assert!(!step.receipts[0].accepted);
    assert!(!step.snapshot.trains[2].power_on_permitted);
}
