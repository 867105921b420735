//! The realtime controller on its own tick thread.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use loco_core::{Intent, Rejection, TrainPhase};
use loco_engine::{ControlSnapshot, ModeFlags, RealtimeController, SubmitError};
use loco_test_utils::fixtures::{museum_config, museum_config_with_rounds, A, B};
use loco_test_utils::{ManualClock, RecordingSink};

fn start(flags: ModeFlags) -> (RealtimeController, RecordingSink) {
    let mut config = museum_config();
    config.engine.tick_rate_hz = 50.0;
    let sink = RecordingSink::new();
    let ctl = RealtimeController::new(
        config,
        flags,
        Box::new(ManualClock::at(10, 0)),
        Box::new(sink.clone()),
    )
    .unwrap();
    (ctl, sink)
}

fn wait_for(ctl: &RealtimeController, pred: impl Fn(&ControlSnapshot) -> bool) -> Arc<ControlSnapshot> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(snap) = ctl.latest_snapshot() {
            if pred(&snap) {
                return snap;
            }
        }
        assert!(Instant::now() < deadline, "condition not reached within 2s");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn concurrent_submitters_get_their_own_receipts() {
    let (ctl, _) = start(ModeFlags::default());
    let ctl = Arc::new(ctl);
    let handles: Vec<_> = [A, B]
        .into_iter()
        .map(|train| {
            let ctl = Arc::clone(&ctl);
            thread::spawn(move || {
                ctl.submit_intents(vec![Intent::power_on(train), Intent::set_speed(train, 20.0)])
            })
        })
        .collect();
    for handle in handles {
        let receipts = handle.join().unwrap().unwrap();
        assert_eq!(receipts.len(), 2);
        assert!(receipts.iter().all(|r| r.accepted));
        assert_eq!(receipts[0].command_index, 0);
        assert_eq!(receipts[1].command_index, 1);
    }
    let snap = wait_for(&ctl, |s| s.trains[0].speed == 20.0 && s.trains[1].speed == 20.0);
    assert_eq!(snap.trains[0].phase, TrainPhase::PoweredOn);
}

#[test]
fn emergency_stop_from_another_thread() {
    let (ctl, _) = start(ModeFlags::default());
    ctl.submit_intents(vec![Intent::power_on(A), Intent::set_speed(A, 50.0)])
        .unwrap();
    let ctl = Arc::new(ctl);
    {
        let ctl = Arc::clone(&ctl);
        thread::spawn(move || ctl.emergency_stop()).join().unwrap();
    }
    let snap = wait_for(&ctl, |s| s.halted);
    assert_eq!(snap.trains[0].phase, TrainPhase::PoweredOff);

    let receipts = ctl.submit_intents(vec![Intent::power_on(A)]).unwrap();
    assert_eq!(receipts[0].reason, Some(Rejection::EmergencyHalted));
}

#[test]
fn shutdown_cuts_track_power() {
    let (mut ctl, sink) = start(ModeFlags::default());
    ctl.submit_intents(vec![Intent::power_on(A), Intent::set_speed(A, 30.0)])
        .unwrap();
    wait_for(&ctl, |s| s.trains[0].speed == 30.0);
    assert!(!sink.powered().is_empty());

    let report = ctl.shutdown();
    assert!(report.tick_joined);
    let last = ctl.latest_snapshot().unwrap();
    assert_eq!(last.trains[0].phase, TrainPhase::PoweredOff);
    let segment = last.trains[0].segments[0];
    let final_level = sink.commands().into_iter().rev().find_map(|c| match c {
        loco_engine::SignalCommand::Power { segment: s, level } if s == segment => Some(level),
        _ => None,
    });
    assert_eq!(final_level, Some(None));
    assert_eq!(
        ctl.submit_intents(vec![Intent::power_on(B)]),
        Err(SubmitError::Shutdown)
    );
}

#[test]
fn opening_gate_confirmed_from_the_operator_thread() {
    let mut config = museum_config_with_rounds();
    config.engine.tick_rate_hz = 50.0;
    let flags = ModeFlags {
        opening: true,
        ..ModeFlags::simulation()
    };
    let ctl = RealtimeController::new(
        config,
        flags,
        Box::new(ManualClock::at(10, 0)),
        Box::new(RecordingSink::new()),
    )
    .unwrap();
    wait_for(&ctl, |s| {
        s.scheduler == loco_engine::SchedulerPhase::AwaitingConfirmation
    });
    ctl.opening_gate().confirm();
    let snap = wait_for(&ctl, |s| s.round == Some(loco_core::RoundKind::Regular));
    assert!(snap.trains[0].visible);
}
