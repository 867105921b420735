//! Safety behaviour of the museum layout driven through lockstep ticks.

use loco_core::{
    ConflictReason, Intent, IntentPayload, Precondition, Rejection, SegmentId, SwitchId,
    SwitchPosition, TrainPhase,
};
use loco_engine::{ModeFlags, SignalCommand};
use loco_test_utils::fixtures::{hardware, lockstep, museum_config, A, B, C};

const W1: SwitchId = SwitchId(0);
const S1: SegmentId = SegmentId(1);

fn is_precondition(r: &Option<Rejection>, want: fn(&Precondition) -> bool) -> bool {
    matches!(r, Some(Rejection::PreconditionFailed { reason, .. }) if want(reason))
}

#[test]
fn switch_throw_into_occupied_group_is_impossible() {
    let (mut ctl, _, _) = lockstep(museum_config(), hardware());
    let step = ctl.step_sync(vec![Intent::power_on(A)]);
    assert!(step.receipts[0].accepted);

    let step = ctl.step_sync(vec![Intent::throw_switch(B, W1, SwitchPosition::Diverging)]);
    let reason = step.receipts[0].reason.clone().unwrap();
    assert!(matches!(
        reason,
        Rejection::Impossible(ConflictReason::GroupOccupied { holder, .. }) if holder == A
    ));
    assert_eq!(reason.to_string(), "impossible: group G1 occupied");
    assert_eq!(
        step.snapshot.switch_position("W1"),
        Some(SwitchPosition::Straight)
    );
}

#[test]
fn emergency_stop_cuts_everything_within_one_tick() {
    let (mut ctl, _, _) = lockstep(museum_config(), hardware());
    ctl.step_sync(vec![Intent::power_on(A), Intent::power_on(B)]);
    ctl.step_sync(vec![Intent::set_speed(A, 60.0), Intent::set_speed(B, -30.0)]);
    ctl.run_for(5);

    assert_eq!(ctl.snapshot().trains[2].phase, TrainPhase::ChecklistPending);

    let step = ctl.step_sync(vec![Intent::emergency_stop()]);
    assert!(step.snapshot.halted);
    // Powered, ready, and pending trains alike.
    assert!(step
        .snapshot
        .trains
        .iter()
        .all(|t| t.phase == TrainPhase::PoweredOff));
    assert!(step.snapshot.trains.iter().all(|t| t.speed == 0.0));

    for _ in 0..3 {
        let step = ctl.step_sync(vec![Intent::power_on(A)]);
        assert_eq!(step.receipts[0].reason, Some(Rejection::EmergencyHalted));
    }

    // Cleared: trains are re-armed but the power-on cooldown still applies.
    let step = ctl.step_sync(vec![Intent::clear_emergency(), Intent::power_on(A)]);
    assert!(step.receipts[0].accepted);
    assert!(is_precondition(&step.receipts[1].reason, |p| matches!(
        p,
        Precondition::Cooldown { .. }
    )));
    ctl.run_for(60);
    let step = ctl.step_sync(vec![Intent::power_on(A)]);
    assert!(step.receipts[0].accepted);
}

#[test]
fn emergency_stop_outranks_earlier_intents_in_the_same_tick() {
    let (mut ctl, _, _) = lockstep(museum_config(), hardware());
    let step = ctl.step_sync(vec![
        Intent::power_on(A),
        Intent::power_on(B),
        Intent::emergency_stop(),
    ]);
    assert_eq!(step.receipts[0].reason, Some(Rejection::EmergencyHalted));
    assert_eq!(step.receipts[1].reason, Some(Rejection::EmergencyHalted));
    assert!(step.receipts[2].accepted);
}

#[test]
fn incomplete_checklist_refuses_power_in_every_mode() {
    let modes = [
        hardware(),
        ModeFlags {
            debug: true,
            ..ModeFlags::default()
        },
        ModeFlags::simulation(),
        ModeFlags {
            show: true,
            ..ModeFlags::default()
        },
    ];
    for flags in modes {
        let (mut ctl, _, _) = lockstep(museum_config(), flags);
        let step = ctl.step_sync(vec![Intent::power_on(C)]);
        assert!(
            is_precondition(&step.receipts[0].reason, |p| matches!(
                p,
                Precondition::ChecklistIncomplete { open: 2 }
            )),
            "{flags:?}: {:?}",
            step.receipts[0]
        );
        assert!(!step.snapshot.trains[2].power_on_permitted);
    }
}

#[test]
fn ticking_the_checklist_makes_the_train_ready() {
    let (mut ctl, _, _) = lockstep(museum_config(), hardware());
    let step = ctl.step_sync(vec![Intent::update_checklist(C, "water", true)]);
    assert_eq!(step.snapshot.trains[2].phase, TrainPhase::ChecklistPending);

    let step = ctl.step_sync(vec![
        Intent::update_checklist(C, "coal", true),
        Intent::update_checklist(C, "sand", true),
    ]);
    assert!(matches!(
        step.receipts[1].reason,
        Some(Rejection::UnknownChecklistItem { .. })
    ));
    assert_eq!(step.snapshot.trains[2].phase, TrainPhase::Ready);
    assert!(step.snapshot.trains[2].power_on_permitted);

    let step = ctl.step_sync(vec![Intent::power_on(C)]);
    assert!(step.receipts[0].accepted);
}

#[test]
fn debug_mode_ignores_off_time() {
    let (mut ctl, clock, _) = lockstep(museum_config(), hardware());
    clock.set(12, 10);
    let step = ctl.step_sync(vec![Intent::power_on(A)]);
    assert!(is_precondition(&step.receipts[0].reason, |p| matches!(
        p,
        Precondition::OffTime
    )));
    assert!(step.snapshot.off_time);
    assert_eq!(
        step.snapshot.trains[0].permit_reason.as_deref(),
        Some("train 0: off-time")
    );

    let debug = ModeFlags {
        debug: true,
        ..ModeFlags::default()
    };
    let (mut ctl, clock, _) = lockstep(museum_config(), debug);
    clock.set(12, 10);
    let step = ctl.step_sync(vec![Intent::power_on(A)]);
    assert!(step.receipts[0].accepted);
    assert!(!step.snapshot.off_time);
}

#[test]
fn off_time_ramps_idle_trains_down() {
    let (mut ctl, clock, _) = lockstep(museum_config(), hardware());
    clock.set(11, 59);
    ctl.step_sync(vec![Intent::power_on(A), Intent::power_on(B)]);
    ctl.step_sync(vec![Intent::set_speed(B, 30.0)]);

    clock.set(12, 0);
    let snap = ctl.run_for(1);
    assert_eq!(snap.trains[0].phase, TrainPhase::Stopping);
    assert_eq!(snap.trains[1].phase, TrainPhase::PoweredOn);

    let snap = ctl.run_for(1);
    assert_eq!(snap.trains[0].phase, TrainPhase::Ready);
    assert!(!snap.trains[0].power_on_permitted);
}

#[test]
fn repeated_set_speed_commits_the_same_target() {
    let (mut once, _, _) = lockstep(museum_config(), hardware());
    let (mut twice, _, _) = lockstep(museum_config(), hardware());
    once.step_sync(vec![Intent::power_on(A)]);
    twice.step_sync(vec![Intent::power_on(A)]);

    let a = once.step_sync(vec![Intent::set_speed(A, 45.0)]);
    twice.step_sync(vec![Intent::set_speed(A, 45.0)]);
    let b = twice.step_sync(vec![Intent::set_speed(A, 45.0)]);
    assert_eq!(a.snapshot.trains[0].target_speed, 45.0);
    assert_eq!(b.snapshot.trains[0].target_speed, 45.0);

    // Clamped to the top of the speed table.
    let c = once.step_sync(vec![Intent::set_speed(A, 500.0)]);
    assert_eq!(c.snapshot.trains[0].target_speed, 140.0);
}

#[test]
fn named_speed_limit_reclamps_the_target() {
    let (mut ctl, _, _) = lockstep(museum_config(), hardware());
    ctl.step_sync(vec![Intent::power_on(A), Intent::set_speed(A, 100.0)]);
    let step = ctl.step_sync(vec![Intent::new(IntentPayload::SetSpeedLimit {
        train: None,
        name: "visitors".into(),
        limit: Some(30.0),
    })]);
    assert_eq!(step.snapshot.trains[0].target_speed, 30.0);
    let step = ctl.step_sync(vec![Intent::set_speed(A, -80.0)]);
    assert_eq!(step.snapshot.trains[0].target_speed, -30.0);
    assert!(step.snapshot.trains[0].label.starts_with("◀ "));
}

#[test]
fn show_mode_is_read_only_and_silent() {
    let show = ModeFlags {
        show: true,
        ..ModeFlags::default()
    };
    let (mut ctl, _, sink) = lockstep(museum_config(), show);
    let step = ctl.step_sync(vec![
        Intent::power_on(A),
        Intent::set_speed(A, 20.0),
        Intent::throw_switch(B, W1, SwitchPosition::Diverging),
        Intent::power_off(B),
    ]);
    assert_eq!(step.receipts[0].reason, Some(Rejection::ReadOnly));
    assert_eq!(step.receipts[1].reason, Some(Rejection::ReadOnly));
    assert_eq!(step.receipts[2].reason, Some(Rejection::ReadOnly));
    assert!(step.receipts[3].accepted);
    assert!(step.snapshot.read_only);
    assert!(step.snapshot.trains.iter().all(|t| t.admin_disabled));
    assert!(sink.is_empty());

    let step = ctl.step_sync(vec![Intent::emergency_stop()]);
    assert!(step.receipts[0].accepted);
    assert!(step.snapshot.halted);
}

#[test]
fn hardware_receives_only_changes() {
    let (mut ctl, _, sink) = lockstep(museum_config(), hardware());
    ctl.step_sync(vec![Intent::power_on(A), Intent::set_speed(A, 30.0)]);
    // Six segments and one switch on the first tick.
    assert_eq!(sink.len(), 7);
    ctl.run_for(10);
    assert!(sink.powered().contains(&(S1, 3)));

    sink.clear();
    ctl.run_for(5);
    assert!(sink.is_empty());

    ctl.step_sync(vec![Intent::power_off(A)]);
    ctl.run_for(10);
    assert!(sink
        .commands()
        .contains(&SignalCommand::Power { segment: S1, level: None }));
}

#[test]
fn power_on_alone_energises_the_segment() {
    let (mut ctl, _, sink) = lockstep(museum_config(), hardware());
    ctl.run_for(1);
    sink.clear();

    let step = ctl.step_sync(vec![Intent::power_on(A)]);
    assert!(step.receipts[0].accepted);
    assert_eq!(step.snapshot.trains[0].speed, 0.0);
    assert_eq!(
        sink.commands(),
        vec![SignalCommand::Power {
            segment: S1,
            level: Some(0)
        }]
    );

    // Creeping below the first speed step keeps the power on.
    sink.clear();
    ctl.step_sync(vec![Intent::set_speed(A, 4.0)]);
    ctl.run_for(5);
    assert!(!sink
        .commands()
        .contains(&SignalCommand::Power { segment: S1, level: None }));
}

#[test]
fn emergency_stop_withdraws_trains_that_were_never_powered() {
    let (mut ctl, _, _) = lockstep(museum_config(), hardware());
    let snap = ctl.run_for(1);
    assert_eq!(snap.trains[0].phase, TrainPhase::Ready);
    assert_eq!(snap.trains[2].phase, TrainPhase::ChecklistPending);

    let step = ctl.step_sync(vec![Intent::emergency_stop()]);
    let phases: Vec<_> = step.snapshot.trains.iter().map(|t| t.phase).collect();
    assert_eq!(phases, vec![TrainPhase::PoweredOff; 3]);

    let step = ctl.step_sync(vec![Intent::clear_emergency()]);
    assert_eq!(step.snapshot.trains[0].phase, TrainPhase::Ready);
    assert_eq!(step.snapshot.trains[2].phase, TrainPhase::ChecklistPending);
}

#[test]
fn virtual_mode_sends_nothing() {
    let (mut ctl, _, sink) = lockstep(museum_config(), ModeFlags::simulation());
    ctl.step_sync(vec![Intent::power_on(A), Intent::set_speed(A, 30.0)]);
    ctl.run_for(10);
    assert_eq!(ctl.snapshot().trains[0].speed, 30.0);
    assert!(sink.is_empty());
}

#[test]
fn pause_refuses_power_until_resumed() {
    let (mut ctl, _, _) = lockstep(museum_config(), hardware());
    ctl.step_sync(vec![Intent::power_on(A)]);
    let step = ctl.step_sync(vec![Intent::new(IntentPayload::Pause)]);
    assert!(step.snapshot.paused);
    assert!(!step.snapshot.trains[0].phase.holds_claim());

    let step = ctl.step_sync(vec![Intent::power_on(B)]);
    assert_eq!(step.receipts[0].reason, Some(Rejection::Paused));

    let step = ctl.step_sync(vec![Intent::new(IntentPayload::Resume), Intent::power_on(B)]);
    assert!(step.receipts[1].accepted);
}

#[test]
fn locked_switches_refuse_every_throw() {
    let (mut ctl, _, _) = lockstep(museum_config(), hardware());
    let step = ctl.step_sync(vec![
        Intent::new(IntentPayload::LockSwitches { locked: true }),
        Intent::throw_switch(B, W1, SwitchPosition::Diverging),
    ]);
    assert_eq!(
        step.receipts[1].reason,
        Some(Rejection::Impossible(ConflictReason::Locked))
    );
    assert!(step.snapshot.switches_locked);
}
