mod common;

use common::{RecordingCan, RecordingOutputs};
use race_ecu_core::can::{MENU_STATUS_ID, STATE_STATUS_ID};
use race_ecu_core::fault::{FaultCode, Severity};
use race_ecu_core::menu::{MenuIndex, MenuState};
use race_ecu_core::state_machine::{
    transition_allowed, DriveState, FunctionalState, Transition, TransitionRequest, VehicleState,
};
use race_ecu_core::Ecu;

fn reach(ecu: &Ecu, director: &mut impl FnMut(TransitionRequest) -> Transition, target: FunctionalState) {
    match target {
        FunctionalState::Ready | FunctionalState::Boot => {}
        FunctionalState::Driving => {
            director(TransitionRequest::driving(DriveState::Pit));
        }
        FunctionalState::Faulted => {
            director(TransitionRequest::functional(FunctionalState::Faulted));
        }
    }
    assert!(ecu.faults.try_next().is_none());
}

#[test]
fn director_starts_ready() {
    let ecu = Ecu::new();
    assert_eq!(ecu.mode.snapshot(), VehicleState::BOOT);
    let mut outputs = RecordingOutputs::default();
    let mut can = RecordingCan::default();
    let director = ecu.mode.director(&ecu.faults, &mut outputs, &mut can).unwrap();
    assert_eq!(ecu.mode.get_functional_state(), FunctionalState::Ready);
    assert_eq!(director.outputs().pump, Some(false));
    assert_eq!(director.outputs().fault_line, Some(true));
    assert_eq!(director.can().with_id(STATE_STATUS_ID as u32).len(), 1);
}

#[test]
fn only_one_director() {
    let ecu = Ecu::new();
    let mut outputs = (RecordingOutputs::default(), RecordingOutputs::default());
    let mut can = (RecordingCan::default(), RecordingCan::default());
    let first = ecu.mode.director(&ecu.faults, &mut outputs.0, &mut can.0);
    assert!(first.is_some());
    assert!(ecu
        .mode
        .director(&ecu.faults, &mut outputs.1, &mut can.1)
        .is_none());
}

#[test]
fn commits_exactly_the_allowed_transitions() {
    let reachable = [
        FunctionalState::Ready,
        FunctionalState::Driving,
        FunctionalState::Faulted,
    ];
    for from in reachable {
        for to in FunctionalState::ALL {
            let ecu = Ecu::new();
            let mut outputs = RecordingOutputs::default();
            let mut can = RecordingCan::default();
            let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut can).unwrap();
            reach(&ecu, &mut |r| director.apply(r), from);
            let before = ecu.mode.snapshot();
            assert_eq!(before.functional, from);

            let request = TransitionRequest {
                functional: to,
                drive: Some(DriveState::Performance),
            };
            let outcome = director.apply(request);

            if transition_allowed(from, to) {
                assert!(matches!(outcome, Transition::Committed(_)), "{:?} -> {:?}", from, to);
                assert_eq!(ecu.mode.get_functional_state(), to);
                assert!(ecu.faults.try_next().is_none());
            } else {
                assert_eq!(outcome, Transition::Rejected { from, to });
                assert_eq!(ecu.mode.snapshot(), before);
                let fault = ecu.faults.try_next().unwrap();
                assert_eq!(fault.code(), Some(FaultCode::InvalidTransition));
                assert_eq!(fault.severity(), Some(Severity::Defcon5));
            }
        }
    }
}

#[test]
fn leaving_driving_resets_drive_state() {
    for target in [FunctionalState::Ready, FunctionalState::Faulted] {
        let ecu = Ecu::new();
        let mut outputs = RecordingOutputs::default();
        let mut can = RecordingCan::default();
        let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut can).unwrap();

        director.apply(TransitionRequest::driving(DriveState::Efficiency));
        assert_eq!(ecu.mode.get_drive_state(), DriveState::Efficiency);
        assert!(ecu.mode.is_active());

        director.apply(TransitionRequest {
            functional: target,
            drive: Some(DriveState::Performance),
        });
        assert_eq!(ecu.mode.get_drive_state(), DriveState::NotDriving);
        assert!(!ecu.mode.is_active());
    }
}

#[test]
fn requests_are_processed_in_arrival_order() {
    let ecu = Ecu::new();
    let mut outputs = RecordingOutputs::default();
    let mut can = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut can).unwrap();

    ecu.mode
        .request_transition(FunctionalState::Driving, Some(DriveState::Pit))
        .unwrap();
    ecu.mode
        .request_transition(FunctionalState::Driving, Some(DriveState::Reverse))
        .unwrap();
    assert_eq!(director.process_pending(), 2);
    assert_eq!(ecu.mode.get_drive_state(), DriveState::Reverse);
}

#[test]
fn select_requests_the_highlighted_mode() {
    let ecu = Ecu::new();
    let mut outputs = RecordingOutputs::default();
    let mut can = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut can).unwrap();

    ecu.mode.increment_menu_index();
    ecu.mode.increment_menu_index();
    assert_eq!(ecu.mode.menu().index, MenuIndex::Performance);

    let menu = ecu.mode.select_menu_index().unwrap();
    assert_eq!(
        menu,
        Some(MenuState {
            index: MenuIndex::Performance,
            home_mode: false
        })
    );
    assert_eq!(director.process_pending(), 1);
    assert_eq!(
        ecu.mode.snapshot(),
        VehicleState {
            functional: FunctionalState::Driving,
            drive: DriveState::Performance
        }
    );
    assert_eq!(director.outputs().rtds, 1);
    assert_eq!(director.outputs().pump, Some(true));

    // outside home mode select and navigation do nothing
    assert_eq!(ecu.mode.select_menu_index(), Ok(None));
    assert_eq!(ecu.mode.increment_menu_index(), None);
    assert_eq!(director.process_pending(), 0);
}

#[test]
fn select_on_a_display_entry_is_ignored() {
    let ecu = Ecu::new();
    for _ in 0..4 {
        ecu.mode.increment_menu_index();
    }
    assert_eq!(ecu.mode.menu().index, MenuIndex::Debug);
    assert_eq!(ecu.mode.select_menu_index(), Ok(None));
    assert!(ecu.mode.menu().home_mode);
}

#[test]
fn reverse_toggles_only_from_pit() {
    let ecu = Ecu::new();
    let mut outputs = RecordingOutputs::default();
    let mut can = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut can).unwrap();

    assert_eq!(ecu.mode.toggle_reverse(), Ok(false));

    ecu.mode.increment_menu_index();
    ecu.mode.select_menu_index().unwrap();
    director.process_pending();
    assert_eq!(ecu.mode.get_drive_state(), DriveState::Pit);

    assert_eq!(ecu.mode.toggle_reverse(), Ok(true));
    director.process_pending();
    assert_eq!(ecu.mode.get_drive_state(), DriveState::Reverse);
    // switching between active modes does not replay the ready sound
    assert_eq!(director.outputs().rtds, 1);

    assert_eq!(ecu.mode.toggle_reverse(), Ok(true));
    director.process_pending();
    assert_eq!(ecu.mode.get_drive_state(), DriveState::Pit);
}

#[test]
fn faulted_resets_menu_and_home_recovers() {
    let ecu = Ecu::new();
    let mut outputs = RecordingOutputs::default();
    let mut can = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut can).unwrap();

    ecu.mode.increment_menu_index();
    ecu.mode.select_menu_index().unwrap();
    director.process_pending();
    director.apply(TransitionRequest::functional(FunctionalState::Faulted));

    assert_eq!(ecu.mode.menu(), MenuState::INITIAL);
    assert_eq!(director.outputs().pump, Some(false));
    assert_eq!(director.outputs().fault_line, Some(false));

    // FAULTED can only go back to READY
    director.apply(TransitionRequest::driving(DriveState::Pit));
    assert_eq!(ecu.mode.get_functional_state(), FunctionalState::Faulted);

    ecu.mode.set_home_mode().unwrap();
    director.process_pending();
    assert_eq!(ecu.mode.get_functional_state(), FunctionalState::Ready);
    // the shutdown line is closed again so the car can be re-energised
    assert_eq!(director.outputs().fault_line, Some(true));

    ecu.mode.increment_menu_index();
    ecu.mode.select_menu_index().unwrap();
    director.process_pending();
    assert!(ecu.mode.is_active());
    assert_eq!(director.outputs().fault_line, Some(true));
}

#[test]
fn housekeeping_broadcasts_state() {
    let ecu = Ecu::new();
    let mut outputs = RecordingOutputs::default();
    let mut can = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut can).unwrap();

    director.housekeeping();
    director.housekeeping();
    let frames = director.can().with_id(STATE_STATUS_ID as u32);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2].data(), &[1, 0, 1, 0]);
    assert!(director.can().with_id(MENU_STATUS_ID as u32).is_empty());
}
