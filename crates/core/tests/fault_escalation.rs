mod common;

use common::{RecordingCan, RecordingDiagnostics, RecordingOutputs};
use race_ecu_core::can::FAULT_REPORT_ID;
use race_ecu_core::config::TRANSITION_QUEUE_SIZE;
use race_ecu_core::fault::{Disposition, FaultCode, FaultRecord, Severity};
use race_ecu_core::state_machine::{DriveState, FunctionalState, TransitionRequest};
use race_ecu_core::Ecu;

#[test]
fn defcon1_while_driving_faults_the_vehicle() {
    let ecu = Ecu::new();
    let mut outputs = RecordingOutputs::default();
    let mut state_bus = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut state_bus).unwrap();
    director.apply(TransitionRequest::driving(DriveState::Performance));

    let mut bus = RecordingCan::default();
    let mut diagnostics = RecordingDiagnostics::default();
    ecu.faults
        .queue_fault(FaultRecord::new(
            FaultCode::OnboardPedal,
            Severity::Defcon1,
            "Pedal open circuit fault",
        ))
        .unwrap();
    assert_eq!(ecu.faults.process_pending(&mut bus, &mut diagnostics, &ecu.mode), 1);

    director.process_pending();
    assert_eq!(ecu.mode.get_functional_state(), FunctionalState::Faulted);
    assert_eq!(ecu.mode.get_drive_state(), DriveState::NotDriving);

    let reports = bus.with_id(FAULT_REPORT_ID as u32);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].data(), &[0, 0, 0, 2, 1, 0, 0, 0]);
    assert_eq!(diagnostics.lines, vec!["Pedal open circuit fault".to_string()]);
}

#[test]
fn defcon5_is_only_logged() {
    let ecu = Ecu::new();
    let mut outputs = RecordingOutputs::default();
    let mut state_bus = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut state_bus).unwrap();
    director.apply(TransitionRequest::driving(DriveState::Pit));

    let mut bus = RecordingCan::default();
    let mut diagnostics = RecordingDiagnostics::default();
    let record = FaultRecord::new(FaultCode::BspdPrefault, Severity::Defcon5, "BSPD prefault triggered");
    assert_eq!(
        ecu.faults.process(record, &mut bus, &mut diagnostics, &ecu.mode),
        Disposition::Logged
    );
    assert_eq!(director.process_pending(), 0);
    assert_eq!(ecu.mode.get_drive_state(), DriveState::Pit);
    assert_eq!(bus.with_id(FAULT_REPORT_ID as u32).len(), 1);
}

#[test]
fn severity_boundary() {
    let ecu = Ecu::new();
    let mut bus = RecordingCan::default();
    let mut diagnostics = RecordingDiagnostics::default();
    for (severity, expected) in [
        (Severity::Defcon1, Disposition::Escalated),
        (Severity::Defcon2, Disposition::Escalated),
        (Severity::Defcon3, Disposition::Escalated),
        (Severity::Defcon4, Disposition::Logged),
        (Severity::Defcon5, Disposition::Logged),
    ] {
        let record = FaultRecord::new(FaultCode::Imu, severity, "imu");
        assert_eq!(ecu.faults.process(record, &mut bus, &mut diagnostics, &ecu.mode), expected);
    }
}

#[test]
fn malformed_records_are_dropped() {
    let ecu = Ecu::new();
    let mut bus = RecordingCan::default();
    let mut diagnostics = RecordingDiagnostics::default();

    let unknown_code = FaultRecord::from_raw(0x3, 1, "bogus");
    let bad_severity = FaultRecord::from_raw(FaultCode::Imu as u32, 9, "bogus");
    for record in [unknown_code, bad_severity] {
        assert_eq!(
            ecu.faults.process(record, &mut bus, &mut diagnostics, &ecu.mode),
            Disposition::Malformed
        );
    }
    assert!(bus.frames.is_empty());

    let mut outputs = RecordingOutputs::default();
    let mut state_bus = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut state_bus).unwrap();
    assert_eq!(director.process_pending(), 0);
    assert_eq!(ecu.mode.get_functional_state(), FunctionalState::Ready);
}

#[test]
fn transport_failure_does_not_stop_escalation() {
    let ecu = Ecu::new();
    let mut outputs = RecordingOutputs::default();
    let mut state_bus = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut state_bus).unwrap();
    director.apply(TransitionRequest::driving(DriveState::Performance));

    let mut bus = RecordingCan {
        fail: true,
        ..Default::default()
    };
    let mut diagnostics = RecordingDiagnostics::default();
    ecu.faults.raise(FaultCode::CanDispatch, Severity::Defcon2, "Failed to send motor command");
    ecu.faults.raise(FaultCode::Imu, Severity::Defcon5, "IMU read failed");
    assert_eq!(ecu.faults.process_pending(&mut bus, &mut diagnostics, &ecu.mode), 2);
    assert_eq!(diagnostics.lines.len(), 2);

    director.process_pending();
    assert_eq!(ecu.mode.get_functional_state(), FunctionalState::Faulted);
}

#[test]
fn full_transition_queue_latches_the_escalation() {
    let ecu = Ecu::new();
    let mut outputs = RecordingOutputs::default();
    let mut state_bus = RecordingCan::default();
    let mut director = ecu.mode.director(&ecu.faults, &mut outputs, &mut state_bus).unwrap();
    director.apply(TransitionRequest::driving(DriveState::Performance));

    for _ in 0..TRANSITION_QUEUE_SIZE {
        ecu.mode
            .request(TransitionRequest::driving(DriveState::Efficiency))
            .unwrap();
    }
    assert!(ecu
        .mode
        .request(TransitionRequest::driving(DriveState::Pit))
        .is_err());

    let mut bus = RecordingCan::default();
    let mut diagnostics = RecordingDiagnostics::default();
    ecu.faults.raise(FaultCode::OnboardBrake, Severity::Defcon1, "Brake open circuit fault");
    ecu.faults.process_pending(&mut bus, &mut diagnostics, &ecu.mode);

    // the latch is honoured before the queued requests, which FAULTED then rejects
    director.process_pending();
    assert_eq!(ecu.mode.get_functional_state(), FunctionalState::Faulted);
}

#[test]
fn queue_overflow_is_counted() {
    let ecu = Ecu::new();
    for _ in 0..100 {
        ecu.faults.raise(FaultCode::Imu, Severity::Defcon5, "IMU read failed");
    }
    assert_eq!(ecu.faults.pending(), race_ecu_core::config::FAULT_QUEUE_SIZE);
    assert_eq!(
        ecu.faults.dropped() as usize,
        100 - race_ecu_core::config::FAULT_QUEUE_SIZE
    );
}

#[test]
fn fault_manager_task_wakes_on_queue() {
    let ecu = Ecu::new();
    ecu.faults.raise(FaultCode::Tsms, Severity::Defcon4, "TSMS read failed");
    let record = embassy_futures::block_on(ecu.faults.next());
    assert_eq!(record.code(), Some(FaultCode::Tsms));
}
