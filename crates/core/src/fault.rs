//! Fault classification, queuing and severity-driven escalation.
//!
//! Any task may queue a [`FaultRecord`] without blocking. A single consumer
//! drains the queue in arrival order, reports every record on the CAN bus and
//! the diagnostic sink, and forces the vehicle into FAULTED for severities 1-3.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::can::{self, CanTransport};
use crate::config::FAULT_QUEUE_SIZE;
use crate::error::QueueFull;
use crate::state_machine::{FunctionalState, TransitionRequest, VehicleMode};
use crate::traits::DiagnosticSink;

/// Fault severity, 1 = most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Severity {
    Defcon1 = 1,
    Defcon2 = 2,
    Defcon3 = 3,
    Defcon4 = 4,
    Defcon5 = 5,
}

impl Severity {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Severity::Defcon1),
            2 => Some(Severity::Defcon2),
            3 => Some(Severity::Defcon3),
            4 => Some(Severity::Defcon4),
            5 => Some(Severity::Defcon5),
            _ => None,
        }
    }

    /// Severities 1-3 take the vehicle out of service.
    pub const fn escalates(self) -> bool {
        (self as u8) <= 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum FaultCode {
    FaultsClear = 0x0,
    OnboardTemp = 0x1,
    OnboardPedal = 0x2,
    Imu = 0x4,
    CanDispatch = 0x8,
    CanRouting = 0x10,
    FuseMonitor = 0x20,
    ShutdownMonitor = 0x40,
    DtiRouting = 0x80,
    SteeringioRouting = 0x100,
    StateReceived = 0x200,
    InvalidTransition = 0x400,
    BmsCanMonitor = 0x800,
    ButtonsMonitor = 0x1000,
    BspdPrefault = 0x2000,
    LvMonitor = 0x4000,
    OnboardBrake = 0x8000,
    Tsms = 0x10000,
}

impl FaultCode {
    pub const fn from_u32(value: u32) -> Option<Self> {
        let code = match value {
            0x0 => FaultCode::FaultsClear,
            0x1 => FaultCode::OnboardTemp,
            0x2 => FaultCode::OnboardPedal,
            0x4 => FaultCode::Imu,
            0x8 => FaultCode::CanDispatch,
            0x10 => FaultCode::CanRouting,
            0x20 => FaultCode::FuseMonitor,
            0x40 => FaultCode::ShutdownMonitor,
            0x80 => FaultCode::DtiRouting,
            0x100 => FaultCode::SteeringioRouting,
            0x200 => FaultCode::StateReceived,
            0x400 => FaultCode::InvalidTransition,
            0x800 => FaultCode::BmsCanMonitor,
            0x1000 => FaultCode::ButtonsMonitor,
            0x2000 => FaultCode::BspdPrefault,
            0x4000 => FaultCode::LvMonitor,
            0x8000 => FaultCode::OnboardBrake,
            0x10000 => FaultCode::Tsms,
            _ => return None,
        };
        Some(code)
    }
}

/// One reported problem. Code and severity are kept raw so that records
/// built from external input can be validated by the fault manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultRecord {
    code: u32,
    severity: u8,
    diagnostic: &'static str,
}

impl FaultRecord {
    pub const fn new(code: FaultCode, severity: Severity, diagnostic: &'static str) -> Self {
        FaultRecord {
            code: code as u32,
            severity: severity as u8,
            diagnostic,
        }
    }

    pub const fn from_raw(code: u32, severity: u8, diagnostic: &'static str) -> Self {
        FaultRecord {
            code,
            severity,
            diagnostic,
        }
    }

    pub fn raw_code(&self) -> u32 {
        self.code
    }

    pub fn raw_severity(&self) -> u8 {
        self.severity
    }

    pub fn code(&self) -> Option<FaultCode> {
        FaultCode::from_u32(self.code)
    }

    pub fn severity(&self) -> Option<Severity> {
        Severity::from_u8(self.severity)
    }

    pub fn diagnostic(&self) -> &'static str {
        self.diagnostic
    }
}

impl fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fault {:#x} DEFCON{}: {}",
            self.code, self.severity, self.diagnostic
        )
    }
}

/// What the fault manager did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Disposition {
    /// Unknown code or severity; logged and dropped.
    Malformed,
    /// Reported only.
    Logged,
    /// Reported and a FAULTED transition was requested.
    Escalated,
}

pub struct FaultManager {
    queue: Channel<CriticalSectionRawMutex, FaultRecord, FAULT_QUEUE_SIZE>,
    dropped: AtomicU32,
    reported_drops: AtomicU32,
}

impl FaultManager {
    pub const fn new() -> Self {
        FaultManager {
            queue: Channel::new(),
            dropped: AtomicU32::new(0),
            reported_drops: AtomicU32::new(0),
        }
    }

    /// Queues a record without blocking. A full queue drops the new record
    /// and counts it.
    pub fn queue_fault(&self, record: FaultRecord) -> Result<(), QueueFull> {
        self.queue.try_send(record).map_err(|_| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            QueueFull
        })
    }

    /// Convenience for producers that do not care whether the queue had room;
    /// overflow is still counted.
    pub fn raise(&self, code: FaultCode, severity: Severity, diagnostic: &'static str) {
        let _ = self.queue_fault(FaultRecord::new(code, severity, diagnostic));
    }

    /// Records dropped because the queue was full since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub async fn next(&self) -> FaultRecord {
        self.queue.receive().await
    }

    pub fn try_next(&self) -> Option<FaultRecord> {
        self.queue.try_receive().ok()
    }

    /// Reports and escalates a single record.
    pub fn process<T, D>(
        &self,
        record: FaultRecord,
        can: &mut T,
        diagnostics: &mut D,
        mode: &VehicleMode,
    ) -> Disposition
    where
        T: CanTransport,
        D: DiagnosticSink,
    {
        self.report_overflow();

        let (Some(code), Some(severity)) = (record.code(), record.severity()) else {
            warn!(
                "Dropping malformed fault {=u32:#x} severity {=u8}",
                record.raw_code(),
                record.raw_severity()
            );
            diagnostics.log_diagnostic("Dropped malformed fault record");
            return Disposition::Malformed;
        };

        match can::fault_report(&record) {
            Ok(frame) => {
                if let Err(e) = can.send(&frame) {
                    error!("Failed to send fault report: {}", e);
                }
            }
            Err(e) => error!("Failed to build fault report: {}", e),
        }
        diagnostics.log_diagnostic(record.diagnostic());

        if !severity.escalates() {
            info!("Fault {} ({}) logged", code, severity);
            return Disposition::Logged;
        }

        error!("Fault {} ({}) escalating to FAULTED", code, severity);
        if mode
            .request(TransitionRequest::functional(FunctionalState::Faulted))
            .is_err()
        {
            mode.latch_pending_fault();
        }
        Disposition::Escalated
    }

    /// Processes everything currently queued; returns how many records were
    /// handled.
    pub fn process_pending<T, D>(&self, can: &mut T, diagnostics: &mut D, mode: &VehicleMode) -> usize
    where
        T: CanTransport,
        D: DiagnosticSink,
    {
        let mut handled = 0;
        while let Some(record) = self.try_next() {
            self.process(record, can, diagnostics, mode);
            handled += 1;
        }
        handled
    }

    /// Consumer loop; never returns.
    pub async fn run<T, D>(&self, can: &mut T, diagnostics: &mut D, mode: &VehicleMode) -> !
    where
        T: CanTransport,
        D: DiagnosticSink,
    {
        loop {
            let record = self.next().await;
            self.process(record, can, diagnostics, mode);
        }
    }

    fn report_overflow(&self) {
        let dropped = self.dropped();
        let reported = self.reported_drops.swap(dropped, Ordering::Relaxed);
        if dropped != reported {
            warn!("Fault queue overflowed, {=u32} records dropped", dropped - reported);
        }
    }
}

impl Default for FaultManager {
    fn default() -> Self {
        Self::new()
    }
}
