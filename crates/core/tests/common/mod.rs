#![allow(dead_code)]

use race_ecu_core::can::{CanMessage, CanTransport};
use race_ecu_core::config::PedalConfig;
use race_ecu_core::pedals::RawPedals;
use race_ecu_core::traits::{DiagnosticSink, MotorController, PedalSensors, VehicleOutputs};
use race_ecu_core::{SensorError, TransportError};

#[derive(Default)]
pub struct RecordingCan {
    pub frames: Vec<CanMessage>,
    pub fail: bool,
}

impl RecordingCan {
    pub fn with_id(&self, id: u32) -> Vec<&CanMessage> {
        self.frames.iter().filter(|f| f.raw_id() == id).collect()
    }
}

impl CanTransport for RecordingCan {
    fn send(&mut self, message: &CanMessage) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::MailboxFull);
        }
        self.frames.push(*message);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    Torque(i16),
    Brake(u16),
    Regen(u16),
}

#[derive(Default)]
pub struct RecordingMotor {
    pub speed_mph: f32,
    pub commands: Vec<MotorCommand>,
    pub fail: bool,
}

impl RecordingMotor {
    fn record(&mut self, command: MotorCommand) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::BusOff);
        }
        self.commands.push(command);
        Ok(())
    }

    pub fn last(&self) -> Option<MotorCommand> {
        self.commands.last().copied()
    }
}

impl MotorController for RecordingMotor {
    fn speed_mph(&self) -> f32 {
        self.speed_mph
    }

    fn set_torque(&mut self, torque: i16) -> Result<(), TransportError> {
        self.record(MotorCommand::Torque(torque))
    }

    fn set_brake_current(&mut self, current: u16) -> Result<(), TransportError> {
        self.record(MotorCommand::Brake(current))
    }

    fn set_regen_current(&mut self, current: u16) -> Result<(), TransportError> {
        self.record(MotorCommand::Regen(current))
    }
}

pub struct ScriptedPedals {
    pub next: Result<RawPedals, SensorError>,
}

impl ScriptedPedals {
    pub fn new() -> Self {
        ScriptedPedals {
            next: Ok(pedals_at(0, 0)),
        }
    }

    pub fn set(&mut self, accel_pct: u16, brake: u32) {
        self.next = Ok(pedals_at(accel_pct, brake));
    }
}

impl PedalSensors for ScriptedPedals {
    fn read_pedals(&mut self) -> Result<RawPedals, SensorError> {
        self.next
    }
}

/// Raw readings for which both accelerator channels normalize to exactly
/// `accel_pct` with the default calibration.
pub fn pedals_at(accel_pct: u16, brake: u32) -> RawPedals {
    let channel = |offset: u32, max: u32| {
        let span = max - offset;
        offset + (accel_pct as u32 * span).div_ceil(100)
    };
    let cal = PedalConfig::DEFAULT;
    RawPedals {
        accel1: channel(cal.accel1.offset, cal.accel1.max),
        accel2: channel(cal.accel2.offset, cal.accel2.max),
        brake1: brake,
        brake2: brake,
    }
}

#[derive(Debug, Default)]
pub struct RecordingOutputs {
    pub rtds: usize,
    pub pump: Option<bool>,
    pub fault_line: Option<bool>,
}

impl VehicleOutputs for RecordingOutputs {
    fn sound_rtds(&mut self) -> Result<(), SensorError> {
        self.rtds += 1;
        Ok(())
    }

    fn write_pump(&mut self, on: bool) -> Result<(), SensorError> {
        self.pump = Some(on);
        Ok(())
    }

    fn write_fault(&mut self, ok: bool) -> Result<(), SensorError> {
        self.fault_line = Some(ok);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDiagnostics {
    pub lines: Vec<String>,
}

impl DiagnosticSink for RecordingDiagnostics {
    fn log_diagnostic(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}
