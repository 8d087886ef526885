//! Capabilities the control core needs from the board.

use crate::error::{SensorError, TransportError};
use crate::pedals::RawPedals;

pub trait PedalSensors {
    /// One simultaneous sample of both accelerator and both brake channels.
    fn read_pedals(&mut self) -> Result<RawPedals, SensorError>;
}

/// Command sink of the motor controller.
pub trait MotorController {
    /// Latest known vehicle speed (mph).
    fn speed_mph(&self) -> f32;

    /// Forward (or, negative, reverse) torque in Nm.
    fn set_torque(&mut self, torque: i16) -> Result<(), TransportError>;

    /// Brake current in 0.1 A.
    fn set_brake_current(&mut self, current: u16) -> Result<(), TransportError>;

    /// Regenerative current in 0.1 A.
    fn set_regen_current(&mut self, current: u16) -> Result<(), TransportError>;
}

/// Human readable diagnostics, e.g. the serial console.
pub trait DiagnosticSink {
    fn log_diagnostic(&mut self, text: &str);
}

/// Power distribution outputs driven on state changes.
pub trait VehicleOutputs {
    /// Ready-to-drive sound.
    fn sound_rtds(&mut self) -> Result<(), SensorError>;

    fn write_pump(&mut self, on: bool) -> Result<(), SensorError>;

    /// `false` opens the shutdown circuit.
    fn write_fault(&mut self, ok: bool) -> Result<(), SensorError>;
}

pub trait Brakelight {
    fn write_brakelight(&mut self, on: bool);
}

impl<T: PedalSensors + ?Sized> PedalSensors for &mut T {
    fn read_pedals(&mut self) -> Result<RawPedals, SensorError> {
        (**self).read_pedals()
    }
}

impl<T: MotorController + ?Sized> MotorController for &mut T {
    fn speed_mph(&self) -> f32 {
        (**self).speed_mph()
    }

    fn set_torque(&mut self, torque: i16) -> Result<(), TransportError> {
        (**self).set_torque(torque)
    }

    fn set_brake_current(&mut self, current: u16) -> Result<(), TransportError> {
        (**self).set_brake_current(current)
    }

    fn set_regen_current(&mut self, current: u16) -> Result<(), TransportError> {
        (**self).set_regen_current(current)
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &mut T {
    fn log_diagnostic(&mut self, text: &str) {
        (**self).log_diagnostic(text)
    }
}

impl<T: VehicleOutputs + ?Sized> VehicleOutputs for &mut T {
    fn sound_rtds(&mut self) -> Result<(), SensorError> {
        (**self).sound_rtds()
    }

    fn write_pump(&mut self, on: bool) -> Result<(), SensorError> {
        (**self).write_pump(on)
    }

    fn write_fault(&mut self, ok: bool) -> Result<(), SensorError> {
        (**self).write_fault(ok)
    }
}

impl<T: Brakelight + ?Sized> Brakelight for &mut T {
    fn write_brakelight(&mut self, on: bool) {
        (**self).write_brakelight(on)
    }
}
