//! DTI inverter protocol: extended ids `(packet << 8) | node`, big-endian
//! payloads.

use core::cell::Cell;
use core::f32::consts::PI;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_can::Id;

use crate::can::{CanMessage, CanTransport};
use crate::config::{
    GEAR_RATIO, INVERTER_NODE_ID, MOTOR_KT, MOTOR_PEAK_CURRENT, MOTOR_POLE_PAIRS,
    WHEEL_DIAMETER_IN,
};
use crate::error::TransportError;
use crate::traits::MotorController;

const INCHES_PER_MILE: f32 = 63_360.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum InverterCommand {
    SetCurrent = 0x01,
    SetBrakeCurrent = 0x02,
    SetDriveEnable = 0x0C,
}

pub const ERPM_PACKET: u16 = 0x20;
pub const CURRENTS_PACKET: u16 = 0x21;
pub const TEMPS_FAULT_PACKET: u16 = 0x22;
pub const SIGNALS_PACKET: u16 = 0x24;

pub fn command_id(packet_id: u16, node_id: u8) -> u32 {
    (packet_id as u32) << 8 | node_id as u32
}

/// Splits an inverter frame id into packet and node id.
pub fn split_id(id: Id) -> (u16, u8) {
    match id {
        Id::Standard(id) => (id.as_raw() >> 5, (id.as_raw() & 0x1F) as u8),
        Id::Extended(id) => ((id.as_raw() >> 8) as u16, (id.as_raw() & 0xFF) as u8),
    }
}

/// Torque (Nm) to AC current in 0.1 A, clamped to the motor's peak current.
pub fn torque_to_current(torque: i16) -> i16 {
    let amps = (torque as f32 / MOTOR_KT).clamp(-MOTOR_PEAK_CURRENT, MOTOR_PEAK_CURRENT);
    (amps * 10.0) as i16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InverterFeedback {
    pub erpm: i32,
    pub duty_cycle: i16,
    pub dc_voltage: i16,
    pub ac_current: i16,
    pub dc_current: i16,
    pub controller_temp: i16,
    pub motor_temp: i16,
    pub fault_code: u8,
    pub drive_enable: bool,
}

impl InverterFeedback {
    pub const fn new() -> Self {
        InverterFeedback {
            erpm: 0,
            duty_cycle: 0,
            dc_voltage: 0,
            ac_current: 0,
            dc_current: 0,
            controller_temp: 0,
            motor_temp: 0,
            fault_code: 0,
            drive_enable: false,
        }
    }

    pub fn speed_mph(&self) -> f32 {
        let wheel_rpm = self.erpm as f32 / MOTOR_POLE_PAIRS / GEAR_RATIO;
        wheel_rpm * PI * WHEEL_DIAMETER_IN * 60.0 / INCHES_PER_MILE
    }
}

fn be_i16(data: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([data[at], data[at + 1]])
}

/// Latest inverter feedback, written by the CAN receive task.
pub struct InverterState {
    feedback: Mutex<CriticalSectionRawMutex, Cell<InverterFeedback>>,
}

impl InverterState {
    pub const fn new() -> Self {
        InverterState {
            feedback: Mutex::new(Cell::new(InverterFeedback::new())),
        }
    }

    pub fn get(&self) -> InverterFeedback {
        self.feedback.lock(|f| f.get())
    }

    pub fn speed_mph(&self) -> f32 {
        self.get().speed_mph()
    }

    /// Decodes one frame from the inverter. Returns `false` for frames from
    /// other nodes, unknown packets and short payloads.
    pub fn handle_frame(&self, id: Id, data: &[u8]) -> bool {
        let (packet_id, node_id) = split_id(id);
        if node_id != INVERTER_NODE_ID {
            return false;
        }
        let needed = match packet_id {
            ERPM_PACKET => 8,
            CURRENTS_PACKET => 4,
            TEMPS_FAULT_PACKET => 6,
            SIGNALS_PACKET => 5,
            _ => {
                trace!("Unknown packet {=u16:#x} from inverter", packet_id);
                return false;
            }
        };
        if data.len() < needed {
            warn!("Short inverter packet {=u16:#x}", packet_id);
            return false;
        }

        self.feedback.lock(|f| {
            let mut fb = f.get();
            match packet_id {
                ERPM_PACKET => {
                    fb.erpm = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                    fb.duty_cycle = be_i16(data, 4);
                    fb.dc_voltage = be_i16(data, 6);
                }
                CURRENTS_PACKET => {
                    fb.ac_current = be_i16(data, 0);
                    fb.dc_current = be_i16(data, 2);
                }
                TEMPS_FAULT_PACKET => {
                    fb.controller_temp = be_i16(data, 0);
                    fb.motor_temp = be_i16(data, 2);
                    fb.fault_code = data[5];
                }
                _ => fb.drive_enable = (data[4] >> 7) != 0,
            }
            f.set(fb);
        });
        true
    }
}

impl Default for InverterState {
    fn default() -> Self {
        Self::new()
    }
}

/// Motor command sink talking to a DTI inverter over `T`.
pub struct Dti<'a, T> {
    can: T,
    state: &'a InverterState,
    node_id: u8,
}

impl<'a, T: CanTransport> Dti<'a, T> {
    pub fn new(can: T, state: &'a InverterState) -> Self {
        Dti {
            can,
            state,
            node_id: INVERTER_NODE_ID,
        }
    }

    fn send(&mut self, command: InverterCommand, payload: &[u8]) -> Result<(), TransportError> {
        let message = CanMessage::extended(command_id(command as u16, self.node_id), payload)?;
        self.can.send(&message)
    }

    /// Keep-alive; the inverter drops out of drive when this stops.
    pub fn drive_enable(&mut self, enable: bool) -> Result<(), TransportError> {
        self.send(InverterCommand::SetDriveEnable, &[enable as u8, 0, 0, 0, 0, 0, 0, 0])
    }

    fn send_current(&mut self, command: InverterCommand, current: i16) -> Result<(), TransportError> {
        let [hi, lo] = current.to_be_bytes();
        self.send(command, &[hi, lo, 0, 0, 0, 0, 0, 0])
    }
}

impl<'a, T: CanTransport> MotorController for Dti<'a, T> {
    fn speed_mph(&self) -> f32 {
        self.state.speed_mph()
    }

    fn set_torque(&mut self, torque: i16) -> Result<(), TransportError> {
        self.send_current(InverterCommand::SetCurrent, torque_to_current(torque))
    }

    fn set_brake_current(&mut self, current: u16) -> Result<(), TransportError> {
        let current = current.min((MOTOR_PEAK_CURRENT * 10.0) as u16) as i16;
        self.send_current(InverterCommand::SetBrakeCurrent, current)
    }

    // the DTI has no separate regen command; regen is AC brake current
    fn set_regen_current(&mut self, current: u16) -> Result<(), TransportError> {
        self.set_brake_current(current)
    }
}
