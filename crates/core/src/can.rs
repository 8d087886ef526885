//! CAN frames produced and consumed by the control core.

use embedded_can::{ExtendedId, Id, StandardId};

use crate::error::TransportError;
use crate::fault::FaultRecord;
use crate::menu::MenuState;
use crate::pedals::RawPedals;
use crate::state_machine::VehicleState;

pub const STATE_STATUS_ID: u16 = 0x500;
pub const MENU_STATUS_ID: u16 = 0x501;
pub const FAULT_REPORT_ID: u16 = 0x502;
pub const PEDALS_ACCEL_ID: u16 = 0x504;
pub const PEDALS_BRAKE_ID: u16 = 0x505;
pub const STEERING_IO_ID: u16 = 0x680;

/// Anything that can put a frame on the bus without blocking.
pub trait CanTransport {
    fn send(&mut self, message: &CanMessage) -> Result<(), TransportError>;
}

impl<T: CanTransport + ?Sized> CanTransport for &mut T {
    fn send(&mut self, message: &CanMessage) -> Result<(), TransportError> {
        (**self).send(message)
    }
}

/// Classic CAN data frame, at most 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanMessage {
    id: Id,
    len: u8,
    data: [u8; 8],
}

impl CanMessage {
    pub fn new(id: impl Into<Id>, payload: &[u8]) -> Result<Self, TransportError> {
        if payload.len() > 8 {
            return Err(TransportError::InvalidFrame);
        }
        let mut data = [0u8; 8];
        data[..payload.len()].copy_from_slice(payload);
        Ok(CanMessage {
            id: id.into(),
            len: payload.len() as u8,
            data,
        })
    }

    pub fn standard(id: u16, payload: &[u8]) -> Result<Self, TransportError> {
        let id = StandardId::new(id).ok_or(TransportError::InvalidFrame)?;
        Self::new(id, payload)
    }

    pub fn extended(id: u32, payload: &[u8]) -> Result<Self, TransportError> {
        let id = ExtendedId::new(id).ok_or(TransportError::InvalidFrame)?;
        Self::new(id, payload)
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn raw_id(&self) -> u32 {
        id_to_u32(self.id)
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl embedded_can::Frame for CanMessage {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        CanMessage::new(id, data).ok()
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.len as usize
    }

    fn data(&self) -> &[u8] {
        CanMessage::data(self)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CanMessage {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "CanMessage {{ id: {=u32:#x}, data: {=[u8]} }}", self.raw_id(), self.data())
    }
}

pub fn id_to_u32(id: Id) -> u32 {
    match id {
        Id::Standard(sid) => sid.as_raw() as u32,
        Id::Extended(eid) => eid.as_raw(),
    }
}

/// `code (u32 BE) | severity | 3 reserved bytes`
pub fn fault_report(record: &FaultRecord) -> Result<CanMessage, TransportError> {
    let mut data = [0u8; 8];
    data[..4].copy_from_slice(&record.raw_code().to_be_bytes());
    data[4] = record.raw_severity();
    CanMessage::standard(FAULT_REPORT_ID, &data)
}

pub fn menu_status(menu: MenuState) -> Result<CanMessage, TransportError> {
    CanMessage::standard(MENU_STATUS_ID, &[menu.home_mode as u8, menu.index as u8, 0, 0, 0])
}

pub fn state_status(state: VehicleState, menu: MenuState) -> Result<CanMessage, TransportError> {
    CanMessage::standard(
        STATE_STATUS_ID,
        &[
            state.functional as u8,
            state.drive as u8,
            menu.home_mode as u8,
            menu.index as u8,
        ],
    )
}

/// Raw accelerator and brake channels, two big-endian words per frame.
pub fn pedal_telemetry(raw: &RawPedals) -> Result<[CanMessage; 2], TransportError> {
    let pair = |a: u32, b: u32| {
        let mut data = [0u8; 8];
        data[..4].copy_from_slice(&a.to_be_bytes());
        data[4..].copy_from_slice(&b.to_be_bytes());
        data
    };
    Ok([
        CanMessage::standard(PEDALS_ACCEL_ID, &pair(raw.accel1, raw.accel2))?,
        CanMessage::standard(PEDALS_BRAKE_ID, &pair(raw.brake1, raw.brake2))?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultCode, Severity};
    use crate::menu::MenuIndex;
    use crate::state_machine::{DriveState, FunctionalState};

    #[test]
    fn fault_report_layout() {
        let record = FaultRecord::new(FaultCode::Tsms, Severity::Defcon2, "tsms");
        let frame = fault_report(&record).unwrap();
        assert_eq!(frame.raw_id(), 0x502);
        assert_eq!(frame.data(), &[0x00, 0x01, 0x00, 0x00, 2, 0, 0, 0]);
    }

    #[test]
    fn menu_status_is_five_bytes() {
        let frame = menu_status(MenuState {
            index: MenuIndex::Efficiency,
            home_mode: false,
        })
        .unwrap();
        assert_eq!(frame.raw_id(), 0x501);
        assert_eq!(frame.data(), &[0, 3, 0, 0, 0]);
    }

    #[test]
    fn state_status_layout() {
        let state = VehicleState {
            functional: FunctionalState::Driving,
            drive: DriveState::Performance,
        };
        let frame = state_status(state, MenuState::INITIAL).unwrap();
        assert_eq!(frame.data(), &[2, 4, 1, 0]);
    }

    #[test]
    fn oversized_payloads_and_ids_are_rejected() {
        assert_eq!(
            CanMessage::standard(0x100, &[0; 9]),
            Err(TransportError::InvalidFrame)
        );
        assert_eq!(CanMessage::standard(0x800, &[]), Err(TransportError::InvalidFrame));
        assert!(CanMessage::extended(0x1E_1E, &[1]).is_ok());
    }

    #[test]
    fn pedal_telemetry_splits_channels() {
        let raw = RawPedals {
            accel1: 0x0102,
            accel2: 0x0304,
            brake1: 5,
            brake2: 6,
        };
        let [accel, brake] = pedal_telemetry(&raw).unwrap();
        assert_eq!(accel.raw_id(), 0x504);
        assert_eq!(accel.data(), &[0, 0, 1, 2, 0, 0, 3, 4]);
        assert_eq!(brake.raw_id(), 0x505);
        assert_eq!(brake.data(), &[0, 0, 0, 5, 0, 0, 0, 6]);
    }
}
