use core::sync::atomic::{AtomicBool, Ordering};

use crate::can::{self, CanTransport};
use crate::control::{BrakeState, TorqueLimit};
use crate::dti::InverterState;
use crate::fault::{FaultCode, FaultManager, Severity};
use crate::menu::MenuState;
use crate::state_machine::VehicleMode;

/// Everything the tasks share. Lives in a `static` on the target.
pub struct Ecu {
    pub faults: FaultManager,
    pub mode: VehicleMode,
    pub brake: BrakeState,
    pub torque_limit: TorqueLimit,
    pub inverter: InverterState,
    tsms: AtomicBool,
}

impl Ecu {
    pub const fn new() -> Self {
        Ecu {
            faults: FaultManager::new(),
            mode: VehicleMode::new(),
            brake: BrakeState::new(),
            torque_limit: TorqueLimit::new(),
            inverter: InverterState::new(),
            tsms: AtomicBool::new(false),
        }
    }

    /// Debounced tractive system main switch, as last published by the
    /// TSMS monitor.
    pub fn tsms_on(&self) -> bool {
        self.tsms.load(Ordering::Acquire)
    }

    pub fn set_tsms(&self, on: bool) {
        self.tsms.store(on, Ordering::Release);
    }

    pub fn broadcast_menu<T: CanTransport>(&self, menu: MenuState, can: &mut T) {
        if let Err(e) = can::menu_status(menu).and_then(|frame| can.send(&frame)) {
            debug!("Failed to send menu status: {}", e);
            self.faults
                .raise(FaultCode::CanDispatch, Severity::Defcon5, "Failed to send menu status");
        }
    }
}

impl Default for Ecu {
    fn default() -> Self {
        Self::new()
    }
}
