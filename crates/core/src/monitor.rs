//! Tractive system main switch.

use embassy_time::Instant;

use crate::can::CanTransport;
use crate::config::TSMS_DEBOUNCE_PERIOD;
use crate::debounce::DebouncedInput;
use crate::ecu::Ecu;
use crate::error::SensorError;
use crate::fault::{FaultCode, Severity};

pub struct TsmsMonitor {
    input: DebouncedInput,
}

impl TsmsMonitor {
    pub const fn new() -> Self {
        TsmsMonitor {
            input: DebouncedInput::new(false),
        }
    }

    pub fn is_on(&self) -> bool {
        self.input.value()
    }

    /// Feeds one reading and publishes the debounced value to `ecu`. Drops
    /// the car back to the home screen when the switch is off while a drive
    /// mode is active.
    pub fn update<T: CanTransport>(
        &mut self,
        reading: Result<bool, SensorError>,
        now: Instant,
        ecu: &Ecu,
        can: &mut T,
    ) {
        let raw = match reading {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read TSMS: {}", e);
                ecu.faults.raise(FaultCode::Tsms, Severity::Defcon5, "Failed to read TSMS");
                return;
            }
        };

        if let Some(on) = self.input.update(raw, now, TSMS_DEBOUNCE_PERIOD) {
            info!("TSMS {}", if on { "on" } else { "off" });
        }
        ecu.set_tsms(self.is_on());

        if self.is_on() || !ecu.mode.is_active() || ecu.mode.menu().home_mode {
            return;
        }
        match ecu.mode.set_home_mode() {
            Ok(menu) => ecu.broadcast_menu(menu, can),
            Err(_) => ecu.faults.raise(
                FaultCode::Tsms,
                Severity::Defcon5,
                "Failed to leave drive mode on TSMS off",
            ),
        }
    }
}

impl Default for TsmsMonitor {
    fn default() -> Self {
        Self::new()
    }
}
