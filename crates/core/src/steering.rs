//! Steering wheel buttons.
//!
//! The wheel reports its buttons as a bit field on [`STEERING_IO_ID`]: byte 0
//! carries one bit per button, bits 0 and 1 of byte 1 the paddles. Each
//! button is debounced on its own and acts once per press.
//!
//! [`STEERING_IO_ID`]: crate::can::STEERING_IO_ID

use embassy_time::Instant;
use heapless::Vec;

use crate::can::CanTransport;
use crate::config::{STATIONARY_SPEED_MPH, STEERING_WHEEL_DEBOUNCE};
use crate::debounce::DebounceTimer;
use crate::ecu::Ecu;
use crate::fault::{FaultCode, Severity};
use crate::state_machine::{DriveState, FunctionalState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Button {
    Left = 2,
    Up = 3,
    Right = 4,
    Home = 5,
    Select = 6,
    Down = 7,
    PaddleLeft = 8,
    PaddleRight = 9,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Left,
        Button::Up,
        Button::Right,
        Button::Home,
        Button::Select,
        Button::Down,
        Button::PaddleLeft,
        Button::PaddleRight,
    ];

    pub fn is_pressed(self, bits: u16) -> bool {
        bits & (1 << self as u8) != 0
    }
}

/// Button bit field out of a steering wheel frame.
pub fn decode_buttons(data: &[u8]) -> u16 {
    let buttons = data.first().copied().unwrap_or(0) as u16;
    let paddles = data.get(1).copied().unwrap_or(0) as u16 & 0x03;
    buttons | paddles << 8
}

pub struct SteeringWheel {
    timers: [DebounceTimer; Button::ALL.len()],
}

impl SteeringWheel {
    pub const fn new() -> Self {
        SteeringWheel {
            timers: [DebounceTimer::new(); Button::ALL.len()],
        }
    }

    /// Buttons whose press was confirmed by this sample.
    pub fn update(&mut self, bits: u16, now: Instant) -> Vec<Button, 8> {
        let mut pressed = Vec::new();
        for (button, timer) in Button::ALL.into_iter().zip(self.timers.iter_mut()) {
            if timer.update(button.is_pressed(bits), now, STEERING_WHEEL_DEBOUNCE) {
                let _ = pressed.push(button);
            }
        }
        pressed
    }

    /// Debounces `bits` and acts on every confirmed press.
    pub fn handle<T: CanTransport>(
        &mut self,
        bits: u16,
        now: Instant,
        ecu: &Ecu,
        can: &mut T,
    ) -> Vec<Button, 8> {
        let pressed = self.update(bits, now);
        for &button in &pressed {
            press(button, ecu, can);
        }
        pressed
    }
}

impl Default for SteeringWheel {
    fn default() -> Self {
        Self::new()
    }
}

/// Reason an operator request to change mode was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interlock {
    Moving,
    BrakeReleased,
    TsmsOff,
}

impl Interlock {
    fn diagnostic(self) -> &'static str {
        match self {
            Interlock::Moving => "Mode change refused, vehicle moving",
            Interlock::BrakeReleased => "Drive mode refused, brake not pressed",
            Interlock::TsmsOff => "Drive mode refused, TSMS off",
        }
    }
}

fn is_stationary(ecu: &Ecu) -> bool {
    let mph = ecu.inverter.speed_mph();
    (-STATIONARY_SPEED_MPH..=STATIONARY_SPEED_MPH).contains(&mph)
}

/// Conditions for entering a drive mode from the menu: standing still with
/// the brake pressed and the tractive system switched on.
pub fn drive_interlock(ecu: &Ecu) -> Result<(), Interlock> {
    if !is_stationary(ecu) {
        Err(Interlock::Moving)
    } else if !ecu.brake.is_engaged() {
        Err(Interlock::BrakeReleased)
    } else if !ecu.tsms_on() {
        Err(Interlock::TsmsOff)
    } else {
        Ok(())
    }
}

/// Conditions for returning to the home screen (and READY).
pub fn home_interlock(ecu: &Ecu) -> Result<(), Interlock> {
    if is_stationary(ecu) {
        Ok(())
    } else {
        Err(Interlock::Moving)
    }
}

/// Whether Select would request one of the torque producing modes.
fn selects_drive_mode(ecu: &Ecu) -> bool {
    let menu = ecu.mode.menu();
    menu.home_mode && menu.index.drive_state().is_some_and(DriveState::is_active)
}

fn refuse(ecu: &Ecu, button: Button, interlock: Interlock) {
    warn!("{} ignored: {}", button, interlock);
    ecu.faults
        .raise(FaultCode::ButtonsMonitor, Severity::Defcon5, interlock.diagnostic());
}

fn in_efficiency(ecu: &Ecu) -> bool {
    let state = ecu.mode.snapshot();
    state.functional == FunctionalState::Driving && state.drive == DriveState::Efficiency
}

pub fn press<T: CanTransport>(button: Button, ecu: &Ecu, can: &mut T) {
    debug!("{} pressed", button);
    let mode = &ecu.mode;
    let menu = match button {
        Button::Up => Ok(mode.decrement_menu_index()),
        Button::Down => Ok(mode.increment_menu_index()),
        Button::Select if selects_drive_mode(ecu) => match drive_interlock(ecu) {
            Ok(()) => mode.select_menu_index(),
            Err(interlock) => {
                refuse(ecu, button, interlock);
                Ok(None)
            }
        },
        Button::Select => mode.select_menu_index(),
        Button::Home => match home_interlock(ecu) {
            Ok(()) => mode.set_home_mode().map(Some),
            Err(interlock) => {
                refuse(ecu, button, interlock);
                Ok(None)
            }
        },
        Button::Right => mode.toggle_reverse().map(|_| None),
        Button::PaddleLeft => {
            if in_efficiency(ecu) {
                info!("Torque limit {=u8}%", ecu.torque_limit.increase());
            }
            Ok(None)
        }
        Button::PaddleRight => {
            if in_efficiency(ecu) {
                info!("Torque limit {=u8}%", ecu.torque_limit.decrease());
            }
            Ok(None)
        }
        Button::Left => Ok(None),
    };

    match menu {
        Ok(Some(menu)) => ecu.broadcast_menu(menu, can),
        Ok(None) => {}
        Err(_) => ecu.faults.raise(
            FaultCode::ButtonsMonitor,
            Severity::Defcon5,
            "Transition queue full, button press dropped",
        ),
    }
}
