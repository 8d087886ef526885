//! Vehicle mode controller.
//!
//! [`VehicleMode`] is the shared face of the state machine: any task may read
//! the committed state lock-free, queue transition requests and drive the
//! menu. Exactly one [`ModeDirector`] exists; it consumes requests in arrival
//! order, validates them against the transition table, and is the only code
//! that ever writes the state.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::can::{self, CanTransport};
use crate::config::TRANSITION_QUEUE_SIZE;
use crate::error::QueueFull;
use crate::fault::{FaultCode, FaultManager, Severity};
use crate::menu::{Menu, MenuState};
use crate::traits::VehicleOutputs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FunctionalState {
    Boot = 0,
    Ready = 1,
    Driving = 2,
    Faulted = 3,
}

impl FunctionalState {
    pub const ALL: [FunctionalState; 4] = [
        FunctionalState::Boot,
        FunctionalState::Ready,
        FunctionalState::Driving,
        FunctionalState::Faulted,
    ];

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => FunctionalState::Boot,
            1 => FunctionalState::Ready,
            2 => FunctionalState::Driving,
            _ => FunctionalState::Faulted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DriveState {
    /// Driving, no mode chosen yet.
    NotDriving = 0,
    Reverse = 1,
    Pit = 2,
    Efficiency = 3,
    Performance = 4,
    NeroOnly = 5,
}

impl DriveState {
    pub const ALL: [DriveState; 6] = [
        DriveState::NotDriving,
        DriveState::Reverse,
        DriveState::Pit,
        DriveState::Efficiency,
        DriveState::Performance,
        DriveState::NeroOnly,
    ];

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => DriveState::Reverse,
            2 => DriveState::Pit,
            3 => DriveState::Efficiency,
            4 => DriveState::Performance,
            5 => DriveState::NeroOnly,
            _ => DriveState::NotDriving,
        }
    }

    /// Modes in which the motor may produce torque.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            DriveState::Reverse | DriveState::Pit | DriveState::Efficiency | DriveState::Performance
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VehicleState {
    pub functional: FunctionalState,
    pub drive: DriveState,
}

impl VehicleState {
    pub const BOOT: VehicleState = VehicleState {
        functional: FunctionalState::Boot,
        drive: DriveState::NotDriving,
    };

    pub const fn is_active(&self) -> bool {
        matches!(self.functional, FunctionalState::Driving) && self.drive.is_active()
    }

    const fn pack(self) -> u8 {
        ((self.functional as u8) << 4) | self.drive as u8
    }

    const fn unpack(raw: u8) -> Self {
        VehicleState {
            functional: FunctionalState::from_u8(raw >> 4),
            drive: DriveState::from_u8(raw & 0x0F),
        }
    }
}

// rows: current state, columns: requested state (Boot, Ready, Driving, Faulted)
const TRANSITIONS: [[bool; 4]; 4] = [
    [true, true, false, true],
    [false, true, true, true],
    [false, true, true, true],
    [false, true, false, false],
];

pub const fn transition_allowed(from: FunctionalState, to: FunctionalState) -> bool {
    TRANSITIONS[from as usize][to as usize]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionRequest {
    pub functional: FunctionalState,
    /// Only meaningful when `functional` is `Driving`.
    pub drive: Option<DriveState>,
}

impl TransitionRequest {
    pub const fn functional(functional: FunctionalState) -> Self {
        TransitionRequest {
            functional,
            drive: None,
        }
    }

    pub const fn driving(drive: DriveState) -> Self {
        TransitionRequest {
            functional: FunctionalState::Driving,
            drive: Some(drive),
        }
    }
}

pub struct VehicleMode {
    state: AtomicU8,
    requests: Channel<CriticalSectionRawMutex, TransitionRequest, TRANSITION_QUEUE_SIZE>,
    pending_fault: AtomicBool,
    director_taken: AtomicBool,
    menu: Menu,
}

impl VehicleMode {
    pub const fn new() -> Self {
        VehicleMode {
            state: AtomicU8::new(VehicleState::BOOT.pack()),
            requests: Channel::new(),
            pending_fault: AtomicBool::new(false),
            director_taken: AtomicBool::new(false),
            menu: Menu::new(),
        }
    }

    /// Hands out the single writer of the state. Returns `None` once a
    /// director has been created.
    pub fn director<'a, O, T>(
        &'a self,
        faults: &'a FaultManager,
        outputs: O,
        can: T,
    ) -> Option<ModeDirector<'a, O, T>>
    where
        O: VehicleOutputs,
        T: CanTransport,
    {
        if self.director_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        let mut director = ModeDirector {
            mode: self,
            faults,
            outputs,
            can,
        };
        director.apply(TransitionRequest::functional(FunctionalState::Ready));
        Some(director)
    }

    pub fn snapshot(&self) -> VehicleState {
        VehicleState::unpack(self.state.load(Ordering::Acquire))
    }

    pub fn get_functional_state(&self) -> FunctionalState {
        self.snapshot().functional
    }

    pub fn get_drive_state(&self) -> DriveState {
        self.snapshot().drive
    }

    pub fn is_active(&self) -> bool {
        self.snapshot().is_active()
    }

    pub fn request(&self, request: TransitionRequest) -> Result<(), QueueFull> {
        self.requests.try_send(request).map_err(|_| {
            warn!("Transition queue full, dropping {}", request);
            QueueFull
        })
    }

    pub fn request_transition(
        &self,
        functional: FunctionalState,
        drive: Option<DriveState>,
    ) -> Result<(), QueueFull> {
        self.request(TransitionRequest { functional, drive })
    }

    /// Forces a FAULTED transition on the director's next wake-up.
    pub fn latch_pending_fault(&self) {
        self.pending_fault.store(true, Ordering::Release);
    }

    pub fn menu(&self) -> MenuState {
        self.menu.get()
    }

    pub fn increment_menu_index(&self) -> Option<MenuState> {
        self.menu.increment()
    }

    pub fn decrement_menu_index(&self) -> Option<MenuState> {
        self.menu.decrement()
    }

    /// Selects the highlighted entry. Returns the new menu state when a
    /// drive mode was requested; `None` outside home mode or for entries
    /// without a drive mode.
    pub fn select_menu_index(&self) -> Result<Option<MenuState>, QueueFull> {
        self.menu
            .select(|drive| self.request(TransitionRequest::driving(drive)))
    }

    /// Returns to the home screen and asks to leave DRIVING/FAULTED.
    pub fn set_home_mode(&self) -> Result<MenuState, QueueFull> {
        let menu = self.menu.enter_home();
        self.request(TransitionRequest::functional(FunctionalState::Ready))?;
        Ok(menu)
    }

    /// Swaps between PIT and REVERSE while driving in one of them. Returns
    /// whether a request was issued.
    pub fn toggle_reverse(&self) -> Result<bool, QueueFull> {
        if self.menu.get().home_mode {
            return Ok(false);
        }
        let state = self.snapshot();
        if state.functional != FunctionalState::Driving {
            return Ok(false);
        }
        let target = match state.drive {
            DriveState::Pit => DriveState::Reverse,
            DriveState::Reverse => DriveState::Pit,
            _ => return Ok(false),
        };
        self.request(TransitionRequest::driving(target))?;
        Ok(true)
    }

    pub async fn next_request(&self) -> TransitionRequest {
        self.requests.receive().await
    }

    fn commit(&self, state: VehicleState) {
        self.state.store(state.pack(), Ordering::Release);
    }
}

impl Default for VehicleMode {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of handling one transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    Committed(VehicleState),
    Rejected {
        from: FunctionalState,
        to: FunctionalState,
    },
}

/// The single writer of the vehicle state.
pub struct ModeDirector<'a, O, T> {
    mode: &'a VehicleMode,
    faults: &'a FaultManager,
    outputs: O,
    can: T,
}

impl<'a, O, T> ModeDirector<'a, O, T>
where
    O: VehicleOutputs,
    T: CanTransport,
{
    pub fn mode(&self) -> &'a VehicleMode {
        self.mode
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn can(&self) -> &T {
        &self.can
    }

    /// Validates and commits one request.
    pub fn apply(&mut self, request: TransitionRequest) -> Transition {
        let current = self.mode.snapshot();
        if !transition_allowed(current.functional, request.functional) {
            warn!(
                "Rejected transition {} -> {}",
                current.functional, request.functional
            );
            self.faults.raise(
                FaultCode::InvalidTransition,
                Severity::Defcon5,
                "Invalid state transition",
            );
            return Transition::Rejected {
                from: current.functional,
                to: request.functional,
            };
        }

        let next = VehicleState {
            functional: request.functional,
            drive: match request.functional {
                FunctionalState::Driving => request.drive.unwrap_or(DriveState::NotDriving),
                _ => DriveState::NotDriving,
            },
        };
        self.mode.commit(next);
        info!("Vehicle state {} -> {}", current, next);

        if next != current {
            self.enter(current, next);
        }
        self.broadcast();
        Transition::Committed(next)
    }

    /// Handles a pending-fault latch, then `request`.
    pub fn handle(&mut self, request: TransitionRequest) -> Transition {
        self.honour_pending_fault();
        self.apply(request)
    }

    /// Drains every queued request; returns how many were handled.
    pub fn process_pending(&mut self) -> usize {
        self.honour_pending_fault();
        let mut handled = 0;
        while let Ok(request) = self.mode.requests.try_receive() {
            self.apply(request);
            handled += 1;
        }
        handled
    }

    /// Periodic work done when no request arrived within the bounded wait.
    pub fn housekeeping(&mut self) {
        self.honour_pending_fault();
        self.broadcast();
    }

    fn honour_pending_fault(&mut self) {
        if self.mode.pending_fault.swap(false, Ordering::AcqRel) {
            warn!("Honouring latched fault escalation");
            self.apply(TransitionRequest::functional(FunctionalState::Faulted));
        }
    }

    fn enter(&mut self, from: VehicleState, to: VehicleState) {
        let result = match to.functional {
            FunctionalState::Driving if to.is_active() => {
                let rtds = if from.is_active() {
                    Ok(())
                } else {
                    self.outputs.sound_rtds()
                };
                rtds.and(self.outputs.write_pump(true))
                    .and(self.outputs.write_fault(true))
            }
            FunctionalState::Ready => self
                .outputs
                .write_pump(false)
                .and(self.outputs.write_fault(true)),
            FunctionalState::Faulted => {
                self.mode.menu.reset();
                self.outputs
                    .write_pump(false)
                    .and(self.outputs.write_fault(false))
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            error!("Failed to drive vehicle outputs: {}", e);
            self.faults
                .raise(FaultCode::LvMonitor, Severity::Defcon5, "Failed to drive vehicle outputs");
        }
    }

    fn broadcast(&mut self) {
        let frame = can::state_status(self.mode.snapshot(), self.mode.menu());
        if let Err(e) = frame.and_then(|f| self.can.send(&f)) {
            debug!("Failed to broadcast vehicle state: {}", e);
            self.faults
                .raise(FaultCode::CanDispatch, Severity::Defcon5, "Failed to send state frame");
        }
    }
}
