//! Scalars shared between the control loop and the slower tasks.

use core::cell::Cell;
use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::traits::Brakelight;

/// Brake-engaged flag written by the control loop and mirrored onto the
/// brakelight by its own task.
pub struct BrakeState {
    engaged: Mutex<CriticalSectionRawMutex, Cell<bool>>,
    changed: Signal<CriticalSectionRawMutex, bool>,
}

impl BrakeState {
    pub const fn new() -> Self {
        BrakeState {
            engaged: Mutex::new(Cell::new(false)),
            changed: Signal::new(),
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.lock(|e| e.get())
    }

    /// Stores the new value and wakes the brakelight task on a change.
    pub fn publish(&self, engaged: bool) {
        let previous = self.engaged.lock(|e| e.replace(engaged));
        if previous != engaged {
            self.changed.signal(engaged);
        }
    }

    pub fn apply<B: Brakelight>(&self, light: &mut B) {
        light.write_brakelight(self.is_engaged());
    }

    pub async fn run_brakelight<B: Brakelight>(&self, light: &mut B) -> ! {
        self.apply(light);
        loop {
            self.changed.wait().await;
            self.apply(light);
        }
    }
}

impl Default for BrakeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver adjustable cap on forward torque in efficiency mode (percent).
pub struct TorqueLimit {
    percent: AtomicU8,
}

impl TorqueLimit {
    pub const STEP: u8 = 10;
    pub const MAX: u8 = 100;

    pub const fn new() -> Self {
        TorqueLimit {
            percent: AtomicU8::new(Self::MAX),
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }

    pub fn fraction(&self) -> f32 {
        self.percent() as f32 / 100.0
    }

    pub fn increase(&self) -> u8 {
        self.adjust(|p| p.saturating_add(Self::STEP).min(Self::MAX))
    }

    pub fn decrease(&self) -> u8 {
        self.adjust(|p| p.saturating_sub(Self::STEP))
    }

    fn adjust(&self, f: impl Fn(u8) -> u8) -> u8 {
        match self
            .percent
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |p| Some(f(p)))
        {
            Ok(previous) | Err(previous) => f(previous),
        }
    }
}

impl Default for TorqueLimit {
    fn default() -> Self {
        Self::new()
    }
}
