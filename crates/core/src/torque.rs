//! Mode dependent mapping from pedal travel to a motor command.

use heapless::HistoryBuffer;

use crate::config::{
    ACCELERATION_THRESHOLD, ACCUMULATOR_SIZE, BRAKE_REGEN_FULL_SCALE, BRAKE_REGEN_THRESHOLD,
    MAX_REGEN_CURRENT, MAX_TORQUE, MPH_TO_KMH, PIT_MAX_SPEED, PIT_MAX_TORQUE_FRACTION,
    REGEN_MIN_SPEED_KMH, REGEN_THRESHOLD,
};
use crate::state_machine::{DriveState, FunctionalState, VehicleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TorqueCommand {
    /// Nm, negative in reverse.
    Torque(i16),
    /// 0.1 A
    RegenCurrent(u16),
    /// 0.1 A
    BrakeCurrent(u16),
}

impl TorqueCommand {
    pub const ZERO: TorqueCommand = TorqueCommand::Torque(0);
}

/// Everything torque shaping needs about the current iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapingInput {
    pub state: VehicleState,
    /// Accelerator travel, 0-100.
    pub accel_norm: u16,
    /// Average raw brake pressure.
    pub brake_raw: u32,
    pub speed_mph: f32,
    /// Efficiency mode forward torque cap, 0-100.
    pub torque_limit: u8,
    pub brake_regen: bool,
}

/// Linear accelerator map. Travel reading exactly 1% is the idle offset of
/// the pedal box and commands nothing.
pub fn linear_accel_to_torque(accel: f32) -> i16 {
    let offset = accel - 0.01;
    if offset > -0.001 && offset < 0.001 {
        return 0;
    }
    (accel * MAX_TORQUE) as i16
}

fn speed_kmh(mph: f32) -> f32 {
    mph * MPH_TO_KMH
}

/// Speed-capped torque for pit and reverse, smoothed over the last
/// [`ACCUMULATOR_SIZE`] iterations.
pub struct Derate {
    history: HistoryBuffer<i16, ACCUMULATOR_SIZE>,
}

impl Derate {
    pub fn new() -> Self {
        Derate {
            history: HistoryBuffer::new_with(0),
        }
    }

    pub fn reset(&mut self) {
        self.history = HistoryBuffer::new_with(0);
    }

    /// Unsmoothed torque ceiling at `mph` for pedal travel `accel` (0-1).
    pub fn limit(mph: f32, accel: f32) -> i16 {
        // reverse reports negative speed
        let speed = if mph < 0.0 { -mph } else { mph };
        if speed >= PIT_MAX_SPEED {
            return 0;
        }
        let speed_factor = 1.0 - speed / PIT_MAX_SPEED;
        (accel * MAX_TORQUE * PIT_MAX_TORQUE_FRACTION * speed_factor) as i16
    }

    pub fn update(&mut self, mph: f32, accel: f32) -> i16 {
        self.history.write(Self::limit(mph, accel));
        let sum: i32 = self.history.as_slice().iter().map(|&t| t as i32).sum();
        (sum / ACCUMULATOR_SIZE as i32) as i16
    }
}

impl Default for Derate {
    fn default() -> Self {
        Self::new()
    }
}

pub fn efficiency(accel: f32, mph: f32, torque_fraction: f32) -> TorqueCommand {
    if accel > ACCELERATION_THRESHOLD {
        let torque = MAX_TORQUE * (accel - ACCELERATION_THRESHOLD) / (1.0 - ACCELERATION_THRESHOLD);
        let torque = (torque * torque_fraction).clamp(0.0, MAX_TORQUE);
        return TorqueCommand::Torque(torque as i16);
    }

    if accel <= REGEN_THRESHOLD && speed_kmh(mph) > REGEN_MIN_SPEED_KMH {
        let regen = MAX_REGEN_CURRENT * (REGEN_THRESHOLD - accel) / REGEN_THRESHOLD;
        let regen = regen.clamp(0.0, MAX_REGEN_CURRENT);
        return TorqueCommand::RegenCurrent((regen * 10.0) as u16);
    }

    TorqueCommand::ZERO
}

/// Efficiency variant regenerating from the brake pedal.
pub fn brake_pedal_regen(brake_raw: u32, accel: f32, mph: f32) -> TorqueCommand {
    if brake_raw > BRAKE_REGEN_THRESHOLD && speed_kmh(mph) > REGEN_MIN_SPEED_KMH {
        let current = (brake_raw as f32 / BRAKE_REGEN_FULL_SCALE * MAX_REGEN_CURRENT)
            .clamp(0.0, MAX_REGEN_CURRENT);
        return TorqueCommand::BrakeCurrent((current * 10.0) as u16);
    }
    TorqueCommand::Torque(linear_accel_to_torque(accel))
}

/// Owns the state torque shaping carries between iterations.
pub struct TorqueShaper {
    derate: Derate,
    derating: bool,
}

impl TorqueShaper {
    pub fn new() -> Self {
        TorqueShaper {
            derate: Derate::new(),
            derating: false,
        }
    }

    pub fn shape(&mut self, input: &ShapingInput) -> TorqueCommand {
        let accel = input.accel_norm.min(100) as f32 / 100.0;
        let drive = match input.state.functional {
            FunctionalState::Driving => input.state.drive,
            _ => DriveState::NotDriving,
        };

        let derating = matches!(drive, DriveState::Pit | DriveState::Reverse);
        if derating != self.derating {
            self.derate.reset();
            self.derating = derating;
        }

        match drive {
            DriveState::Performance => TorqueCommand::Torque(linear_accel_to_torque(accel)),
            DriveState::Pit => TorqueCommand::Torque(self.derate.update(input.speed_mph, accel)),
            DriveState::Reverse => {
                TorqueCommand::Torque(-self.derate.update(input.speed_mph, accel))
            }
            DriveState::Efficiency if input.brake_regen => {
                brake_pedal_regen(input.brake_raw, accel, input.speed_mph)
            }
            DriveState::Efficiency => efficiency(
                accel,
                input.speed_mph,
                input.torque_limit.min(100) as f32 / 100.0,
            ),
            DriveState::NotDriving | DriveState::NeroOnly => TorqueCommand::ZERO,
        }
    }
}

impl Default for TorqueShaper {
    fn default() -> Self {
        Self::new()
    }
}
