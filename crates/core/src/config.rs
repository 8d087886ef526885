//! Vehicle configuration data.
//!
//! **WARNING**
//!
//! The pedal calibration and torque limits below were measured on the car.
//! Commanding torque outside of them can damage the drivetrain or make the
//! accelerator behave unexpectedly. Re-measure the pedal box before touching
//! the calibration values.

use embassy_time::Duration;

use crate::error::ConfigError;

// ****************************************************************************
// COMMAND TIMING
// ****************************************************************************

/// Torque commands must reach the motor controller at least this often (Hz).
/// DO NOT ATTEMPT TO SEND TORQUE COMMANDS LESS OFTEN THAN THIS.
pub const MIN_COMMAND_FREQ: u64 = 60;

/// Longest allowed gap between two torque commands (us).
pub const MAX_COMMAND_DELAY_US: u64 = 1_000_000 / MIN_COMMAND_FREQ;

/// Period of the pedal control loop.
pub const PEDAL_LOOP_PERIOD: Duration = Duration::from_millis(10);

/// Raw pedal readings are broadcast this often.
pub const PEDAL_TELEMETRY_PERIOD: Duration = Duration::from_millis(100);

/// Bounded wait of the mode director; the vehicle state is re-broadcast on
/// every expiry.
pub const STATE_HOUSEKEEPING_PERIOD: Duration = Duration::from_millis(100);

/// Drive-enable keep-alive period towards the inverter.
pub const DRIVE_ENABLE_PERIOD: Duration = Duration::from_millis(20);

/// Steering wheel buttons and the TSMS input are sampled this often.
pub const INPUT_POLL_PERIOD: Duration = Duration::from_millis(5);

/// How long the ready-to-drive sound plays.
pub const RTDS_DURATION: Duration = Duration::from_millis(1500);

// ****************************************************************************
// PEDALS
// ****************************************************************************

/// Full scale of the 12 bit pedal ADC.
pub const MAX_ADC_VAL_12B: u32 = 4096;

/// A channel reading above `MAX_ADC_VAL_12B - OPEN_CIRCUIT_MARGIN` is treated
/// as an open circuit.
pub const OPEN_CIRCUIT_MARGIN: u32 = 20;

/// An accelerator channel reading below this is treated as a short to ground.
pub const SHORT_CIRCUIT_THRESHOLD: u32 = 500;

/// Largest allowed difference between the two normalized accelerator
/// channels (% travel).
pub const PEDAL_DIFF_THRESH: u16 = 30;

/// A pedal fault condition must hold this long before it is reported.
pub const PEDAL_FAULT_TIME: Duration = Duration::from_millis(500);

/// Raw brake pressure average above which the brakes count as engaged.
pub const BRAKE_THRESHOLD: u32 = 650;

/// BSPD trips when the brakes are engaged and the accelerator is above this
/// travel (%).
pub const BSPD_ACCEL_TRIP: u16 = 25;

/// A tripped BSPD re-enables the motor once the accelerator is below this
/// travel (%).
pub const BSPD_ACCEL_CLEAR: u16 = 5;

// ****************************************************************************
// TORQUE SHAPING
// ****************************************************************************

/// Peak motor torque (Nm).
pub const MAX_TORQUE: f32 = 230.0;

/// Speed cap of pit and reverse mode (mph).
pub const PIT_MAX_SPEED: f32 = 5.0;

/// Highest fraction of `MAX_TORQUE` available in pit and reverse mode.
pub const PIT_MAX_TORQUE_FRACTION: f32 = 0.3;

/// Number of torque samples averaged in pit and reverse mode.
pub const ACCUMULATOR_SIZE: usize = 10;

/// Accelerator travel (0-1) above which efficiency mode commands forward
/// torque.
pub const ACCELERATION_THRESHOLD: f32 = 0.25;

/// Accelerator travel (0-1) at or below which efficiency mode regenerates.
pub const REGEN_THRESHOLD: f32 = 0.15;

/// No regen below this speed (km/h).
pub const REGEN_MIN_SPEED_KMH: f32 = 2.0;

pub const MPH_TO_KMH: f32 = 1.609;

/// Maximum AC regen current (A).
pub const MAX_REGEN_CURRENT: f32 = 50.0;

/// Brake pressure reading at which brake-pedal regen reaches its maximum.
pub const BRAKE_REGEN_FULL_SCALE: f32 = 1000.0;

/// Brake pressure reading above which brake-pedal regen starts.
pub const BRAKE_REGEN_THRESHOLD: u32 = 650;

// ****************************************************************************
// MOTOR & DRIVETRAIN
// ****************************************************************************

/// CAN node id of the DTI inverter.
pub const INVERTER_NODE_ID: u8 = 30;

/// Motor torque constant (Nm/A).
pub const MOTOR_KT: f32 = 0.61;

/// Peak phase current (A rms).
pub const MOTOR_PEAK_CURRENT: f32 = 380.0;

pub const MOTOR_POLE_PAIRS: f32 = 10.0;

/// Motor revolutions per wheel revolution.
pub const GEAR_RATIO: f32 = 47.0 / 13.0;

/// Loaded tyre diameter (inches).
pub const WHEEL_DIAMETER_IN: f32 = 16.0;

// ****************************************************************************
// DEBOUNCING & QUEUES
// ****************************************************************************

pub const TSMS_DEBOUNCE_PERIOD: Duration = Duration::from_millis(500);

pub const STEERING_WHEEL_DEBOUNCE: Duration = Duration::from_millis(25);

/// Drive modes and the home screen are only entered from the operator
/// controls at or below this speed (mph).
pub const STATIONARY_SPEED_MPH: f32 = 1.0;

pub const FAULT_QUEUE_SIZE: usize = 16;

pub const TRANSITION_QUEUE_SIZE: usize = 8;

/// Outgoing frames buffered between producers and the CAN writer task.
pub const CAN_TX_QUEUE_SIZE: usize = 32;

/// Offset and full-travel reading of one accelerator channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PedalCalibration {
    pub offset: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PedalConfig {
    pub accel1: PedalCalibration,
    pub accel2: PedalCalibration,
    pub brake_threshold: u32,
    /// Regenerate from the brake pedal instead of the accelerator in
    /// efficiency mode.
    pub brake_regen: bool,
}

impl PedalConfig {
    pub const DEFAULT: PedalConfig = PedalConfig {
        accel1: PedalCalibration { offset: 980, max: 1866 },
        accel2: PedalCalibration { offset: 1780, max: 3365 },
        brake_threshold: BRAKE_THRESHOLD,
        brake_regen: false,
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accel1.max <= self.accel1.offset || self.accel2.max <= self.accel2.offset {
            return Err(ConfigError::PedalCalibration);
        }
        Ok(())
    }
}

impl Default for PedalConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Control loop period that honours [`MIN_COMMAND_FREQ`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlPeriod(Duration);

impl ControlPeriod {
    pub fn new(period: Duration) -> Result<Self, ConfigError> {
        let period_us = period.as_micros();
        if period_us == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        if period_us > MAX_COMMAND_DELAY_US {
            return Err(ConfigError::CommandPeriodTooSlow {
                period_us,
                max_us: MAX_COMMAND_DELAY_US,
            });
        }
        Ok(ControlPeriod(period))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}
