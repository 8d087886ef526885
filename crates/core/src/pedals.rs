//! Pedal control loop.
//!
//! One [`PedalController::step`] per control period: sample the pedal box,
//! debounce sensor faults, publish the brake state, enforce the BSPD
//! interlock and issue the torque command for the current vehicle mode.
//! The caller owns the timing and passes the current time in.

use embassy_time::{Duration, Instant};

use crate::can;
use crate::can::CanTransport;
use crate::config::{
    ControlPeriod, PedalCalibration, PedalConfig, BSPD_ACCEL_CLEAR, BSPD_ACCEL_TRIP,
    MAX_ADC_VAL_12B, OPEN_CIRCUIT_MARGIN, PEDAL_DIFF_THRESH, PEDAL_FAULT_TIME,
    PEDAL_TELEMETRY_PERIOD, SHORT_CIRCUIT_THRESHOLD,
};
use crate::debounce::{debounce, DebounceTimer};
use crate::ecu::Ecu;
use crate::error::ConfigError;
use crate::fault::{FaultCode, FaultManager, Severity};
use crate::torque::{ShapingInput, TorqueCommand, TorqueShaper};
use crate::traits::{MotorController, PedalSensors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawPedals {
    pub accel1: u32,
    pub accel2: u32,
    pub brake1: u32,
    pub brake2: u32,
}

impl RawPedals {
    pub fn brake_avg(&self) -> u32 {
        ((self.brake1 as u64 + self.brake2 as u64) / 2) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PedalSample {
    /// Accelerator travel, 0-100.
    pub accel_norm: u16,
    pub brake_raw: u32,
}

/// Percent travel of one accelerator channel, clamped to 0-100.
pub fn adjust_pedal_val(raw: u32, calibration: PedalCalibration) -> u16 {
    let span = calibration.max.saturating_sub(calibration.offset);
    let travel = raw
        .saturating_sub(calibration.offset)
        .saturating_mul(100)
        .checked_div(span)
        .unwrap_or(0);
    travel.min(100) as u16
}

fn is_open_circuit(raw: u32) -> bool {
    raw > MAX_ADC_VAL_12B - OPEN_CIRCUIT_MARGIN
}

/// Debounced sensor fault detectors. Every check runs on every sample.
#[derive(Debug, Default)]
struct SensorChecks {
    accel_open_circuit: DebounceTimer,
    accel_short_circuit: DebounceTimer,
    accel_mismatch: DebounceTimer,
    brake_open_circuit: DebounceTimer,
}

impl SensorChecks {
    fn run(&mut self, raw: &RawPedals, norm1: u16, norm2: u16, now: Instant, faults: &FaultManager) {
        let period = PEDAL_FAULT_TIME;

        debounce(
            is_open_circuit(raw.accel1) || is_open_circuit(raw.accel2),
            &mut self.accel_open_circuit,
            now,
            period,
            || {
                error!("Accelerator open circuit");
                faults.raise(FaultCode::OnboardPedal, Severity::Defcon1, "Pedal open circuit fault");
            },
        );

        debounce(
            raw.accel1 < SHORT_CIRCUIT_THRESHOLD || raw.accel2 < SHORT_CIRCUIT_THRESHOLD,
            &mut self.accel_short_circuit,
            now,
            period,
            || {
                error!("Accelerator short circuit");
                faults.raise(FaultCode::OnboardPedal, Severity::Defcon1, "Pedal short circuit fault");
            },
        );

        debounce(
            norm1.abs_diff(norm2) > PEDAL_DIFF_THRESH,
            &mut self.accel_mismatch,
            now,
            period,
            || {
                error!("Accelerator channels disagree: {=u16} vs {=u16}", norm1, norm2);
                faults.raise(FaultCode::OnboardPedal, Severity::Defcon1, "Pedal mismatch fault");
            },
        );

        debounce(
            is_open_circuit(raw.brake1) || is_open_circuit(raw.brake2),
            &mut self.brake_open_circuit,
            now,
            period,
            || {
                error!("Brake sensor open circuit");
                faults.raise(FaultCode::OnboardBrake, Severity::Defcon1, "Brake open circuit fault");
            },
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BspdStatus {
    Clear,
    /// Latched this iteration.
    Tripped,
    /// Still latched from an earlier trip.
    Latched,
}

impl BspdStatus {
    pub fn motor_disabled(self) -> bool {
        self != BspdStatus::Clear
    }
}

/// Brake/accelerator plausibility latch with hysteresis.
#[derive(Debug, Default)]
pub struct Bspd {
    motor_disabled: bool,
}

impl Bspd {
    pub fn update(&mut self, brake_engaged: bool, accel_norm: u16) -> BspdStatus {
        if self.motor_disabled {
            if accel_norm < BSPD_ACCEL_CLEAR {
                self.motor_disabled = false;
                return BspdStatus::Clear;
            }
            return BspdStatus::Latched;
        }
        if brake_engaged && accel_norm > BSPD_ACCEL_TRIP {
            self.motor_disabled = true;
            return BspdStatus::Tripped;
        }
        BspdStatus::Clear
    }

    pub fn motor_disabled(&self) -> bool {
        self.motor_disabled
    }
}

/// Result of one control iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    /// `None` when the pedals could not be read.
    pub sample: Option<PedalSample>,
    pub brake_engaged: bool,
    pub bspd: BspdStatus,
    pub command: TorqueCommand,
}

pub struct PedalController {
    config: PedalConfig,
    period: ControlPeriod,
    checks: SensorChecks,
    bspd: Bspd,
    shaper: TorqueShaper,
    next_telemetry: Option<Instant>,
}

impl PedalController {
    pub fn new(config: PedalConfig, period: ControlPeriod) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(PedalController {
            config,
            period,
            checks: SensorChecks::default(),
            bspd: Bspd::default(),
            shaper: TorqueShaper::new(),
            next_telemetry: None,
        })
    }

    pub fn period(&self) -> Duration {
        self.period.duration()
    }

    pub fn bspd(&self) -> &Bspd {
        &self.bspd
    }

    pub fn step<S, M, T>(
        &mut self,
        now: Instant,
        sensors: &mut S,
        motor: &mut M,
        can: &mut T,
        ecu: &Ecu,
    ) -> Iteration
    where
        S: PedalSensors,
        M: MotorController,
        T: CanTransport,
    {
        let raw = match sensors.read_pedals() {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to read pedals: {}", e);
                ecu.faults.raise(
                    FaultCode::OnboardPedal,
                    Severity::Defcon1,
                    "Failed to collect pedal ADC data",
                );
                let command = self.issue(TorqueCommand::ZERO, motor, &ecu.faults);
                return Iteration {
                    sample: None,
                    brake_engaged: ecu.brake.is_engaged(),
                    bspd: if self.bspd.motor_disabled() {
                        BspdStatus::Latched
                    } else {
                        BspdStatus::Clear
                    },
                    command,
                };
            }
        };

        let norm1 = adjust_pedal_val(raw.accel1, self.config.accel1);
        let norm2 = adjust_pedal_val(raw.accel2, self.config.accel2);
        let sample = PedalSample {
            accel_norm: (norm1 + norm2) / 2,
            brake_raw: raw.brake_avg(),
        };

        self.checks.run(&raw, norm1, norm2, now, &ecu.faults);

        let brake_engaged = sample.brake_raw > self.config.brake_threshold;
        ecu.brake.publish(brake_engaged);

        self.send_telemetry(now, &raw, can, &ecu.faults);

        let bspd = self.bspd.update(brake_engaged, sample.accel_norm);
        if bspd == BspdStatus::Tripped {
            warn!("BSPD tripped at {=u16}% accelerator", sample.accel_norm);
            ecu.faults.raise(
                FaultCode::BspdPrefault,
                Severity::Defcon5,
                "BSPD prefault triggered",
            );
        }
        if bspd.motor_disabled() {
            let command = self.issue(TorqueCommand::ZERO, motor, &ecu.faults);
            return Iteration {
                sample: Some(sample),
                brake_engaged,
                bspd,
                command,
            };
        }

        let command = self.shaper.shape(&ShapingInput {
            state: ecu.mode.snapshot(),
            accel_norm: sample.accel_norm,
            brake_raw: sample.brake_raw,
            speed_mph: motor.speed_mph(),
            torque_limit: ecu.torque_limit.percent(),
            brake_regen: self.config.brake_regen,
        });
        let command = self.issue(command, motor, &ecu.faults);

        Iteration {
            sample: Some(sample),
            brake_engaged,
            bspd,
            command,
        }
    }

    fn issue<M: MotorController>(
        &mut self,
        command: TorqueCommand,
        motor: &mut M,
        faults: &FaultManager,
    ) -> TorqueCommand {
        let result = match command {
            TorqueCommand::Torque(torque) => motor.set_torque(torque),
            TorqueCommand::RegenCurrent(current) => motor.set_regen_current(current),
            TorqueCommand::BrakeCurrent(current) => motor.set_brake_current(current),
        };
        if let Err(e) = result {
            error!("Failed to send motor command: {}", e);
            faults.raise(FaultCode::CanDispatch, Severity::Defcon2, "Failed to send motor command");
        }
        command
    }

    fn send_telemetry<T: CanTransport>(
        &mut self,
        now: Instant,
        raw: &RawPedals,
        can: &mut T,
        faults: &FaultManager,
    ) {
        if self.next_telemetry.is_some_and(|due| now < due) {
            return;
        }
        self.next_telemetry = Some(now + PEDAL_TELEMETRY_PERIOD);

        let sent = can::pedal_telemetry(raw).and_then(|frames| {
            frames.iter().try_for_each(|frame| can.send(frame))
        });
        if let Err(e) = sent {
            debug!("Failed to send pedal telemetry: {}", e);
            faults.raise(FaultCode::CanDispatch, Severity::Defcon5, "Failed to send pedal data");
        }
    }
}
