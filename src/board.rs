//! Board side of the core traits: ADC pedal box, PDU outputs, brakelight and
//! the queued CAN transmitter.

use embassy_stm32::adc::{Adc, AnyAdcChannel};
use embassy_stm32::gpio::{Level, Output};
use embassy_stm32::peripherals::ADC1;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use race_ecu_core::can::{CanMessage, CanTransport};
use race_ecu_core::config::CAN_TX_QUEUE_SIZE;
use race_ecu_core::pedals::RawPedals;
use race_ecu_core::traits::{Brakelight, DiagnosticSink, PedalSensors, VehicleOutputs};
use race_ecu_core::{SensorError, TransportError};

/// Frames waiting for the FDCAN2 writer task.
pub static CAN_TX: Channel<CriticalSectionRawMutex, CanMessage, CAN_TX_QUEUE_SIZE> = Channel::new();

/// Raised by the PDU when the ready-to-drive sound should play.
pub static RTDS: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Hands frames to the writer task without waiting for a mailbox.
pub struct CanQueue;

impl CanTransport for CanQueue {
    fn send(&mut self, message: &CanMessage) -> Result<(), TransportError> {
        CAN_TX.try_send(*message).map_err(|_| TransportError::MailboxFull)
    }
}

pub struct PedalBox {
    adc: Adc<'static, ADC1>,
    accel1: AnyAdcChannel<ADC1>,
    accel2: AnyAdcChannel<ADC1>,
    brake1: AnyAdcChannel<ADC1>,
    brake2: AnyAdcChannel<ADC1>,
}

impl PedalBox {
    pub fn new(
        adc: Adc<'static, ADC1>,
        accel1: AnyAdcChannel<ADC1>,
        accel2: AnyAdcChannel<ADC1>,
        brake1: AnyAdcChannel<ADC1>,
        brake2: AnyAdcChannel<ADC1>,
    ) -> Self {
        PedalBox {
            adc,
            accel1,
            accel2,
            brake1,
            brake2,
        }
    }
}

impl PedalSensors for PedalBox {
    fn read_pedals(&mut self) -> Result<RawPedals, SensorError> {
        Ok(RawPedals {
            accel1: self.adc.blocking_read(&mut self.accel1) as u32,
            accel2: self.adc.blocking_read(&mut self.accel2) as u32,
            brake1: self.adc.blocking_read(&mut self.brake1) as u32,
            brake2: self.adc.blocking_read(&mut self.brake2) as u32,
        })
    }
}

/// Power distribution outputs. The buzzer itself belongs to the RTDS task.
pub struct Pdu {
    pump: Output<'static>,
    fault: Output<'static>,
}

impl Pdu {
    pub fn new(pump: Output<'static>, fault: Output<'static>) -> Self {
        Pdu { pump, fault }
    }
}

impl VehicleOutputs for Pdu {
    fn sound_rtds(&mut self) -> Result<(), SensorError> {
        RTDS.signal(());
        Ok(())
    }

    fn write_pump(&mut self, on: bool) -> Result<(), SensorError> {
        self.pump.set_level(Level::from(on));
        Ok(())
    }

    fn write_fault(&mut self, ok: bool) -> Result<(), SensorError> {
        self.fault.set_level(Level::from(ok));
        Ok(())
    }
}

pub struct BrakeLamp(pub Output<'static>);

impl Brakelight for BrakeLamp {
    fn write_brakelight(&mut self, on: bool) {
        self.0.set_level(Level::from(on));
    }
}

/// Diagnostics go out over RTT next to the rest of the log.
pub struct RttDiagnostics;

impl DiagnosticSink for RttDiagnostics {
    fn log_diagnostic(&mut self, text: &str) {
        info!("{}", text);
    }
}
