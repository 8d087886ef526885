#![no_std]
#![no_main]

mod fmt;
mod board;

use core::sync::atomic::{AtomicU16, Ordering};

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::{InterruptExecutor, Spawner};
use embassy_futures::select::{select, Either};
use embassy_stm32::adc::{Adc, AdcChannel, SampleTime};
use embassy_stm32::can::filter::{ExtendedFilter, ExtendedFilterSlot, StandardFilter, StandardFilterSlot};
use embassy_stm32::can::{self, frame, CanRx, CanTx};
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::peripherals::FDCAN2;
use embassy_stm32::time::mhz;
use embassy_stm32::{bind_interrupts, Config};
use embassy_time::{Instant, Ticker, Timer};
use embedded_can::Id;
use race_ecu_core::can::STEERING_IO_ID;
use race_ecu_core::config::{
    ControlPeriod, PedalConfig, DRIVE_ENABLE_PERIOD, INPUT_POLL_PERIOD, PEDAL_LOOP_PERIOD, RTDS_DURATION,
    STATE_HOUSEKEEPING_PERIOD,
};
use race_ecu_core::dti::Dti;
use race_ecu_core::fault::{FaultCode, Severity};
use race_ecu_core::monitor::TsmsMonitor;
use race_ecu_core::pedals::PedalController;
use race_ecu_core::steering::{decode_buttons, SteeringWheel};
use race_ecu_core::Ecu;

use crate::board::{BrakeLamp, CanQueue, PedalBox, Pdu, RttDiagnostics, CAN_TX, RTDS};

bind_interrupts!(struct Irqs2 {
    FDCAN2_IT0 => can::IT0InterruptHandler<FDCAN2>;
    FDCAN2_IT1 => can::IT1InterruptHandler<FDCAN2>;
});

static ECU: Ecu = Ecu::new();

/// Latest button bits from the steering wheel, written by the CAN reader.
static STEERING_BUTTONS: AtomicU16 = AtomicU16::new(0);

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_MED: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART4() {
    EXECUTOR_HIGH.on_interrupt()
}

#[interrupt]
unsafe fn UART5() {
    EXECUTOR_MED.on_interrupt()
}

#[embassy_executor::task]
async fn pedal_loop(mut controller: PedalController, mut pedals: PedalBox) {
    let mut motor = Dti::new(CanQueue, &ECU.inverter);
    let mut telemetry = CanQueue;
    let mut ticker = Ticker::every(controller.period());
    loop {
        controller.step(Instant::now(), &mut pedals, &mut motor, &mut telemetry, &ECU);
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn fault_manager() {
    ECU.faults.run(&mut CanQueue, &mut RttDiagnostics, &ECU.mode).await
}

#[embassy_executor::task]
async fn mode_director(pdu: Pdu) {
    let Some(mut director) = ECU.mode.director(&ECU.faults, pdu, CanQueue) else {
        error!("Mode director already running");
        return;
    };
    loop {
        match select(ECU.mode.next_request(), Timer::after(STATE_HOUSEKEEPING_PERIOD)).await {
            Either::First(request) => {
                director.handle(request);
            }
            Either::Second(()) => director.housekeeping(),
        }
    }
}

#[embassy_executor::task]
async fn write_can(mut can: CanTx<'static, FDCAN2>) {
    loop {
        let message = CAN_TX.receive().await;
        let frame = match message.id() {
            Id::Standard(id) => frame::Frame::new_standard(id.as_raw(), message.data()),
            Id::Extended(id) => frame::Frame::new_extended(id.as_raw(), message.data()),
        };
        match frame {
            Ok(frame) => {
                can.write(&frame).await;
            }
            Err(_) => {
                warn!("Dropped unencodable frame {:x}", message.raw_id());
                ECU.faults
                    .raise(FaultCode::CanDispatch, Severity::Defcon5, "Failed to encode CAN frame");
            }
        }
    }
}

#[embassy_executor::task]
async fn read_can(mut can: CanRx<'static, FDCAN2>) {
    loop {
        match can.read().await {
            Ok(envelope) => {
                let frame = envelope.frame;
                let id = *frame.id();
                let data = frame.data();
                match id {
                    Id::Standard(sid) if sid.as_raw() == STEERING_IO_ID => {
                        STEERING_BUTTONS.store(decode_buttons(data), Ordering::Relaxed);
                    }
                    _ if ECU.inverter.handle_frame(id, data) => {}
                    _ => trace!("Unrouted frame {:x}", race_ecu_core::can::id_to_u32(id)),
                }
            }
            Err(_) => {
                warn!("CAN bus error");
                ECU.faults
                    .raise(FaultCode::CanRouting, Severity::Defcon5, "CAN receive error");
            }
        }
    }
}

#[embassy_executor::task]
async fn driver_inputs(tsms: Input<'static>) {
    let mut wheel = SteeringWheel::new();
    let mut monitor = TsmsMonitor::new();
    let mut can = CanQueue;
    let mut ticker = Ticker::every(INPUT_POLL_PERIOD);
    loop {
        let now = Instant::now();
        wheel.handle(STEERING_BUTTONS.load(Ordering::Relaxed), now, &ECU, &mut can);
        monitor.update(Ok(tsms.is_high()), now, &ECU, &mut can);
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn drive_enable() {
    let mut dti = Dti::new(CanQueue, &ECU.inverter);
    let mut ticker = Ticker::every(DRIVE_ENABLE_PERIOD);
    loop {
        if let Err(e) = dti.drive_enable(ECU.mode.is_active()) {
            warn!("Drive enable not sent: {}", e);
            ECU.faults
                .raise(FaultCode::CanDispatch, Severity::Defcon5, "Failed to send drive enable");
        }
        ticker.next().await;
    }
}

#[embassy_executor::task]
async fn brakelight(light: Output<'static>) {
    ECU.brake.run_brakelight(&mut BrakeLamp(light)).await
}

#[embassy_executor::task]
async fn rtds(mut buzzer: Output<'static>) {
    loop {
        RTDS.wait().await;
        buzzer.set_high();
        Timer::after(RTDS_DURATION).await;
        buzzer.set_low();
    }
}

#[embassy_executor::task]
async fn blinker(mut led: Output<'static>) {
    loop {
        led.toggle();
        Timer::after_millis(500).await;
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut config: Config = Default::default();
    {
        use embassy_stm32::rcc::*;
        let pll = Pll {
            source: PllSource::HSE,
            prediv: PllPreDiv::DIV3,
            mul: PllMul::MUL85,
            divp: Some(PllPDiv::DIV6),
            divq: Some(PllQDiv::DIV2),
            divr: Some(PllRDiv::DIV2),
        };
        config.rcc.hse = Some(Hse {
            freq: mhz(12),
            mode: HseMode::Oscillator,
        });
        config.rcc.hsi48 = Some(Hsi48Config { sync_from_usb: false });
        config.rcc.pll = Some(pll);
        config.rcc.sys = Sysclk::PLL1_R;
        config.rcc.mux.adc12sel = mux::Adcsel::SYS;
        config.rcc.mux.adc345sel = mux::Adcsel::SYS;
        config.rcc.mux.fdcansel = mux::Fdcansel::PLL1_Q;
    }

    let p = embassy_stm32::init(config);

    let period = match ControlPeriod::new(PEDAL_LOOP_PERIOD) {
        Ok(period) => period,
        Err(e) => panic!("Pedal loop period rejected: {}", e),
    };
    let controller = match PedalController::new(PedalConfig::DEFAULT, period) {
        Ok(controller) => controller,
        Err(e) => panic!("Pedal calibration rejected: {}", e),
    };

    let brakelight_out = Output::new(p.PC13, Level::Low, Speed::Low);
    let buzzer = Output::new(p.PC14, Level::Low, Speed::Low);
    let pump = Output::new(p.PC15, Level::Low, Speed::Low);
    let fault_line = Output::new(p.PB12, Level::High, Speed::Low);
    let tsms = Input::new(p.PB7, Pull::Down);

    let pedals = {
        let mut adc = Adc::new(p.ADC1);
        adc.set_sample_time(SampleTime::CYCLES640_5);
        PedalBox::new(
            adc,
            p.PA0.degrade_adc(),
            p.PA1.degrade_adc(),
            p.PA2.degrade_adc(),
            p.PA3.degrade_adc(),
        )
    };

    let can2 = {
        let mut can = can::CanConfigurator::new(p.FDCAN2, p.PB5, p.PB6, Irqs2);
        can.properties()
            .set_extended_filter(ExtendedFilterSlot::_0, ExtendedFilter::accept_all_into_fifo0());
        can.properties()
            .set_standard_filter(StandardFilterSlot::_0, StandardFilter::accept_all_into_fifo0());
        can.config().set_non_iso_mode(false);
        can.set_bitrate(500_000);
        can.into_normal_mode()
    };
    let (can2_tx, can2_rx, _can2_properties) = can2.split();

    interrupt::UART4.set_priority(Priority::P6);
    let high = EXECUTOR_HIGH.start(interrupt::UART4);
    high.spawn(fault_manager()).unwrap();
    high.spawn(pedal_loop(controller, pedals)).unwrap();

    interrupt::UART5.set_priority(Priority::P7);
    let med = EXECUTOR_MED.start(interrupt::UART5);
    med.spawn(mode_director(Pdu::new(pump, fault_line))).unwrap();

    spawner.spawn(write_can(can2_tx)).unwrap();
    spawner.spawn(read_can(can2_rx)).unwrap();
    spawner.spawn(driver_inputs(tsms)).unwrap();
    spawner.spawn(drive_enable()).unwrap();
    spawner.spawn(brakelight(brakelight_out)).unwrap();
    spawner.spawn(rtds(buzzer)).unwrap();

    let led = Output::new(p.PB9, Level::High, Speed::Low);
    spawner.spawn(blinker(led)).unwrap();
    info!("race-ecu up");
}
