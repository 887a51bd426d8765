use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::usart::{Config as UartConfig, Uart};
use meter_core::power::{ImmediateWake, PowerCycleController};

use crate::hw::oscillator::ProbeOscillator;
use crate::hw::temperature::InternalTemperature;
use crate::radio::{Radio, UartSink};
use crate::storage::{ConfigPage, FlashConfigStore};
use crate::telemetry;

mod cycle_task;

const MODEM_BAUD_RATE: u32 = 115_200;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Node wired to the board peripherals. The cycle task awaits the wake
/// timer itself, so the controller's blocking wake source never runs.
pub(crate) type FirmwareNode = PowerCycleController<
    ProbeOscillator<'static>,
    InternalTemperature<'static>,
    Radio<UartSink<'static>>,
    FlashConfigStore<ConfigPage<'static>>,
    ImmediateWake,
>;

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        TIM2,
        PB0,
        PB1,
        USART5,
        ADC1,
        FLASH,
        ..
    } = hal::init(config);

    let oscillator = ProbeOscillator::new(
        Output::new(PA1, Level::Low, Speed::Low),
        TIM2,
        PA0,
    );
    let temperature = InternalTemperature::new(Adc::new(ADC1));

    let mut uart_config = UartConfig::default();
    uart_config.baudrate = MODEM_BAUD_RATE;
    let uart = Uart::new_blocking(USART5, PB1, PB0, uart_config).expect("modem UART config");
    let radio = Radio::new(UartSink::new(uart));

    let flash: Flash<'static, Blocking> = Flash::new_blocking(FLASH);
    let store = FlashConfigStore::new(ConfigPage::new(flash));

    let node: FirmwareNode =
        match PowerCycleController::boot(store, radio, oscillator, temperature, ImmediateWake) {
            Ok(node) => node,
            Err(err) => {
                telemetry::log_boot_failure(&err);
                panic!("node boot failed");
            }
        };
    telemetry::log_boot(node.boot_report(), &node.snapshot());

    spawner
        .spawn(cycle_task::run(node))
        .expect("failed to spawn cycle task");

    core::future::pending::<()>().await;
}
