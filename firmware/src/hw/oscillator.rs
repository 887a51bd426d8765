//! Gated pulse counter for the capacitive moisture probe.
//!
//! The probe output feeds TIM2's external trigger input (PA0, AF2). With the
//! timer in external clock mode 2 every rising edge increments `CNT` in
//! hardware, so the count holds at the oscillator's full rate. The CPU only
//! gates the probe supply and times the window.

use core::time::Duration;

use embassy_stm32::Peri;
use embassy_stm32::gpio::Output;
use embassy_stm32::pac;
use embassy_stm32::pac::gpio::vals::Moder;
use embassy_stm32::peripherals::{PA0, TIM2};
use embassy_stm32::timer::low_level::Timer as HwTimer;
use meter_core::probe::OscillatorCounter;

/// GPIOA line carrying the probe output.
const PULSE_LINE: usize = 0;
/// Alternate function routing PA0 to TIM2_ETR.
const TIM2_ETR_AF: u8 = 2;

/// Probe supply switch plus the timer counting its output.
pub struct ProbeOscillator<'d> {
    supply: Output<'d>,
    counter: HwTimer<'d, TIM2>,
    _pulses: Peri<'d, PA0>,
}

impl<'d> ProbeOscillator<'d> {
    pub fn new(supply: Output<'d>, timer: Peri<'d, TIM2>, pulses: Peri<'d, PA0>) -> Self {
        // PA0 is owned by this driver; route it to the timer.
        pac::GPIOA
            .moder()
            .modify(|w| w.set_moder(PULSE_LINE, Moder::ALTERNATE));
        pac::GPIOA
            .afr(PULSE_LINE / 8)
            .modify(|w| w.set_afr(PULSE_LINE % 8, TIM2_ETR_AF));

        let counter = HwTimer::new(timer);
        counter.stop();
        // External clock mode 2: rising ETR edges, no prescaler or filter.
        counter.regs_gp32().smcr().modify(|w| w.set_ece(true));

        Self {
            supply,
            counter,
            _pulses: pulses,
        }
    }
}

impl OscillatorCounter for ProbeOscillator<'_> {
    fn measure_window(&mut self, window: Duration) -> u32 {
        let window = embassy_time::Duration::from_micros(
            u64::try_from(window.as_micros()).unwrap_or(u64::MAX),
        );

        self.supply.set_high();
        self.counter.regs_gp32().cnt().write_value(0);
        self.counter.start();
        embassy_time::block_for(window);
        self.counter.stop();
        self.supply.set_low();

        self.counter.regs_gp32().cnt().read()
    }
}
