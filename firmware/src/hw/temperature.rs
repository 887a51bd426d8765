//! On-die temperature sensor.
//!
//! The STM32G0 stores one factory calibration point (`TS_CAL1`, taken at
//! 30 °C with VDDA = 3.0 V) plus the matching VREFINT reading. Samples are
//! rescaled to 3.0 V using VREFINT and converted with the typical
//! 2.5 mV/°C slope.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

/// Calibration temperature of `TS_CAL1`, in hundredths of a degree.
const TS_CAL1_CENTI: i32 = 3_000;
/// Counts per hundredth of a degree: 2.5 mV/°C at 3000 mV full scale, 12 bit.
const SLOPE_NUMERATOR: i32 = 120_000;
const SLOPE_DENOMINATOR: i32 = 4_095;

/// Factory calibration words read from system memory.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FactoryCalibration {
    pub ts_cal1: u16,
    pub vrefint_cal: u16,
}

/// Converts a sensor/VREFINT sample pair to hundredths of a degree Celsius.
///
/// Returns `None` when the reference reading is zero.
#[must_use]
pub fn centi_celsius(sensor: u16, vrefint: u16, calibration: FactoryCalibration) -> Option<i16> {
    if vrefint == 0 {
        return None;
    }
    let scaled = i32::from(sensor) * i32::from(calibration.vrefint_cal) / i32::from(vrefint);
    let delta = scaled - i32::from(calibration.ts_cal1);
    let centi = TS_CAL1_CENTI + delta * SLOPE_NUMERATOR / SLOPE_DENOMINATOR;
    i16::try_from(centi).ok()
}

#[cfg(target_os = "none")]
mod adc {
    use core::ptr;

    use embassy_stm32::adc::{Adc, SampleTime, Temperature, VrefInt};
    use embassy_stm32::peripherals::ADC1;
    use meter_core::probe::TemperatureSensor;

    use super::{FactoryCalibration, centi_celsius};

    const TS_CAL1_ADDR: *const u16 = 0x1FFF_75A8 as *const u16;
    const VREFINT_CAL_ADDR: *const u16 = 0x1FFF_75AA as *const u16;

    /// Reads the factory calibration words.
    pub fn read_factory_calibration() -> FactoryCalibration {
        unsafe {
            FactoryCalibration {
                ts_cal1: ptr::read_volatile(TS_CAL1_ADDR),
                vrefint_cal: ptr::read_volatile(VREFINT_CAL_ADDR),
            }
        }
    }

    /// ADC1 sampling the internal temperature channel.
    pub struct InternalTemperature<'d> {
        adc: Adc<'d, ADC1>,
        sensor: Temperature,
        vrefint: VrefInt,
        calibration: FactoryCalibration,
    }

    impl<'d> InternalTemperature<'d> {
        pub fn new(mut adc: Adc<'d, ADC1>) -> Self {
            // Sensor needs a long sampling time.
            adc.set_sample_time(SampleTime::CYCLES160_5);
            let sensor = adc.enable_temperature();
            let vrefint = adc.enable_vrefint();
            Self {
                adc,
                sensor,
                vrefint,
                calibration: read_factory_calibration(),
            }
        }
    }

    impl TemperatureSensor for InternalTemperature<'_> {
        fn read_centi_celsius(&mut self) -> Option<i16> {
            let vrefint = self.adc.blocking_read(&mut self.vrefint);
            let sensor = self.adc.blocking_read(&mut self.sensor);
            centi_celsius(sensor, vrefint, self.calibration)
        }
    }
}

#[cfg(target_os = "none")]
pub use adc::InternalTemperature;
