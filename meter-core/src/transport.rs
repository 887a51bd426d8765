//! Radio transport contract used to emit status reports.
//!
//! Framing, authentication, and encryption are owned by the implementation;
//! the core only hands over the report fields and logs the outcome.

use core::fmt;

use crate::version::FirmwareVersion;
use crate::wakeup::WakeIntervalCode;

/// Kind of report the scheduler emits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReportKind {
    SensorStatus,
    VersionStatus,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportKind::SensorStatus => "sensor-status",
            ReportKind::VersionStatus => "version-status",
        })
    }
}

/// Soil moisture reading as sent over the air.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SensorStatus {
    pub device_id: u16,
    pub sequence: u32,
    /// Permille, 0 (dry) ..= 1000 (wet).
    pub normalized: u16,
    /// Hundredths of a degree Celsius; 0 when no sensor is fitted.
    pub temperature_centi: i16,
}

impl SensorStatus {
    /// Integer percent and tenths, as printed in diagnostics (`60.0%`).
    #[must_use]
    pub const fn percent_parts(&self) -> (u16, u16) {
        (self.normalized / 10, self.normalized % 10)
    }
}

/// Firmware version announcement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VersionStatus {
    pub device_id: u16,
    pub sequence: u32,
    pub version: FirmwareVersion,
}

/// Outbound link to the home-automation base station.
pub trait Transport {
    /// Transport-specific failure.
    type Error;

    /// Sends a moisture/temperature status packet.
    fn send_sensor_status(&mut self, status: &SensorStatus) -> Result<(), Self::Error>;

    /// Sends a firmware version packet.
    fn send_version_status(&mut self, status: &VersionStatus) -> Result<(), Self::Error>;

    /// Programs the radio wake-up timer.
    fn configure_wake_timer(&mut self, code: WakeIntervalCode) -> Result<(), Self::Error>;
}

/// Transport that accepts and discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = core::convert::Infallible;

    fn send_sensor_status(&mut self, _: &SensorStatus) -> Result<(), Self::Error> {
        Ok(())
    }

    fn send_version_status(&mut self, _: &VersionStatus) -> Result<(), Self::Error> {
        Ok(())
    }

    fn configure_wake_timer(&mut self, _: WakeIntervalCode) -> Result<(), Self::Error> {
        Ok(())
    }
}
