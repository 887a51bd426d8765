//! Device configuration and the persistent store contract.
//!
//! The configuration is read once at boot and never mutated afterwards.
//! Values that would make the measurement loop misbehave are replaced with
//! documented defaults here so the rest of the core never sees them.

use core::fmt;

use heapless::Vec;

use crate::calibration::BASELINE_SENTINEL;
use crate::wakeup::WakeIntervalCode;

/// User threshold (raw counts) separating wet from dry soil.
pub const DEFAULT_MOISTURE_THRESHOLD: u32 = 35_000;
/// Samples averaged into one reported reading.
pub const DEFAULT_AVERAGING_FACTOR: u16 = 3;
/// Step by which the persisted packet counter is advanced at boot and rewritten at runtime.
pub const PACKET_COUNTER_WRITE_CYCLE: u32 = 100;

/// Maximum number of distinct faults [`DeviceConfig::sanitized`] can report.
pub const MAX_CONFIG_FAULTS: usize = 3;

/// Bounded list of faults corrected while sanitizing a configuration.
pub type ConfigFaults = Vec<ConfigFault, MAX_CONFIG_FAULTS>;

/// Configuration values read from the [`ConfigStore`] at boot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceConfig {
    pub device_id: u16,
    pub moisture_threshold: u32,
    pub averaging_factor: u16,
    pub wake_interval: WakeIntervalCode,
}

impl DeviceConfig {
    /// Creates a configuration without validation.
    #[must_use]
    pub const fn new(
        device_id: u16,
        moisture_threshold: u32,
        averaging_factor: u16,
        wake_interval: WakeIntervalCode,
    ) -> Self {
        Self {
            device_id,
            moisture_threshold,
            averaging_factor,
            wake_interval,
        }
    }

    /// Returns a copy with every unusable field replaced by its default.
    #[must_use]
    pub fn sanitized(&self) -> (Self, ConfigFaults) {
        let mut faults = ConfigFaults::new();
        let mut config = *self;

        if config.averaging_factor == 0 {
            config.averaging_factor = 1;
            record(&mut faults, ConfigFault::AveragingFactorZero);
        }

        if config.moisture_threshold == 0 || config.moisture_threshold >= BASELINE_SENTINEL {
            record(
                &mut faults,
                ConfigFault::ThresholdDefaulted {
                    stored: config.moisture_threshold,
                },
            );
            config.moisture_threshold = DEFAULT_MOISTURE_THRESHOLD;
        }

        let (wake_interval, wake_fault) = config.wake_interval.sanitize();
        config.wake_interval = wake_interval;
        if let Some(fault) = wake_fault {
            record(&mut faults, fault);
        }

        (config, faults)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new(
            0,
            DEFAULT_MOISTURE_THRESHOLD,
            DEFAULT_AVERAGING_FACTOR,
            WakeIntervalCode::default(),
        )
    }
}

fn record(faults: &mut ConfigFaults, fault: ConfigFault) {
    // One slot per field, so the buffer cannot overflow.
    let _ = faults.push(fault);
}

/// Configuration values that were replaced by a safe default.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigFault {
    /// Averaging factor of zero was treated as one.
    AveragingFactorZero,
    /// Threshold was zero or not below the baseline sentinel.
    ThresholdDefaulted { stored: u32 },
    /// Wake-interval code was zero, had reserved bits set, or rounded to zero seconds.
    WakeIntervalDefaulted { stored: u16 },
}

impl fmt::Display for ConfigFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFault::AveragingFactorZero => f.write_str("averaging-factor=0 -> 1"),
            ConfigFault::ThresholdDefaulted { stored } => {
                write!(f, "threshold={stored} -> {DEFAULT_MOISTURE_THRESHOLD}")
            }
            ConfigFault::WakeIntervalDefaulted { stored } => {
                write!(f, "wake-interval=0x{stored:04X} -> default")
            }
        }
    }
}

/// Persistent storage for the device configuration and packet counter.
pub trait ConfigStore {
    /// Storage-specific error type.
    type Error;

    /// Reads the device configuration.
    fn load(&mut self) -> Result<DeviceConfig, Self::Error>;

    /// Advances the stored packet counter by `increment`, persists it, and
    /// returns the new value so the runtime can resume past anything
    /// previously sent.
    fn advance_and_persist_sequence_counter(&mut self, increment: u32) -> Result<u32, Self::Error>;

    /// Persists a packet counter checkpoint reached at runtime.
    fn persist_sequence_counter(&mut self, value: u32) -> Result<(), Self::Error>;
}

/// RAM-backed [`ConfigStore`] for tests and host tooling.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryConfigStore {
    config: DeviceConfig,
    sequence_counter: u32,
    writes: u32,
}

impl MemoryConfigStore {
    /// Creates a store holding `config` and a persisted counter.
    #[must_use]
    pub const fn new(config: DeviceConfig, sequence_counter: u32) -> Self {
        Self {
            config,
            sequence_counter,
            writes: 0,
        }
    }

    /// Returns the last persisted packet counter.
    #[must_use]
    pub const fn sequence_counter(&self) -> u32 {
        self.sequence_counter
    }

    /// Number of counter writes performed so far.
    #[must_use]
    pub const fn writes(&self) -> u32 {
        self.writes
    }

    /// Replaces the stored configuration (used to emulate reprogramming).
    pub fn set_config(&mut self, config: DeviceConfig) {
        self.config = config;
    }
}

impl ConfigStore for MemoryConfigStore {
    type Error = core::convert::Infallible;

    fn load(&mut self) -> Result<DeviceConfig, Self::Error> {
        Ok(self.config)
    }

    /// Wraps at `u32::MAX` like [`crate::scheduler::SequenceCounter`].
    fn advance_and_persist_sequence_counter(&mut self, increment: u32) -> Result<u32, Self::Error> {
        self.sequence_counter = self.sequence_counter.wrapping_add(increment);
        self.writes = self.writes.saturating_add(1);
        Ok(self.sequence_counter)
    }

    fn persist_sequence_counter(&mut self, value: u32) -> Result<(), Self::Error> {
        self.sequence_counter = value;
        self.writes = self.writes.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wakeup::DEFAULT_WAKE_INTERVAL_CODE;

    #[test]
    fn default_config_is_already_sane() {
        let (config, faults) = DeviceConfig::default().sanitized();
        assert_eq!(config, DeviceConfig::default());
        assert!(faults.is_empty());
    }

    #[test]
    fn sanitize_replaces_every_bad_field() {
        let raw = DeviceConfig::new(7, 0, 0, WakeIntervalCode::new(0));
        let (config, faults) = raw.sanitized();

        assert_eq!(config.device_id, 7);
        assert_eq!(config.averaging_factor, 1);
        assert_eq!(config.moisture_threshold, DEFAULT_MOISTURE_THRESHOLD);
        assert_eq!(config.wake_interval, DEFAULT_WAKE_INTERVAL_CODE);
        assert_eq!(
            faults.as_slice(),
            &[
                ConfigFault::AveragingFactorZero,
                ConfigFault::ThresholdDefaulted { stored: 0 },
                ConfigFault::WakeIntervalDefaulted { stored: 0 },
            ]
        );
    }

    #[test]
    fn threshold_at_sentinel_is_rejected() {
        let raw = DeviceConfig::new(1, BASELINE_SENTINEL, 3, WakeIntervalCode::default());
        let (config, faults) = raw.sanitized();
        assert_eq!(config.moisture_threshold, DEFAULT_MOISTURE_THRESHOLD);
        assert_eq!(faults.len(), 1);

        let raw = DeviceConfig::new(1, BASELINE_SENTINEL - 1, 3, WakeIntervalCode::default());
        assert!(raw.sanitized().1.is_empty());
    }

    #[test]
    fn memory_store_advances_counter() {
        let mut store = MemoryConfigStore::new(DeviceConfig::default(), 250);
        let start = store
            .advance_and_persist_sequence_counter(PACKET_COUNTER_WRITE_CYCLE)
            .unwrap();
        assert_eq!(start, 350);
        assert_eq!(store.sequence_counter(), 350);
        assert_eq!(store.writes(), 1);
    }
}
