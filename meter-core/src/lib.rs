#![no_std]

// Shared logic for the soil moisture meter.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and exposing the collaborator traits the other crates
// implement for their hardware.

pub mod calibration;
pub mod config;
pub mod console;
pub mod power;
pub mod probe;
pub mod scheduler;
pub mod status;
pub mod telemetry;
pub mod transport;
pub mod version;
pub mod wakeup;

pub use calibration::{AveragedReading, Averager, BaselineTracker, CalibrationState, normalize};
pub use config::{ConfigStore, DeviceConfig};
pub use power::{BootError, PowerCycleController, WakeEvent, WakeSource};
pub use probe::{OscillatorCounter, TemperatureSensor};
pub use scheduler::{CycleOutcome, NodeState, ReportScheduler};
pub use transport::Transport;
pub use wakeup::{WakeIntervalCode, decode};
