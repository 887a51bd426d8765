//! Shared status surface for diagnostics.
//!
//! The emulator console and the firmware boot log both render node state
//! through [`StatusFormatter`] so the text stays identical across targets.

use core::fmt;

use crate::calibration::AveragedReading;
use crate::scheduler::{NodeState, VERSION_REPORT_CADENCE};
use crate::version::{FIRMWARE_VERSION, FirmwareVersion};
use crate::wakeup::WakeInterval;

/// Point-in-time copy of everything the `status` command reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeStatusSnapshot {
    pub device_id: u16,
    pub version: FirmwareVersion,
    pub moisture_threshold: u32,
    pub averaging_factor: u16,
    pub samples_taken: u16,
    /// `None` until the first averaged reading arrives.
    pub baseline: Option<u32>,
    pub last_reading: Option<AveragedReading>,
    pub sequence: u32,
    pub wake_interval: WakeInterval,
    pub cycles: u32,
    pub cycles_until_version_report: u16,
}

impl NodeStatusSnapshot {
    /// Captures the current node state.
    #[must_use]
    pub fn capture(node: &NodeState, wake_interval: WakeInterval, cycles: u32) -> Self {
        let calibration = &node.calibration;
        let baseline = calibration.baseline();
        Self {
            device_id: node.config.device_id,
            version: FIRMWARE_VERSION,
            moisture_threshold: node.config.moisture_threshold,
            averaging_factor: calibration.averager().factor(),
            samples_taken: calibration.averager().samples_taken(),
            baseline: (!baseline.is_uncalibrated()).then(|| baseline.baseline()),
            last_reading: calibration.last_reading(),
            sequence: node.reporting.sequence().value(),
            wake_interval,
            cycles,
            cycles_until_version_report: VERSION_REPORT_CADENCE
                .saturating_sub(node.reporting.wake_cycles_since_version_report()),
        }
    }
}

/// Renders a [`NodeStatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a NodeStatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a NodeStatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the identity line (e.g. `node id=9 firmware=v0.3.1 (00000000) seq=101`).
    pub fn write_identity_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "node id={} firmware={} seq={}",
            self.snapshot.device_id, self.snapshot.version, self.snapshot.sequence
        )
    }

    /// Writes the calibration line (e.g. `calibration threshold=35000 samples=1/3 baseline=30000`).
    pub fn write_calibration_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "calibration threshold={} samples={}/{} baseline=",
            self.snapshot.moisture_threshold,
            self.snapshot.samples_taken,
            self.snapshot.averaging_factor
        )?;
        match self.snapshot.baseline {
            Some(baseline) => write!(writer, "{baseline}"),
            None => writer.write_str("uncalibrated"),
        }
    }

    /// Writes the reading line (e.g. `reading mean=32000 moisture=60.0%`).
    pub fn write_reading_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("reading ")?;
        match self.snapshot.last_reading {
            Some(reading) => write!(
                writer,
                "mean={} moisture={}.{}%",
                reading.mean,
                reading.normalized / 10,
                reading.normalized % 10
            ),
            None => writer.write_str("none"),
        }
    }

    /// Writes the schedule line (e.g. `schedule wake=105s cycles=4 version-in=46`).
    pub fn write_schedule_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "schedule wake={}s code=0x{:04X} cycles={} version-in={}",
            self.snapshot.wake_interval.seconds,
            self.snapshot.wake_interval.code.raw(),
            self.snapshot.cycles,
            self.snapshot.cycles_until_version_report
        )
    }

    /// Writes every line, newline separated, without a trailing newline.
    pub fn write_all<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        self.write_identity_line(writer)?;
        writer.write_char('\n')?;
        self.write_calibration_line(writer)?;
        writer.write_char('\n')?;
        self.write_reading_line(writer)?;
        writer.write_char('\n')?;
        self.write_schedule_line(writer)
    }
}
