use std::convert::Infallible;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use meter_core::config::{
    DEFAULT_AVERAGING_FACTOR, DEFAULT_MOISTURE_THRESHOLD, DeviceConfig, MemoryConfigStore,
};
use meter_core::console::commands::{
    ConsoleError, ConsoleExecutor, ConsoleOutcome, NodeConsole, ProbeOverride, help_entries,
};
use meter_core::console::grammar::ProbeCommand;
use meter_core::power::{ImmediateWake, PowerCycleController};
use meter_core::probe::{OscillatorCounter, TemperatureSensor};
use meter_core::status::{NodeStatusSnapshot, StatusFormatter};
use meter_core::telemetry::{TelemetryPayload, TelemetryRecord};
use meter_core::transport::{SensorStatus, Transport, VersionStatus};
use meter_core::wakeup::{DEFAULT_WAKE_INTERVAL_CODE, WakeIntervalCode, decode};

/// Device identity used by every emulated node.
const EMULATED_DEVICE_ID: u16 = 0x0042;
/// Ambient temperature reported by the emulated board (21.50 °C).
const AMBIENT_CENTI_CELSIUS: i16 = 2_150;
/// Cycles printed individually by a single `tick`; the rest are summarized.
const VERBOSE_TICK_LIMIT: u16 = 12;

type EmulatedNode = PowerCycleController<
    SimulatedProbe,
    AmbientTemperature,
    ConsoleRadio,
    MemoryConfigStore,
    ImmediateWake,
>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SoilProfile {
    Drying,
    Watering,
}

impl SoilProfile {
    pub fn tag(self) -> &'static str {
        match self {
            SoilProfile::Drying => "drying",
            SoilProfile::Watering => "watering",
        }
    }

    pub fn log_path(self) -> &'static str {
        match self {
            SoilProfile::Drying => "evidence/emulator-drying.log",
            SoilProfile::Watering => "evidence/emulator-watering.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            SoilProfile::Drying => "Soil Moisture Meter Emulator drying transcript",
            SoilProfile::Watering => "Soil Moisture Meter Emulator watering transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("drying") {
            Ok(Self::Drying)
        } else if tag.eq_ignore_ascii_case("watering") {
            Ok(Self::Watering)
        } else {
            Err(format!("Unknown soil profile `{tag}`"))
        }
    }

    /// Oscillator count for the `step`-th measurement window.
    ///
    /// Drying soil raises the count steadily until it saturates; watering
    /// drops it quickly towards a wet floor. A small deterministic jitter
    /// keeps consecutive samples distinct.
    fn raw_count(self, step: u32) -> u32 {
        let step = i64::from(step);
        let base = match self {
            SoilProfile::Drying => (29_000 + step * 180).min(42_000),
            SoilProfile::Watering => (41_000 - step * 450).max(28_500),
        };
        let jitter = (step * 7_919) % 5 * 40 - 80;
        u32::try_from(base + jitter).unwrap_or(0)
    }
}

/// Probe following a soil profile unless pinned from the console.
pub struct SimulatedProbe {
    profile: SoilProfile,
    step: u32,
    pinned: Option<u32>,
}

impl SimulatedProbe {
    fn new(profile: SoilProfile) -> Self {
        Self {
            profile,
            step: 0,
            pinned: None,
        }
    }
}

impl OscillatorCounter for SimulatedProbe {
    fn measure_window(&mut self, _window: Duration) -> u32 {
        let count = self
            .pinned
            .unwrap_or_else(|| self.profile.raw_count(self.step));
        self.step = self.step.saturating_add(1);
        count
    }
}

impl ProbeOverride for SimulatedProbe {
    fn set_override(&mut self, raw_count: Option<u32>) {
        self.pinned = raw_count;
    }
}

pub struct AmbientTemperature;

impl TemperatureSensor for AmbientTemperature {
    fn read_centi_celsius(&mut self) -> Option<i16> {
        Some(AMBIENT_CENTI_CELSIUS)
    }
}

/// Transport that prints every packet instead of transmitting it.
#[derive(Default)]
pub struct ConsoleRadio {
    outbox: Vec<String>,
}

impl ConsoleRadio {
    fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }
}

impl Transport for ConsoleRadio {
    type Error = Infallible;

    fn send_sensor_status(&mut self, status: &SensorStatus) -> Result<(), Self::Error> {
        let (percent, tenths) = status.percent_parts();
        self.outbox.push(format!(
            "TX sensor-status id=0x{:04X} seq={} moisture={percent}.{tenths}% temp={}",
            status.device_id,
            status.sequence,
            format_centi_celsius(status.temperature_centi),
        ));
        Ok(())
    }

    fn send_version_status(&mut self, status: &VersionStatus) -> Result<(), Self::Error> {
        self.outbox.push(format!(
            "TX version-status id=0x{:04X} seq={} firmware={}",
            status.device_id, status.sequence, status.version
        ));
        Ok(())
    }

    fn configure_wake_timer(&mut self, code: WakeIntervalCode) -> Result<(), Self::Error> {
        self.outbox.push(format!(
            "TX wake-timer code=0x{:04X} ({}s)",
            code.raw(),
            decode(code).seconds
        ));
        Ok(())
    }
}

/// Stored configuration and counter the emulated node boots from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NodeSetup {
    pub config: DeviceConfig,
    pub sequence_counter: u32,
}

impl Default for NodeSetup {
    fn default() -> Self {
        Self {
            config: DeviceConfig::new(
                EMULATED_DEVICE_ID,
                DEFAULT_MOISTURE_THRESHOLD,
                DEFAULT_AVERAGING_FACTOR,
                DEFAULT_WAKE_INTERVAL_CODE,
            ),
            sequence_counter: 0,
        }
    }
}

pub struct Session {
    profile: SoilProfile,
    executor: ConsoleExecutor<EmulatedNode>,
    transcript: TranscriptLogger,
    started_at: HostInstant,
}

impl Session {
    pub fn new(profile: SoilProfile, setup: NodeSetup) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        let node = PowerCycleController::boot(
            MemoryConfigStore::new(setup.config, setup.sequence_counter),
            ConsoleRadio::default(),
            SimulatedProbe::new(profile),
            AmbientTemperature,
            ImmediateWake,
        )
        .map_err(|err| io::Error::other(err.to_string()))?;

        Ok(Self {
            profile,
            executor: ConsoleExecutor::new(node),
            transcript,
            started_at: HostInstant::now(),
        })
    }

    /// Lines describing the boot: radio setup plus the status identity.
    pub fn boot_banner(&mut self) -> io::Result<Vec<String>> {
        let elapsed = self.started_at.elapsed();
        let node = self.executor.node_mut();
        let mut lines = node.transport_mut().drain();

        let report = node.boot_report();
        for fault in report.faults.iter() {
            lines.push(format!("config fault: {fault}"));
        }
        lines.push(format!(
            "sequence resumes after {}",
            report.sequence_start
        ));
        lines.extend(status_lines(&node.snapshot()));

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let first_cycle = self.executor.node().cycles();
        let mut lines = Vec::new();
        let result = self.executor.execute_with(trimmed, |index, summary| {
            if index < VERBOSE_TICK_LIMIT {
                lines.push(format!(
                    "cycle {}: {summary}",
                    first_cycle + u32::from(index)
                ));
            }
        });

        match result {
            Ok(outcome) => {
                lines.extend(self.executor.node_mut().transport_mut().drain());
                self.describe_outcome(outcome, &mut lines);
            }
            Err(ConsoleError::Parse(err)) => lines.push(format!("ERR syntax {err}")),
            Err(err) => lines.push(format!("ERR {err}")),
        }

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    fn describe_outcome(&self, outcome: ConsoleOutcome, lines: &mut Vec<String>) {
        match outcome {
            ConsoleOutcome::Ticked(report) => {
                if report.cycles > VERBOSE_TICK_LIMIT {
                    lines.push(format!(
                        "... {} more cycles",
                        report.cycles - VERBOSE_TICK_LIMIT
                    ));
                }
                lines.push(format!(
                    "OK tick cycles={} sensor-reports={} version-reports={} failed={}",
                    report.cycles,
                    report.sensor_reports,
                    report.version_reports,
                    report.failed_reports
                ));
            }
            ConsoleOutcome::Probe(ProbeCommand::Fixed(raw)) => {
                lines.push(format!("OK probe pinned raw={raw}"));
            }
            ConsoleOutcome::Probe(ProbeCommand::Auto) => {
                lines.push(format!(
                    "OK probe following {} profile",
                    self.profile.tag()
                ));
            }
            ConsoleOutcome::BaselineReset { previous } => {
                let previous = previous.map_or_else(|| "uncalibrated".to_string(), |b| b.to_string());
                lines.push(format!("OK baseline reset (was {previous})"));
            }
            ConsoleOutcome::Status(snapshot) => lines.extend(status_lines(&snapshot)),
            ConsoleOutcome::Log { count: 0 } => lines.push("log empty".to_string()),
            ConsoleOutcome::Log { count } => {
                let telemetry = NodeConsole::telemetry(self.executor.node());
                lines.extend(telemetry.recent(count).map(describe_record));
            }
            ConsoleOutcome::Help(None) => {
                lines.push("Available commands:".to_string());
                for entry in help_entries() {
                    lines.push(format!("  {:<18} {}", entry.usage, entry.summary));
                }
                lines.push("Type `help <command>` for a specific command.".to_string());
            }
            ConsoleOutcome::Help(Some(entry)) => {
                lines.push(format!("{:<18} - {}", entry.usage, entry.summary));
            }
        }
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Node, line)?;
        }
        Ok(())
    }
}

fn status_lines(snapshot: &NodeStatusSnapshot) -> Vec<String> {
    let mut text = String::new();
    // Writing into a String cannot fail.
    let _ = StatusFormatter::new(snapshot).write_all(&mut text);
    text.lines().map(str::to_string).collect()
}

fn describe_record(record: &TelemetryRecord) -> String {
    let mut line = format!(
        "#{:<4} cycle={:<4} {}",
        record.id, record.cycle, record.event
    );
    let _ = match record.details {
        TelemetryPayload::None => Ok(()),
        TelemetryPayload::Boot(boot) => write!(
            line,
            " id=0x{:04X} seq-start={} wake={}s",
            boot.device_id, boot.sequence_start, boot.wake_seconds
        ),
        TelemetryPayload::Config(fault) => write!(line, " {fault}"),
        TelemetryPayload::Sample { raw_count } => write!(line, " raw={raw_count}"),
        TelemetryPayload::Reading(reading) => write!(
            line,
            " mean={} baseline={} moisture={}.{}%",
            reading.mean,
            reading.baseline,
            reading.normalized / 10,
            reading.normalized % 10
        ),
        TelemetryPayload::Report { sequence } => write!(line, " seq={sequence}"),
        TelemetryPayload::Counter { value } => write!(line, " value={value}"),
    };
    line
}

fn format_centi_celsius(centi: i16) -> String {
    let sign = if centi < 0 { "-" } else { "" };
    let magnitude = centi.unsigned_abs();
    format!("{sign}{}.{:02}C", magnitude / 100, magnitude % 100)
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: SoilProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: SoilProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Node,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Node => "NODE<",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_move_in_opposite_directions() {
        let drying: Vec<u32> = (0..40).map(|step| SoilProfile::Drying.raw_count(step)).collect();
        let watering: Vec<u32> = (0..40)
            .map(|step| SoilProfile::Watering.raw_count(step))
            .collect();

        assert!(drying[39] > drying[0] + 6_000);
        assert!(watering[39] < watering[0] - 10_000);
        assert!(watering.iter().all(|count| *count >= 28_500 - 80));
    }

    #[test]
    fn pinned_probe_ignores_profile() {
        let mut probe = SimulatedProbe::new(SoilProfile::Drying);
        probe.set_override(Some(31_000));
        assert_eq!(probe.measure_window(Duration::from_millis(100)), 31_000);
        probe.set_override(None);
        assert_eq!(
            probe.measure_window(Duration::from_millis(100)),
            SoilProfile::Drying.raw_count(1)
        );
    }

    #[test]
    fn temperatures_keep_their_sign() {
        assert_eq!(format_centi_celsius(2_150), "21.50C");
        assert_eq!(format_centi_celsius(-50), "-0.50C");
    }
}
