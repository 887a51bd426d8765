//! Console command dispatcher.
//!
//! Parsed commands are applied to any [`NodeConsole`]. The executor returns
//! structured outcomes; rendering is left to the front-end.

use crate::config::ConfigStore;
use crate::power::{PowerCycleController, WakeSource};
use crate::probe::{OscillatorCounter, TemperatureSensor};
use crate::scheduler::CycleSummary;
use crate::status::NodeStatusSnapshot;
use crate::telemetry::{TELEMETRY_RING_CAPACITY, TelemetryRecorder};
use crate::transport::{ReportKind, Transport};

use super::grammar::{self, BaselineCommand, Command, ProbeCommand};

/// Upper bound on cycles a single `tick` may run.
pub const MAX_TICKS_PER_COMMAND: u16 = 1_000;

/// Node operations the console can drive.
pub trait NodeConsole {
    /// Runs one wake cycle through to the following sleep.
    fn run_cycle(&mut self) -> CycleSummary;

    /// Pins the probe to a raw count, or releases it when `None`.
    fn override_probe(&mut self, raw_count: Option<u32>);

    fn reset_baseline(&mut self);

    fn snapshot(&self) -> NodeStatusSnapshot;

    fn telemetry(&self) -> &TelemetryRecorder;
}

/// Oscillator whose readings can be pinned from the console.
pub trait ProbeOverride {
    fn set_override(&mut self, raw_count: Option<u32>);
}

impl<O, P, T, S, W> NodeConsole for PowerCycleController<O, P, T, S, W>
where
    O: OscillatorCounter + ProbeOverride,
    P: TemperatureSensor,
    T: Transport,
    S: ConfigStore,
    W: WakeSource,
{
    fn run_cycle(&mut self) -> CycleSummary {
        let summary = CycleSummary::from(&PowerCycleController::run_cycle(self));
        self.sleep();
        summary
    }

    fn override_probe(&mut self, raw_count: Option<u32>) {
        self.oscillator_mut().set_override(raw_count);
    }

    fn reset_baseline(&mut self) {
        PowerCycleController::reset_baseline(self);
    }

    fn snapshot(&self) -> NodeStatusSnapshot {
        PowerCycleController::snapshot(self)
    }

    fn telemetry(&self) -> &TelemetryRecorder {
        PowerCycleController::telemetry(self)
    }
}

/// Aggregate of a `tick` command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub cycles: u16,
    pub sensor_reports: u16,
    pub version_reports: u16,
    pub failed_reports: u16,
    pub last: Option<CycleSummary>,
}

impl TickReport {
    fn absorb(&mut self, summary: CycleSummary) {
        self.cycles += 1;
        for emission in [summary.sensor_report, summary.version_report]
            .into_iter()
            .flatten()
        {
            match emission.kind {
                ReportKind::SensorStatus => self.sensor_reports += 1,
                ReportKind::VersionStatus => self.version_reports += 1,
            }
            if !emission.delivered {
                self.failed_reports += 1;
            }
        }
        self.last = Some(summary);
    }
}

/// Help entry for one command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HelpEntry {
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

const HELP: [HelpEntry; 6] = [
    HelpEntry {
        name: "tick",
        usage: "tick [count]",
        summary: "run wake cycles (default 1)",
    },
    HelpEntry {
        name: "probe",
        usage: "probe <raw>|auto",
        summary: "pin the oscillator count or return to the soil profile",
    },
    HelpEntry {
        name: "baseline",
        usage: "baseline reset",
        summary: "forget the learned wet baseline",
    },
    HelpEntry {
        name: "status",
        usage: "status",
        summary: "show configuration, calibration and counters",
    },
    HelpEntry {
        name: "log",
        usage: "log [count]",
        summary: "print recent telemetry records",
    },
    HelpEntry {
        name: "help",
        usage: "help [command]",
        summary: "list commands or describe one",
    },
];

/// Looks up the help entry for `name`.
#[must_use]
pub fn help_entry(name: &str) -> Option<&'static HelpEntry> {
    HELP.iter().find(|entry| entry.name.eq_ignore_ascii_case(name))
}

/// Returns every help entry in display order.
#[must_use]
pub fn help_entries() -> &'static [HelpEntry] {
    &HELP
}

/// Command execution successes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleOutcome {
    Ticked(TickReport),
    Probe(ProbeCommand),
    BaselineReset { previous: Option<u32> },
    Status(NodeStatusSnapshot),
    /// Caller should print the newest `count` telemetry records.
    Log { count: usize },
    Help(Option<&'static HelpEntry>),
}

/// Errors surfaced while executing a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleError<'a> {
    Parse(grammar::ParseError<'a>),
    UnknownTopic(&'a str),
    Unsupported(&'static str),
}

impl<'a> From<grammar::ParseError<'a>> for ConsoleError<'a> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl core::fmt::Display for ConsoleError<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConsoleError::Parse(err) => err.fmt(f),
            ConsoleError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
            ConsoleError::Unsupported(reason) => f.write_str(reason),
        }
    }
}

/// Dispatches console commands to a node.
pub struct ConsoleExecutor<N> {
    node: N,
}

impl<N> ConsoleExecutor<N> {
    pub const fn new(node: N) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut N {
        &mut self.node
    }

    pub fn into_inner(self) -> N {
        self.node
    }
}

impl<N: NodeConsole> ConsoleExecutor<N> {
    /// Parses and executes one line.
    pub fn execute<'a>(&mut self, line: &'a str) -> Result<ConsoleOutcome, ConsoleError<'a>> {
        self.execute_with(line, |_, _| {})
    }

    /// Parses and executes one line, reporting each wake cycle to `on_cycle`
    /// along with its index within the command.
    pub fn execute_with<'a, F>(
        &mut self,
        line: &'a str,
        mut on_cycle: F,
    ) -> Result<ConsoleOutcome, ConsoleError<'a>>
    where
        F: FnMut(u16, &CycleSummary),
    {
        match grammar::parse(line)? {
            Command::Tick { count: 0 } => {
                Err(ConsoleError::Unsupported("tick count must be at least 1"))
            }
            Command::Tick { count } if count > MAX_TICKS_PER_COMMAND => {
                Err(ConsoleError::Unsupported("tick count must be at most 1000"))
            }
            Command::Tick { count } => {
                let mut report = TickReport::default();
                for index in 0..count {
                    let summary = self.node.run_cycle();
                    on_cycle(index, &summary);
                    report.absorb(summary);
                }
                Ok(ConsoleOutcome::Ticked(report))
            }
            Command::Probe(mode) => {
                self.node.override_probe(match mode {
                    ProbeCommand::Fixed(raw) => Some(raw),
                    ProbeCommand::Auto => None,
                });
                Ok(ConsoleOutcome::Probe(mode))
            }
            Command::Baseline(BaselineCommand::Reset) => {
                let previous = self.node.snapshot().baseline;
                self.node.reset_baseline();
                Ok(ConsoleOutcome::BaselineReset { previous })
            }
            Command::Status => Ok(ConsoleOutcome::Status(self.node.snapshot())),
            Command::Log { count } => {
                let retained = self.node.telemetry().len();
                let count = count.map_or(TELEMETRY_RING_CAPACITY, usize::from);
                Ok(ConsoleOutcome::Log {
                    count: count.min(retained),
                })
            }
            Command::Help { topic: None } => Ok(ConsoleOutcome::Help(None)),
            Command::Help { topic: Some(topic) } => help_entry(topic)
                .map(|entry| ConsoleOutcome::Help(Some(entry)))
                .ok_or(ConsoleError::UnknownTopic(topic)),
        }
    }
}
