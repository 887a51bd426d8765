//! Per-wake-cycle measurement and reporting decisions.
//!
//! One [`ReportScheduler::tick`] runs per wake cycle: it samples the probe,
//! folds the count into the calibration, and emits at most one sensor report
//! and at most one version report. Transport results are captured in the
//! returned [`CycleOutcome`] and never retried.

use core::fmt;

use crate::calibration::{AveragedReading, CalibrationState};
use crate::config::{ConfigStore, DeviceConfig, PACKET_COUNTER_WRITE_CYCLE};
use crate::probe::{OscillatorCounter, SAMPLE_WINDOW, TemperatureSensor};
use crate::transport::{ReportKind, SensorStatus, Transport, VersionStatus};
use crate::version::FIRMWARE_VERSION;

/// Wake cycles between firmware version reports.
pub const VERSION_REPORT_CADENCE: u16 = 50;

/// Scheduler phases within a single wake cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedulerPhase {
    Idle,
    Measuring,
    ReadyToReport,
}

impl SchedulerPhase {
    /// Returns `true` when `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: SchedulerPhase) -> bool {
        matches!(
            (self, next),
            (SchedulerPhase::Idle, SchedulerPhase::Measuring)
                | (
                    SchedulerPhase::Measuring,
                    SchedulerPhase::ReadyToReport | SchedulerPhase::Idle
                )
                | (SchedulerPhase::ReadyToReport, SchedulerPhase::Idle)
        )
    }

    /// Validates a transition and returns the new phase.
    pub const fn transition(self, next: SchedulerPhase) -> Result<SchedulerPhase, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new(self, next))
        }
    }
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchedulerPhase::Idle => "idle",
            SchedulerPhase::Measuring => "measuring",
            SchedulerPhase::ReadyToReport => "ready-to-report",
        })
    }
}

/// Failure reported when attempting an invalid phase transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransitionError {
    pub from: SchedulerPhase,
    pub to: SchedulerPhase,
}

impl TransitionError {
    /// Creates a new transition error describing the attempted phases.
    #[must_use]
    pub const fn new(from: SchedulerPhase, to: SchedulerPhase) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition {} -> {}", self.from, self.to)
    }
}

/// Result of advancing the packet counter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequenceAdvance {
    pub value: u32,
    pub persist_due: bool,
}

/// Monotonic packet counter seeded from persistent storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequenceCounter {
    value: u32,
    checkpoint_pending: bool,
}

impl SequenceCounter {
    #[must_use]
    pub const fn new(start: u32) -> Self {
        Self {
            value: start,
            checkpoint_pending: false,
        }
    }

    /// Last value handed out (or the boot seed if none yet).
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    /// Returns `true` while a failed checkpoint still has to be rewritten.
    #[must_use]
    pub const fn checkpoint_pending(&self) -> bool {
        self.checkpoint_pending
    }

    /// Moves to the next sequence number.
    ///
    /// `persist_due` is set whenever the new value lands on a multiple of
    /// [`PACKET_COUNTER_WRITE_CYCLE`], and on every advance after a failed
    /// checkpoint until a write succeeds.
    ///
    /// The counter wraps at `u32::MAX`. At the shortest wake interval that is
    /// more than a century of reports, so wrap-around is accepted.
    pub fn advance(&mut self) -> SequenceAdvance {
        self.value = self.value.wrapping_add(1);
        SequenceAdvance {
            value: self.value,
            persist_due: self.checkpoint_pending
                || self.value % PACKET_COUNTER_WRITE_CYCLE == 0,
        }
    }

    /// Records whether the checkpoint requested by the last advance was written.
    pub fn record_checkpoint(&mut self, written: bool) {
        self.checkpoint_pending = !written;
    }
}

/// Counters mutated on every wake cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReportingState {
    wake_cycles_since_version_report: u16,
    sequence: SequenceCounter,
}

impl ReportingState {
    /// Creates reporting state that announces the firmware version on the
    /// first cycle after boot.
    #[must_use]
    pub const fn new(sequence_start: u32) -> Self {
        Self {
            wake_cycles_since_version_report: VERSION_REPORT_CADENCE - 1,
            sequence: SequenceCounter::new(sequence_start),
        }
    }

    #[must_use]
    pub const fn wake_cycles_since_version_report(&self) -> u16 {
        self.wake_cycles_since_version_report
    }

    #[must_use]
    pub const fn sequence(&self) -> &SequenceCounter {
        &self.sequence
    }

    /// Counts one wake cycle and reports whether a version report is due.
    pub fn note_wake_cycle(&mut self) -> bool {
        self.wake_cycles_since_version_report += 1;
        if self.wake_cycles_since_version_report >= VERSION_REPORT_CADENCE {
            self.wake_cycles_since_version_report = 0;
            true
        } else {
            false
        }
    }

    fn next_sequence(&mut self) -> SequenceAdvance {
        self.sequence.advance()
    }

    fn record_checkpoint(&mut self, written: bool) {
        self.sequence.record_checkpoint(written);
    }
}

/// All mutable node state, owned by the power-cycle controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NodeState {
    pub config: DeviceConfig,
    pub calibration: CalibrationState,
    pub reporting: ReportingState,
}

impl NodeState {
    /// Builds fresh state from a sanitized configuration and the boot seed
    /// of the packet counter.
    #[must_use]
    pub const fn new(config: DeviceConfig, sequence_start: u32) -> Self {
        Self {
            config,
            calibration: CalibrationState::new(config.averaging_factor),
            reporting: ReportingState::new(sequence_start),
        }
    }
}

/// One attempted report.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Emission<E> {
    pub kind: ReportKind,
    pub sequence: u32,
    /// Transport error, if the send failed.
    pub error: Option<E>,
}

impl<E> Emission<E> {
    /// Returns `true` when the transport accepted the report.
    pub const fn delivered(&self) -> bool {
        self.error.is_none()
    }
}

/// Runtime checkpoint of the packet counter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PersistOutcome<E> {
    pub value: u32,
    pub error: Option<E>,
}

/// Everything that happened during one wake cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleOutcome<TE, SE> {
    pub raw_count: u32,
    pub reading: Option<AveragedReading>,
    pub sensor_report: Option<Emission<TE>>,
    pub version_report: Option<Emission<TE>>,
    pub persisted: Option<PersistOutcome<SE>>,
}

impl<TE, SE> CycleOutcome<TE, SE> {
    /// Number of reports attempted this cycle.
    pub fn emissions(&self) -> u32 {
        u32::from(self.sensor_report.is_some()) + u32::from(self.version_report.is_some())
    }
}

/// Error-free view of a report attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EmissionSummary {
    pub kind: ReportKind,
    pub sequence: u32,
    pub delivered: bool,
}

impl<E> From<&Emission<E>> for EmissionSummary {
    fn from(emission: &Emission<E>) -> Self {
        Self {
            kind: emission.kind,
            sequence: emission.sequence,
            delivered: emission.delivered(),
        }
    }
}

/// [`CycleOutcome`] with collaborator errors reduced to flags, for diagnostics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleSummary {
    pub raw_count: u32,
    pub reading: Option<AveragedReading>,
    pub sensor_report: Option<EmissionSummary>,
    pub version_report: Option<EmissionSummary>,
    /// Checkpointed counter value and whether the write succeeded.
    pub persisted: Option<(u32, bool)>,
}

impl<TE, SE> From<&CycleOutcome<TE, SE>> for CycleSummary {
    fn from(outcome: &CycleOutcome<TE, SE>) -> Self {
        Self {
            raw_count: outcome.raw_count,
            reading: outcome.reading,
            sensor_report: outcome.sensor_report.as_ref().map(EmissionSummary::from),
            version_report: outcome.version_report.as_ref().map(EmissionSummary::from),
            persisted: outcome
                .persisted
                .as_ref()
                .map(|persisted| (persisted.value, persisted.error.is_none())),
        }
    }
}

impl fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "raw={}", self.raw_count)?;
        if let Some(reading) = self.reading {
            write!(
                f,
                " mean={} baseline={} moisture={}.{}%",
                reading.mean,
                reading.baseline,
                reading.normalized / 10,
                reading.normalized % 10
            )?;
        }
        for emission in [self.sensor_report, self.version_report].into_iter().flatten() {
            write!(
                f,
                " {}#{}={}",
                emission.kind,
                emission.sequence,
                if emission.delivered { "sent" } else { "failed" }
            )?;
        }
        if let Some((value, ok)) = self.persisted {
            write!(f, " counter={value}{}", if ok { "" } else { "(write failed)" })?;
        }
        Ok(())
    }
}

/// Drives the measurement state machine one wake cycle at a time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReportScheduler {
    phase: SchedulerPhase,
}

impl ReportScheduler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: SchedulerPhase::Idle,
        }
    }

    /// Current phase; always [`SchedulerPhase::Idle`] between cycles.
    #[must_use]
    pub const fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Runs one full wake cycle: sample, average, and report.
    pub fn tick<O, P, T, S>(
        &mut self,
        node: &mut NodeState,
        oscillator: &mut O,
        temperature: &mut P,
        transport: &mut T,
        store: &mut S,
    ) -> CycleOutcome<T::Error, S::Error>
    where
        O: OscillatorCounter,
        P: TemperatureSensor,
        T: Transport,
        S: ConfigStore,
    {
        self.enter(SchedulerPhase::Measuring);
        let raw_count = oscillator.measure_window(SAMPLE_WINDOW);
        self.complete_cycle(node, raw_count, temperature, transport, store)
    }

    /// Runs a wake cycle with a raw count the caller sampled itself.
    pub fn process_sample<P, T, S>(
        &mut self,
        node: &mut NodeState,
        raw_count: u32,
        temperature: &mut P,
        transport: &mut T,
        store: &mut S,
    ) -> CycleOutcome<T::Error, S::Error>
    where
        P: TemperatureSensor,
        T: Transport,
        S: ConfigStore,
    {
        self.enter(SchedulerPhase::Measuring);
        self.complete_cycle(node, raw_count, temperature, transport, store)
    }

    fn complete_cycle<P, T, S>(
        &mut self,
        node: &mut NodeState,
        raw_count: u32,
        temperature: &mut P,
        transport: &mut T,
        store: &mut S,
    ) -> CycleOutcome<T::Error, S::Error>
    where
        P: TemperatureSensor,
        T: Transport,
        S: ConfigStore,
    {
        let reading = node
            .calibration
            .absorb(raw_count, node.config.moisture_threshold);
        let version_due = node.reporting.note_wake_cycle();

        let mut outcome = CycleOutcome {
            raw_count,
            reading,
            sensor_report: None,
            version_report: None,
            persisted: None,
        };

        if reading.is_none() && !version_due {
            self.enter(SchedulerPhase::Idle);
            return outcome;
        }
        self.enter(SchedulerPhase::ReadyToReport);

        if let Some(reading) = reading {
            let advance = node.reporting.next_sequence();
            let status = SensorStatus {
                device_id: node.config.device_id,
                sequence: advance.value,
                normalized: reading.normalized_u16(),
                temperature_centi: temperature.read_centi_celsius().unwrap_or(0),
            };
            outcome.sensor_report = Some(Emission {
                kind: ReportKind::SensorStatus,
                sequence: advance.value,
                error: transport.send_sensor_status(&status).err(),
            });
            checkpoint(advance, &mut node.reporting, store, &mut outcome.persisted);
        }

        if version_due {
            let advance = node.reporting.next_sequence();
            let status = VersionStatus {
                device_id: node.config.device_id,
                sequence: advance.value,
                version: FIRMWARE_VERSION,
            };
            outcome.version_report = Some(Emission {
                kind: ReportKind::VersionStatus,
                sequence: advance.value,
                error: transport.send_version_status(&status).err(),
            });
            checkpoint(advance, &mut node.reporting, store, &mut outcome.persisted);
        }

        self.enter(SchedulerPhase::Idle);
        outcome
    }

    fn enter(&mut self, next: SchedulerPhase) {
        // A cycle always runs to completion, so the only recoverable misuse is
        // a cycle that starts outside Idle; it restarts from the requested phase.
        self.phase = self.phase.transition(next).unwrap_or(next);
    }
}

impl Default for ReportScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes the counter when due. A failed write keeps the checkpoint pending
/// so the next report retries it with the newer value.
fn checkpoint<S: ConfigStore>(
    advance: SequenceAdvance,
    reporting: &mut ReportingState,
    store: &mut S,
    persisted: &mut Option<PersistOutcome<S::Error>>,
) {
    if advance.persist_due {
        let error = store.persist_sequence_counter(advance.value).err();
        reporting.record_checkpoint(error.is_none());
        *persisted = Some(PersistOutcome {
            value: advance.value,
            error,
        });
    }
}
