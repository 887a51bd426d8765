//! Cycle telemetry catalog and ring buffer shared by firmware and host targets.
//!
//! The node has no wall clock, so records are stamped with the wake-cycle
//! index since boot. Event kinds encode to compact numeric codes so the
//! firmware can mirror them over the diagnostics channel.

use core::{convert::TryFrom, fmt};

use heapless::{HistoryBuf, OldestOrdered};

use crate::calibration::AveragedReading;
use crate::config::ConfigFault;
use crate::transport::ReportKind;

/// Identifier assigned to each telemetry record.
pub type EventId = u32;

/// Wake cycles elapsed since boot.
pub type CycleIndex = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    Booted,
    ConfigDefaulted,
    WokeByTimer,
    WokeByPinChange,
    SampleTaken,
    ReadingAveraged,
    ReportSent(ReportKind),
    ReportFailed(ReportKind),
    CounterPersisted,
    CounterPersistFailed,
    BaselineReset,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::Booted => f.write_str("booted"),
            TelemetryEventKind::ConfigDefaulted => f.write_str("config-defaulted"),
            TelemetryEventKind::WokeByTimer => f.write_str("woke timer"),
            TelemetryEventKind::WokeByPinChange => f.write_str("woke pin-change"),
            TelemetryEventKind::SampleTaken => f.write_str("sample"),
            TelemetryEventKind::ReadingAveraged => f.write_str("reading"),
            TelemetryEventKind::ReportSent(kind) => write!(f, "sent {kind}"),
            TelemetryEventKind::ReportFailed(kind) => write!(f, "send-failed {kind}"),
            TelemetryEventKind::CounterPersisted => f.write_str("counter-persisted"),
            TelemetryEventKind::CounterPersistFailed => f.write_str("counter-persist-failed"),
            TelemetryEventKind::BaselineReset => f.write_str("baseline-reset"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const BOOTED_CODE: u16 = 0x0000;
    const CONFIG_DEFAULTED_CODE: u16 = 0x0001;
    const WOKE_TIMER_CODE: u16 = 0x0002;
    const WOKE_PIN_CODE: u16 = 0x0003;
    const SAMPLE_CODE: u16 = 0x0004;
    const READING_CODE: u16 = 0x0005;
    const REPORT_SENT_BASE: u16 = 0x0010;
    const REPORT_FAILED_BASE: u16 = 0x0014;
    const COUNTER_PERSISTED_CODE: u16 = 0x0020;
    const COUNTER_PERSIST_FAILED_CODE: u16 = 0x0021;
    const BASELINE_RESET_CODE: u16 = 0x0022;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::Booted => Self::BOOTED_CODE,
            TelemetryEventKind::ConfigDefaulted => Self::CONFIG_DEFAULTED_CODE,
            TelemetryEventKind::WokeByTimer => Self::WOKE_TIMER_CODE,
            TelemetryEventKind::WokeByPinChange => Self::WOKE_PIN_CODE,
            TelemetryEventKind::SampleTaken => Self::SAMPLE_CODE,
            TelemetryEventKind::ReadingAveraged => Self::READING_CODE,
            TelemetryEventKind::ReportSent(kind) => Self::REPORT_SENT_BASE + report_index(kind),
            TelemetryEventKind::ReportFailed(kind) => {
                Self::REPORT_FAILED_BASE + report_index(kind)
            }
            TelemetryEventKind::CounterPersisted => Self::COUNTER_PERSISTED_CODE,
            TelemetryEventKind::CounterPersistFailed => Self::COUNTER_PERSIST_FAILED_CODE,
            TelemetryEventKind::BaselineReset => Self::BASELINE_RESET_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::BOOTED_CODE => TelemetryEventKind::Booted,
            Self::CONFIG_DEFAULTED_CODE => TelemetryEventKind::ConfigDefaulted,
            Self::WOKE_TIMER_CODE => TelemetryEventKind::WokeByTimer,
            Self::WOKE_PIN_CODE => TelemetryEventKind::WokeByPinChange,
            Self::SAMPLE_CODE => TelemetryEventKind::SampleTaken,
            Self::READING_CODE => TelemetryEventKind::ReadingAveraged,
            Self::COUNTER_PERSISTED_CODE => TelemetryEventKind::CounterPersisted,
            Self::COUNTER_PERSIST_FAILED_CODE => TelemetryEventKind::CounterPersistFailed,
            Self::BASELINE_RESET_CODE => TelemetryEventKind::BaselineReset,
            value if (Self::REPORT_SENT_BASE..Self::REPORT_FAILED_BASE).contains(&value) => {
                report_from_index(value - Self::REPORT_SENT_BASE)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::ReportSent)
            }
            value
                if (Self::REPORT_FAILED_BASE..Self::COUNTER_PERSISTED_CODE).contains(&value) =>
            {
                report_from_index(value - Self::REPORT_FAILED_BASE)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::ReportFailed)
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Boot summary.
    Boot(BootTelemetry),
    /// Configuration value that was replaced.
    Config(ConfigFault),
    /// Raw oscillator count for one window.
    Sample { raw_count: u32 },
    /// Completed averaging window.
    Reading(AveragedReading),
    /// Sequence number consumed by a report.
    Report { sequence: u32 },
    /// Packet counter checkpoint.
    Counter { value: u32 },
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Values captured once the boot sequence finishes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BootTelemetry {
    pub device_id: u16,
    pub sequence_start: u32,
    pub wake_seconds: u32,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub cycle: CycleIndex,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total number of events recorded since boot, including evicted ones.
    pub fn total_recorded(&self) -> u32 {
        self.next_event_id
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        cycle: CycleIndex,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            cycle,
            event,
            details: payload,
        });

        id
    }

    /// Records a report emission attempt.
    pub fn record_report(
        &mut self,
        kind: ReportKind,
        sequence: u32,
        delivered: bool,
        cycle: CycleIndex,
    ) -> EventId {
        let event = if delivered {
            TelemetryEventKind::ReportSent(kind)
        } else {
            TelemetryEventKind::ReportFailed(kind)
        };
        self.record(event, TelemetryPayload::Report { sequence }, cycle)
    }

    /// Returns up to `count` of the most recent records, oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &TelemetryRecord> {
        let skip = self.len().saturating_sub(count);
        self.oldest_first().skip(skip)
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

const fn report_index(kind: ReportKind) -> u16 {
    match kind {
        ReportKind::SensorStatus => 0,
        ReportKind::VersionStatus => 1,
    }
}

fn report_from_index(index: u16) -> Option<ReportKind> {
    match index {
        0 => Some(ReportKind::SensorStatus),
        1 => Some(ReportKind::VersionStatus),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_events_round_trip() {
        let fixtures = [
            (TelemetryEventKind::ReportSent(ReportKind::SensorStatus), 0x10),
            (TelemetryEventKind::ReportSent(ReportKind::VersionStatus), 0x11),
            (TelemetryEventKind::ReportFailed(ReportKind::VersionStatus), 0x15),
        ];

        for (event, code) in fixtures {
            assert_eq!(event.to_raw(), code);
            assert_eq!(TelemetryEventKind::from_raw(code), event);
        }
    }

    #[test]
    fn unknown_codes_decode_as_custom() {
        assert_eq!(
            TelemetryEventKind::from_raw(0x0012),
            TelemetryEventKind::Custom(0x0012)
        );
        assert_eq!(
            TelemetryEventKind::from_raw(0xBEEF),
            TelemetryEventKind::Custom(0xBEEF)
        );
    }

    #[test]
    fn records_reports_with_sequence() {
        let mut recorder = TelemetryRecorder::<8>::new();
        let first = recorder.record_report(ReportKind::VersionStatus, 101, true, 0);
        let second = recorder.record_report(ReportKind::SensorStatus, 102, false, 3);
        assert_eq!((first, second), (0, 1));

        let latest = recorder.latest().copied().unwrap();
        assert_eq!(latest.cycle, 3);
        assert_eq!(
            latest.event,
            TelemetryEventKind::ReportFailed(ReportKind::SensorStatus)
        );
        assert_eq!(latest.details, TelemetryPayload::Report { sequence: 102 });
    }

    #[test]
    fn ring_keeps_newest_entries() {
        let mut recorder = TelemetryRecorder::<4>::new();
        for cycle in 0..10 {
            recorder.record(
                TelemetryEventKind::SampleTaken,
                TelemetryPayload::Sample { raw_count: cycle },
                cycle,
            );
        }

        assert_eq!(recorder.len(), 4);
        assert_eq!(recorder.total_recorded(), 10);
        let cycles: heapless::Vec<u32, 4> = recorder.oldest_first().map(|r| r.cycle).collect();
        assert_eq!(cycles.as_slice(), &[6, 7, 8, 9]);

        let tail: heapless::Vec<u32, 4> = recorder.recent(2).map(|r| r.cycle).collect();
        assert_eq!(tail.as_slice(), &[8, 9]);
    }
}
