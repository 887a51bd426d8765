use core::time::Duration;

use heapless::Vec as HeaplessVec;
use meter_core::config::{DeviceConfig, MemoryConfigStore};
use meter_core::power::{ImmediateWake, PowerCycleController};
use meter_core::probe::{OscillatorCounter, TemperatureSensor};
use meter_core::scheduler::VERSION_REPORT_CADENCE;
use meter_core::transport::{SensorStatus, Transport, VersionStatus};
use meter_core::version::FIRMWARE_VERSION;
use meter_core::wakeup::WakeIntervalCode;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Sent {
    Sensor(SensorStatus),
    Version(VersionStatus),
}

impl Sent {
    fn sequence(&self) -> u32 {
        match self {
            Sent::Sensor(status) => status.sequence,
            Sent::Version(status) => status.sequence,
        }
    }
}

#[derive(Default)]
struct MockRadio {
    sent: HeaplessVec<Sent, 256>,
    reject_all: bool,
}

impl Transport for MockRadio {
    type Error = ();

    fn send_sensor_status(&mut self, status: &SensorStatus) -> Result<(), Self::Error> {
        self.sent.push(Sent::Sensor(*status)).expect("mock capacity");
        if self.reject_all { Err(()) } else { Ok(()) }
    }

    fn send_version_status(&mut self, status: &VersionStatus) -> Result<(), Self::Error> {
        self.sent.push(Sent::Version(*status)).expect("mock capacity");
        if self.reject_all { Err(()) } else { Ok(()) }
    }

    fn configure_wake_timer(&mut self, _code: WakeIntervalCode) -> Result<(), Self::Error> {
        Ok(())
    }
}

struct ScriptedProbe {
    counts: &'static [u32],
    next: usize,
    windows: HeaplessVec<Duration, 4>,
}

impl ScriptedProbe {
    fn new(counts: &'static [u32]) -> Self {
        Self {
            counts,
            next: 0,
            windows: HeaplessVec::new(),
        }
    }
}

impl OscillatorCounter for ScriptedProbe {
    fn measure_window(&mut self, window: Duration) -> u32 {
        if self.windows.is_empty() {
            self.windows.push(window).expect("capacity");
        }
        let count = self.counts[self.next % self.counts.len()];
        self.next += 1;
        count
    }
}

struct FixedTemperature(i16);

impl TemperatureSensor for FixedTemperature {
    fn read_centi_celsius(&mut self) -> Option<i16> {
        Some(self.0)
    }
}

type Node = PowerCycleController<
    ScriptedProbe,
    FixedTemperature,
    MockRadio,
    MemoryConfigStore,
    ImmediateWake,
>;

fn boot(factor: u16, counts: &'static [u32], radio: MockRadio) -> Node {
    let config = DeviceConfig::new(0x2A, 35_000, factor, WakeIntervalCode::default());
    PowerCycleController::boot(
        MemoryConfigStore::new(config, 0),
        radio,
        ScriptedProbe::new(counts),
        FixedTemperature(2_150),
        ImmediateWake,
    )
    .expect("memory store never fails")
}

#[test]
fn sensor_reports_follow_averaging_factor() {
    let mut node = boot(4, &[40_000], MockRadio::default());
    for _ in 0..120 {
        node.run_cycle();
    }

    let sensor = node
        .transport()
        .sent
        .iter()
        .filter(|sent| matches!(sent, Sent::Sensor(_)))
        .count();
    assert_eq!(sensor, 30, "one sensor report per four wake cycles");
}

#[test]
fn version_reports_follow_cadence() {
    let mut node = boot(3, &[40_000], MockRadio::default());
    let mut version_cycles: HeaplessVec<u32, 8> = HeaplessVec::new();

    for cycle in 0..(3 * u32::from(VERSION_REPORT_CADENCE) + 1) {
        let outcome = node.run_cycle();
        if let Some(version) = outcome.version_report {
            assert!(version.delivered());
            version_cycles.push(cycle).expect("capacity");
        }
    }

    assert_eq!(version_cycles.as_slice(), &[0, 50, 100, 150]);

    let first_version = node
        .transport()
        .sent
        .iter()
        .find_map(|sent| match sent {
            Sent::Version(status) => Some(*status),
            Sent::Sensor(_) => None,
        })
        .expect("version sent on first cycle");
    assert_eq!(first_version.version, FIRMWARE_VERSION);
    assert_eq!(first_version.device_id, 0x2A);
}

#[test]
fn sequence_increments_once_per_report() {
    let mut node = boot(2, &[33_000, 31_000], MockRadio::default());
    let start = node.boot_report().sequence_start;

    for _ in 0..60 {
        node.run_cycle();
    }

    let sent = &node.transport().sent;
    // 30 sensor reports plus version reports on cycles 0 and 50.
    assert_eq!(sent.len(), 32);
    for (offset, report) in sent.iter().enumerate() {
        assert_eq!(report.sequence(), start + 1 + offset as u32);
    }
    assert_eq!(node.node().reporting.sequence().value(), start + 32);
}

#[test]
fn rejected_sends_still_consume_sequence_numbers() {
    let radio = MockRadio {
        reject_all: true,
        ..MockRadio::default()
    };
    let mut node = boot(1, &[32_000], radio);

    let first = node.run_cycle();
    let second = node.run_cycle();

    let sensor = first.sensor_report.expect("factor 1 reports every cycle");
    assert!(!sensor.delivered());
    let version = first.version_report.expect("version on first cycle");
    assert!(!version.delivered());
    assert_eq!(
        second.sensor_report.map(|emission| emission.sequence),
        Some(version.sequence + 1)
    );
}

#[test]
fn reports_carry_normalized_reading_and_temperature() {
    // Means 30000 then 32000 with threshold 35000.
    let mut node = boot(1, &[30_000, 32_000], MockRadio::default());
    node.run_cycle();
    node.run_cycle();

    let readings: HeaplessVec<(u16, i16), 2> = node
        .transport()
        .sent
        .iter()
        .filter_map(|sent| match sent {
            Sent::Sensor(status) => Some((status.normalized, status.temperature_centi)),
            Sent::Version(_) => None,
        })
        .collect();
    assert_eq!(readings.as_slice(), &[(1_000, 2_150), (600, 2_150)]);
    assert_eq!(
        node.oscillator_mut().windows.as_slice(),
        &[Duration::from_millis(100)]
    );
}
