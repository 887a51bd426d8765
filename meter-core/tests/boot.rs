use core::time::Duration;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use meter_core::config::{
    ConfigFault, ConfigStore, DeviceConfig, MemoryConfigStore, PACKET_COUNTER_WRITE_CYCLE,
};
use meter_core::power::{BootError, PowerCycleController, WakeEvent, WakeSource};
use meter_core::probe::{FixedCounter, NoTemperatureSensor};
use meter_core::telemetry::{TelemetryEventKind, TelemetryPayload};
use meter_core::transport::{SensorStatus, Transport, VersionStatus};
use meter_core::wakeup::{DEFAULT_WAKE_INTERVAL_CODE, WakeIntervalCode};

#[derive(Default)]
struct TimerRadio {
    programmed: Option<WakeIntervalCode>,
    last_sequence: Option<u32>,
}

impl Transport for TimerRadio {
    type Error = ();

    fn send_sensor_status(&mut self, status: &SensorStatus) -> Result<(), Self::Error> {
        self.last_sequence = Some(status.sequence);
        Ok(())
    }

    fn send_version_status(&mut self, status: &VersionStatus) -> Result<(), Self::Error> {
        self.last_sequence = Some(status.sequence);
        Ok(())
    }

    fn configure_wake_timer(&mut self, code: WakeIntervalCode) -> Result<(), Self::Error> {
        self.programmed = Some(code);
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum StoreFault {
    Unreadable,
    WriteProtected,
}

struct BrokenStore(StoreFault);

impl ConfigStore for BrokenStore {
    type Error = StoreFault;

    fn load(&mut self) -> Result<DeviceConfig, Self::Error> {
        match self.0 {
            StoreFault::Unreadable => Err(StoreFault::Unreadable),
            StoreFault::WriteProtected => Ok(DeviceConfig::default()),
        }
    }

    fn advance_and_persist_sequence_counter(&mut self, _increment: u32) -> Result<u32, Self::Error> {
        Err(self.0)
    }

    fn persist_sequence_counter(&mut self, _value: u32) -> Result<(), Self::Error> {
        Err(self.0)
    }
}

/// Memory store whose first few runtime checkpoints fail.
#[derive(Clone)]
struct FlakyStore {
    inner: MemoryConfigStore,
    failing_writes: u32,
}

impl ConfigStore for FlakyStore {
    type Error = StoreFault;

    fn load(&mut self) -> Result<DeviceConfig, Self::Error> {
        Ok(self.inner.load().unwrap())
    }

    fn advance_and_persist_sequence_counter(&mut self, increment: u32) -> Result<u32, Self::Error> {
        Ok(self.inner.advance_and_persist_sequence_counter(increment).unwrap())
    }

    fn persist_sequence_counter(&mut self, value: u32) -> Result<(), Self::Error> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StoreFault::WriteProtected);
        }
        self.inner.persist_sequence_counter(value).unwrap();
        Ok(())
    }
}

struct CountingWake {
    waits: u32,
}

impl WakeSource for CountingWake {
    fn wait_for_wake(&mut self, interval: Duration) -> WakeEvent {
        assert!(interval >= Duration::from_secs(1));
        self.waits += 1;
        if self.waits % 2 == 0 {
            WakeEvent::PinChange
        } else {
            WakeEvent::Timer
        }
    }
}

#[test]
fn unreadable_config_is_fatal() {
    let result = PowerCycleController::boot(
        BrokenStore(StoreFault::Unreadable),
        TimerRadio::default(),
        FixedCounter::new([40_000]),
        NoTemperatureSensor,
        CountingWake { waits: 0 },
    );
    assert!(matches!(result, Err(BootError::Load(StoreFault::Unreadable))));
}

#[test]
fn counter_persist_failure_is_fatal() {
    let result = PowerCycleController::boot(
        BrokenStore(StoreFault::WriteProtected),
        TimerRadio::default(),
        FixedCounter::new([40_000]),
        NoTemperatureSensor,
        CountingWake { waits: 0 },
    );
    assert!(matches!(
        result,
        Err(BootError::Store(StoreFault::WriteProtected))
    ));
}

#[test]
fn boot_programs_sanitized_wake_interval() {
    let config = DeviceConfig::new(5, 35_000, 3, WakeIntervalCode::new(0xE0FF));
    let mut node = PowerCycleController::boot(
        MemoryConfigStore::new(config, 0),
        TimerRadio::default(),
        FixedCounter::new([40_000]),
        NoTemperatureSensor,
        CountingWake { waits: 0 },
    )
    .unwrap();

    assert_eq!(node.transport().programmed, Some(DEFAULT_WAKE_INTERVAL_CODE));
    assert_eq!(
        node.boot_report().faults.as_slice(),
        &[ConfigFault::WakeIntervalDefaulted { stored: 0xE0FF }]
    );

    node.run_cycle();
    assert_eq!(node.sleep(), WakeEvent::Timer);
    node.run_cycle();
    assert_eq!(node.sleep(), WakeEvent::PinChange);

    let records: heapless::Vec<TelemetryEventKind, 16> =
        node.telemetry().oldest_first().map(|r| r.event).collect();
    assert!(records.contains(&TelemetryEventKind::WokeByTimer));
    assert!(records.contains(&TelemetryEventKind::WokeByPinChange));
}

#[test]
fn restart_never_reuses_sequence_numbers() {
    let config = DeviceConfig::new(8, 35_000, 1, WakeIntervalCode::from_parts(250, 2));
    let mut store = MemoryConfigStore::new(config, 0);
    let mut highest_sent = 0;

    for _boot in 0..3 {
        let mut node = PowerCycleController::boot(
            store,
            TimerRadio::default(),
            FixedCounter::new([31_000, 33_000]),
            NoTemperatureSensor,
            CountingWake { waits: 0 },
        )
        .unwrap();

        let first = node.boot_report().sequence_start + 1;
        assert!(first > highest_sent, "sequence {first} reused after reboot");

        // Enough reports to cross a runtime checkpoint.
        for _ in 0..(PACKET_COUNTER_WRITE_CYCLE + 20) {
            node.run_cycle();
        }
        highest_sent = node.transport().last_sequence.unwrap();
        store = node.store().clone();
        assert!(store.sequence_counter() <= highest_sent);
        assert!(highest_sent - store.sequence_counter() < PACKET_COUNTER_WRITE_CYCLE);
    }
}

#[test]
fn failed_runtime_checkpoint_is_retried() {
    let config = DeviceConfig::new(8, 35_000, 1, WakeIntervalCode::default());
    let store = FlakyStore {
        inner: MemoryConfigStore::new(config, 0),
        failing_writes: 3,
    };
    let mut node = PowerCycleController::boot(
        store,
        TimerRadio::default(),
        FixedCounter::new([31_000, 33_000]),
        NoTemperatureSensor,
        CountingWake { waits: 0 },
    )
    .unwrap();

    let mut failed = 0;
    let mut written = heapless::Vec::<u32, 8>::new();
    for _ in 0..150 {
        if let Some(persisted) = node.run_cycle().persisted {
            match persisted.error {
                Some(_) => failed += 1,
                None => written.push(persisted.value).unwrap(),
            }
        }
    }

    // 200 fails, 201 and 202 retry and fail, 203 lands.
    assert_eq!(failed, 3);
    assert_eq!(written.as_slice(), &[203]);

    let highest_sent = node.transport().last_sequence.unwrap();
    let store = node.store().clone();
    assert_eq!(store.inner.sequence_counter(), 203);
    assert!(highest_sent - store.inner.sequence_counter() < PACKET_COUNTER_WRITE_CYCLE);

    let rebooted = PowerCycleController::boot(
        store,
        TimerRadio::default(),
        FixedCounter::new([31_000]),
        NoTemperatureSensor,
        CountingWake { waits: 0 },
    )
    .unwrap();
    let first = rebooted.boot_report().sequence_start + 1;
    assert!(first > highest_sent, "sequence {first} reused after reboot");
}

#[test]
fn runtime_checkpoint_is_logged() {
    let config = DeviceConfig::new(1, 35_000, 1, WakeIntervalCode::default());
    let mut node = PowerCycleController::boot(
        MemoryConfigStore::new(config, 50),
        TimerRadio::default(),
        FixedCounter::new([34_000]),
        NoTemperatureSensor,
        CountingWake { waits: 0 },
    )
    .unwrap();

    // Counter boots at 150; the fiftieth report lands on 200.
    let mut checkpoint = None;
    for _ in 0..50 {
        if let Some(persisted) = node.run_cycle().persisted {
            checkpoint = Some(persisted.value);
        }
    }
    assert_eq!(checkpoint, Some(200));
    assert_eq!(node.store().sequence_counter(), 200);

    let logged = node
        .telemetry()
        .oldest_first()
        .find(|record| record.event == TelemetryEventKind::CounterPersisted)
        .map(|record| record.details);
    assert_eq!(logged, Some(TelemetryPayload::Counter { value: 200 }));
}

/// Wake source that stops the endless loop after a few sleeps.
struct ResetAfter {
    sleeps: Rc<Cell<u32>>,
    limit: u32,
}

impl WakeSource for ResetAfter {
    fn wait_for_wake(&mut self, interval: Duration) -> WakeEvent {
        assert_eq!(interval, Duration::from_millis(205 << 9));
        self.sleeps.set(self.sleeps.get() + 1);
        assert!(self.sleeps.get() < self.limit, "reset");
        WakeEvent::Timer
    }
}

#[test]
fn run_alternates_cycles_and_sleeps() {
    let sleeps = Rc::new(Cell::new(0));
    let node = PowerCycleController::boot(
        MemoryConfigStore::new(DeviceConfig::default(), 0),
        TimerRadio::default(),
        FixedCounter::new([40_000]),
        NoTemperatureSensor,
        ResetAfter {
            sleeps: Rc::clone(&sleeps),
            limit: 3,
        },
    )
    .unwrap();

    let result = panic::catch_unwind(AssertUnwindSafe(move || {
        node.run();
    }));
    assert!(result.is_err());
    assert_eq!(sleeps.get(), 3);
}
