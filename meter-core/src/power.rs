//! Boot sequence and the wake/measure/sleep loop.
//!
//! [`PowerCycleController`] owns the node state and every collaborator. Each
//! wake cycle runs to completion before the controller suspends in
//! [`WakeSource::wait_for_wake`]; nothing touches the state while it sleeps.

use core::fmt;
use core::time::Duration;

use crate::config::{ConfigFaults, ConfigStore, PACKET_COUNTER_WRITE_CYCLE};
use crate::probe::{OscillatorCounter, TemperatureSensor};
use crate::scheduler::{CycleOutcome, NodeState, ReportScheduler};
use crate::status::NodeStatusSnapshot;
use crate::telemetry::{
    BootTelemetry, CycleIndex, TelemetryEventKind, TelemetryPayload, TelemetryRecorder,
};
use crate::transport::Transport;
use crate::wakeup::{WakeInterval, decode};

/// Hardware signal that ended a sleep.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WakeEvent {
    Timer,
    PinChange,
}

/// Blocking suspension point between wake cycles.
pub trait WakeSource {
    /// Halts until the wake timer expires or another wake signal arrives.
    fn wait_for_wake(&mut self, interval: Duration) -> WakeEvent;
}

/// Wake source that returns immediately, for hosts driving cycles manually
/// and for async runtimes that await the sleep and call
/// [`PowerCycleController::note_wake`] themselves.
#[derive(Copy, Clone, Debug, Default)]
pub struct ImmediateWake;

impl WakeSource for ImmediateWake {
    fn wait_for_wake(&mut self, _interval: Duration) -> WakeEvent {
        WakeEvent::Timer
    }
}

/// Fatal errors raised while booting.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootError<E> {
    /// Configuration could not be read.
    Load(E),
    /// Packet counter could not be advanced and persisted.
    Store(E),
}

impl<E> BootError<E> {
    /// Maps the inner error type.
    pub fn map_other<F, M>(self, mapper: M) -> BootError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            BootError::Load(err) => BootError::Load(mapper(err)),
            BootError::Store(err) => BootError::Store(mapper(err)),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for BootError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::Load(err) => write!(f, "config load failed: {err:?}"),
            BootError::Store(err) => write!(f, "packet counter persist failed: {err:?}"),
        }
    }
}

/// What the boot sequence found and applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootReport<TE> {
    pub faults: ConfigFaults,
    pub sequence_start: u32,
    pub wake_interval: WakeInterval,
    /// Error returned while programming the wake timer, if any.
    pub wake_timer_error: Option<TE>,
}

/// Owns the node and drives it through wake cycles.
pub struct PowerCycleController<O, P, T: Transport, S, W> {
    oscillator: O,
    temperature: P,
    transport: T,
    store: S,
    wake: W,
    node: NodeState,
    scheduler: ReportScheduler,
    telemetry: TelemetryRecorder,
    boot_report: BootReport<T::Error>,
    cycle: CycleIndex,
}

impl<O, P, T, S, W> PowerCycleController<O, P, T, S, W>
where
    O: OscillatorCounter,
    P: TemperatureSensor,
    T: Transport,
    S: ConfigStore,
    W: WakeSource,
{
    /// Loads and sanitizes the configuration, advances the persisted packet
    /// counter, and programs the wake timer.
    pub fn boot(
        mut store: S,
        mut transport: T,
        oscillator: O,
        temperature: P,
        wake: W,
    ) -> Result<Self, BootError<S::Error>> {
        let stored = store.load().map_err(BootError::Load)?;
        let (config, faults) = stored.sanitized();
        let sequence_start = store
            .advance_and_persist_sequence_counter(PACKET_COUNTER_WRITE_CYCLE)
            .map_err(BootError::Store)?;

        let wake_interval = decode(config.wake_interval);
        let wake_timer_error = transport.configure_wake_timer(wake_interval.code).err();

        let mut telemetry = TelemetryRecorder::new();
        for fault in &faults {
            telemetry.record(
                TelemetryEventKind::ConfigDefaulted,
                TelemetryPayload::Config(*fault),
                0,
            );
        }
        telemetry.record(
            TelemetryEventKind::Booted,
            TelemetryPayload::Boot(BootTelemetry {
                device_id: config.device_id,
                sequence_start,
                wake_seconds: wake_interval.seconds,
            }),
            0,
        );

        Ok(Self {
            oscillator,
            temperature,
            transport,
            store,
            wake,
            node: NodeState::new(config, sequence_start),
            scheduler: ReportScheduler::new(),
            telemetry,
            boot_report: BootReport {
                faults,
                sequence_start,
                wake_interval,
                wake_timer_error,
            },
            cycle: 0,
        })
    }

    /// Runs one wake cycle and records its telemetry.
    pub fn run_cycle(&mut self) -> CycleOutcome<T::Error, S::Error> {
        let outcome = self.scheduler.tick(
            &mut self.node,
            &mut self.oscillator,
            &mut self.temperature,
            &mut self.transport,
            &mut self.store,
        );
        self.finish_cycle(&outcome);
        outcome
    }

    /// Runs one wake cycle with an externally sampled raw count.
    pub fn run_cycle_with_sample(&mut self, raw_count: u32) -> CycleOutcome<T::Error, S::Error> {
        let outcome = self.scheduler.process_sample(
            &mut self.node,
            raw_count,
            &mut self.temperature,
            &mut self.transport,
            &mut self.store,
        );
        self.finish_cycle(&outcome);
        outcome
    }

    /// Suspends until the next wake signal.
    pub fn sleep(&mut self) -> WakeEvent {
        let event = self
            .wake
            .wait_for_wake(self.boot_report.wake_interval.as_duration());
        self.note_wake(event);
        event
    }

    /// Records a wake that happened outside [`WakeSource`], such as an
    /// awaited timer in an async runtime.
    pub fn note_wake(&mut self, event: WakeEvent) {
        let kind = match event {
            WakeEvent::Timer => TelemetryEventKind::WokeByTimer,
            WakeEvent::PinChange => TelemetryEventKind::WokeByPinChange,
        };
        self.telemetry
            .record(kind, TelemetryPayload::none(), self.cycle);
    }

    /// Cycles forever; only a hardware reset leaves this loop.
    pub fn run(mut self) -> ! {
        loop {
            let _ = self.run_cycle();
            self.sleep();
        }
    }

    /// Forgets the learned wet baseline.
    pub fn reset_baseline(&mut self) {
        self.node.calibration.reset_baseline();
        self.telemetry.record(
            TelemetryEventKind::BaselineReset,
            TelemetryPayload::none(),
            self.cycle,
        );
    }

    /// Captures the status shown by diagnostics.
    pub fn snapshot(&self) -> NodeStatusSnapshot {
        NodeStatusSnapshot::capture(&self.node, self.boot_report.wake_interval, self.cycle)
    }

    pub fn node(&self) -> &NodeState {
        &self.node
    }

    pub fn scheduler(&self) -> &ReportScheduler {
        &self.scheduler
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn boot_report(&self) -> &BootReport<T::Error> {
        &self.boot_report
    }

    /// Wake cycles completed since boot.
    pub fn cycles(&self) -> CycleIndex {
        self.cycle
    }

    pub fn wake_interval(&self) -> WakeInterval {
        self.boot_report.wake_interval
    }

    pub fn oscillator_mut(&mut self) -> &mut O {
        &mut self.oscillator
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn finish_cycle(&mut self, outcome: &CycleOutcome<T::Error, S::Error>) {
        let cycle = self.cycle;
        self.telemetry.record(
            TelemetryEventKind::SampleTaken,
            TelemetryPayload::Sample {
                raw_count: outcome.raw_count,
            },
            cycle,
        );

        if let Some(reading) = outcome.reading {
            self.telemetry.record(
                TelemetryEventKind::ReadingAveraged,
                TelemetryPayload::Reading(reading),
                cycle,
            );
        }

        for emission in [&outcome.sensor_report, &outcome.version_report]
            .into_iter()
            .flatten()
        {
            self.telemetry.record_report(
                emission.kind,
                emission.sequence,
                emission.delivered(),
                cycle,
            );
        }

        if let Some(persisted) = &outcome.persisted {
            let event = if persisted.error.is_none() {
                TelemetryEventKind::CounterPersisted
            } else {
                TelemetryEventKind::CounterPersistFailed
            };
            self.telemetry.record(
                event,
                TelemetryPayload::Counter {
                    value: persisted.value,
                },
                cycle,
            );
        }

        self.cycle = self.cycle.wrapping_add(1);
    }
}
