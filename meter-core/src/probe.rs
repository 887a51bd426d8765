//! Sensing hardware the measurement cycle samples from.

use core::time::Duration;

/// Window during which oscillator pulses are counted each wake cycle.
pub const SAMPLE_WINDOW: Duration = Duration::from_millis(100);

/// Frequency-generating moisture probe behind a gated pulse counter.
pub trait OscillatorCounter {
    /// Powers the probe, counts pulses for `window`, powers it down again,
    /// and returns the count. Called exactly once per wake cycle.
    fn measure_window(&mut self, window: Duration) -> u32;
}

/// Optional board temperature sensor.
pub trait TemperatureSensor {
    /// Returns the temperature in hundredths of a degree Celsius.
    fn read_centi_celsius(&mut self) -> Option<i16>;
}

/// Placeholder for boards without a temperature sensor.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoTemperatureSensor;

impl TemperatureSensor for NoTemperatureSensor {
    fn read_centi_celsius(&mut self) -> Option<i16> {
        None
    }
}

/// Counter replaying a fixed cycle of counts.
#[derive(Clone, Debug)]
pub struct FixedCounter<const N: usize> {
    counts: [u32; N],
    next: usize,
}

impl<const N: usize> FixedCounter<N> {
    #[must_use]
    pub const fn new(counts: [u32; N]) -> Self {
        Self { counts, next: 0 }
    }
}

impl<const N: usize> OscillatorCounter for FixedCounter<N> {
    fn measure_window(&mut self, _window: Duration) -> u32 {
        if N == 0 {
            return 0;
        }
        let count = self.counts[self.next % N];
        self.next = (self.next + 1) % N;
        count
    }
}
