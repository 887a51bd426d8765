//! Sample averaging and self-calibrating baseline tracking.
//!
//! Raw oscillator counts fall as the soil gets wetter. The node averages a
//! configured number of counts per reading, remembers the lowest average
//! ever seen as its "wet" reference, and scales each reading between that
//! reference and the user's dry threshold.

pub mod normalize;

pub use normalize::{NORMALIZED_MAX, normalize};

/// Initial baseline, larger than any realistic averaged count.
pub const BASELINE_SENTINEL: u32 = 100_000;

/// Accumulates raw counts and yields their integer mean every `factor` samples.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Averager {
    factor: u16,
    accumulated_count: u32,
    samples_taken: u16,
}

impl Averager {
    /// Creates an averager. A factor of zero behaves as one.
    #[must_use]
    pub const fn new(factor: u16) -> Self {
        Self {
            factor: if factor == 0 { 1 } else { factor },
            accumulated_count: 0,
            samples_taken: 0,
        }
    }

    /// Effective samples per reading (never zero).
    #[must_use]
    pub const fn factor(&self) -> u16 {
        self.factor
    }

    /// Samples collected toward the next reading.
    #[must_use]
    pub const fn samples_taken(&self) -> u16 {
        self.samples_taken
    }

    /// Running sum of the collected samples.
    #[must_use]
    pub const fn accumulated_count(&self) -> u32 {
        self.accumulated_count
    }

    /// Adds one raw count, returning the mean once `factor` samples are in.
    pub fn add_sample(&mut self, raw: u32) -> Option<u32> {
        self.accumulated_count = self.accumulated_count.saturating_add(raw);
        self.samples_taken += 1;

        if self.samples_taken < self.factor {
            return None;
        }

        let mean = self.accumulated_count / u32::from(self.factor);
        self.accumulated_count = 0;
        self.samples_taken = 0;
        Some(mean)
    }
}

/// Tracks the lowest averaged count seen since boot (or the last reset).
///
/// A single anomalously low reading permanently lowers the scale; that is
/// accepted in exchange for needing no factory calibration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BaselineTracker {
    minimum: u32,
}

impl BaselineTracker {
    /// Creates a tracker seeded with [`BASELINE_SENTINEL`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            minimum: BASELINE_SENTINEL,
        }
    }

    /// Current baseline.
    #[must_use]
    pub const fn baseline(&self) -> u32 {
        self.minimum
    }

    /// Lowers the baseline to `mean` if it is smaller and returns the result.
    pub fn observe(&mut self, mean: u32) -> u32 {
        self.minimum = self.minimum.min(mean);
        self.minimum
    }

    /// Forgets the tracked minimum, e.g. at the start of a new season.
    pub fn reset(&mut self) {
        self.minimum = BASELINE_SENTINEL;
    }

    /// Returns `true` while no reading has been observed since boot or reset.
    #[must_use]
    pub const fn is_uncalibrated(&self) -> bool {
        self.minimum == BASELINE_SENTINEL
    }
}

impl Default for BaselineTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of folding one full averaging window into the calibration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AveragedReading {
    pub mean: u32,
    pub baseline: u32,
    pub normalized: u32,
}

impl AveragedReading {
    /// Normalized value narrowed for transport (always fits, max is 1000).
    #[must_use]
    pub fn normalized_u16(&self) -> u16 {
        u16::try_from(self.normalized).unwrap_or(u16::MAX)
    }
}

/// Calibration state owned by the node for its whole lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CalibrationState {
    averager: Averager,
    baseline: BaselineTracker,
    last_reading: Option<AveragedReading>,
}

impl CalibrationState {
    /// Creates calibration state for the given averaging factor.
    #[must_use]
    pub const fn new(averaging_factor: u16) -> Self {
        Self {
            averager: Averager::new(averaging_factor),
            baseline: BaselineTracker::new(),
            last_reading: None,
        }
    }

    /// Feeds a raw count; returns a reading once the averaging window closes.
    pub fn absorb(&mut self, raw: u32, threshold: u32) -> Option<AveragedReading> {
        let mean = self.averager.add_sample(raw)?;
        let baseline = self.baseline.observe(mean);
        let reading = AveragedReading {
            mean,
            baseline,
            normalized: normalize(mean, threshold, baseline),
        };
        self.last_reading = Some(reading);
        Some(reading)
    }

    /// Restores the baseline sentinel. Pending samples are kept.
    pub fn reset_baseline(&mut self) {
        self.baseline.reset();
    }

    #[must_use]
    pub const fn averager(&self) -> &Averager {
        &self.averager
    }

    #[must_use]
    pub const fn baseline(&self) -> &BaselineTracker {
        &self.baseline
    }

    /// Most recent completed reading, if any.
    #[must_use]
    pub const fn last_reading(&self) -> Option<AveragedReading> {
        self.last_reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averager_emits_every_factor_samples() {
        let mut averager = Averager::new(3);
        assert_eq!(averager.add_sample(10), None);
        assert_eq!(averager.add_sample(20), None);
        assert_eq!(averager.add_sample(31), Some(20));
        assert_eq!(averager.samples_taken(), 0);
        assert_eq!(averager.accumulated_count(), 0);

        assert_eq!(averager.add_sample(5), None);
        assert_eq!(averager.samples_taken(), 1);
    }

    #[test]
    fn zero_factor_behaves_as_one() {
        let mut averager = Averager::new(0);
        assert_eq!(averager.factor(), 1);
        assert_eq!(averager.add_sample(42), Some(42));
        assert_eq!(averager.add_sample(7), Some(7));
    }

    #[test]
    fn accumulation_saturates() {
        let mut averager = Averager::new(2);
        averager.add_sample(u32::MAX);
        assert_eq!(averager.add_sample(u32::MAX), Some(u32::MAX / 2));
    }

    #[test]
    fn baseline_never_increases() {
        let mut tracker = BaselineTracker::new();
        let means = [40_000, 38_000, 45_000, 30_000, 99_999, 30_001, 29_000];
        let mut previous = tracker.baseline();
        for mean in means {
            let current = tracker.observe(mean);
            assert!(current <= previous);
            previous = current;
        }
        assert_eq!(tracker.baseline(), 29_000);
    }

    #[test]
    fn baseline_reset_restores_sentinel() {
        let mut tracker = BaselineTracker::new();
        assert!(tracker.is_uncalibrated());
        tracker.observe(12_345);
        assert!(!tracker.is_uncalibrated());
        tracker.reset();
        assert_eq!(tracker.baseline(), BASELINE_SENTINEL);
    }

    #[test]
    fn calibration_end_to_end_example() {
        let mut state = CalibrationState::new(1);

        let first = state.absorb(30_000, 35_000).expect("factor 1 yields a reading");
        assert_eq!(first.baseline, 30_000);
        assert_eq!(first.normalized, 1_000);

        let second = state.absorb(32_000, 35_000).expect("factor 1 yields a reading");
        assert_eq!(second.baseline, 30_000);
        assert_eq!(second.normalized, 600);
        assert_eq!(state.last_reading(), Some(second));
    }

    #[test]
    fn baseline_tracks_means_not_raw_samples() {
        let mut state = CalibrationState::new(2);
        assert_eq!(state.absorb(10_000, 35_000), None);
        assert!(state.baseline().is_uncalibrated());

        let reading = state.absorb(50_000, 35_000).expect("window closes");
        assert_eq!(reading.mean, 30_000);
        assert_eq!(state.baseline().baseline(), 30_000);
    }
}
