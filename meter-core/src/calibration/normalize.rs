//! Conversion from an averaged count into a bounded permille reading.

/// Upper bound of a normalized reading (permille, wettest).
pub const NORMALIZED_MAX: u32 = 1_000;

/// Scales `mean` into `0..=NORMALIZED_MAX` relative to the dry `threshold` and
/// the wettest `baseline` seen so far.
///
/// * `mean >= threshold` reads as 0 (at or beyond the dry cutoff).
/// * `baseline >= threshold` leaves no span to scale against; the reading is
///   reported as [`NORMALIZED_MAX`] until calibration widens the range.
/// * Otherwise `(threshold - mean) * 1000 / (threshold - baseline)`, clamped.
#[must_use]
pub fn normalize(mean: u32, threshold: u32, baseline: u32) -> u32 {
    if mean >= threshold {
        return 0;
    }

    if baseline >= threshold {
        return NORMALIZED_MAX;
    }

    let below = u64::from(threshold - mean);
    let span = u64::from(threshold - baseline);
    let scaled = below * u64::from(NORMALIZED_MAX) / span;

    match u32::try_from(scaled) {
        Ok(value) => value.min(NORMALIZED_MAX),
        Err(_) => NORMALIZED_MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_readings_are_zero() {
        assert_eq!(normalize(35_000, 35_000, 30_000), 0);
        assert_eq!(normalize(80_000, 35_000, 30_000), 0);
    }

    #[test]
    fn degenerate_span_reads_fully_wet() {
        assert_eq!(normalize(20_000, 35_000, 35_000), NORMALIZED_MAX);
        assert_eq!(normalize(20_000, 35_000, 100_000), NORMALIZED_MAX);
    }

    #[test]
    fn scales_within_span() {
        assert_eq!(normalize(32_000, 35_000, 30_000), 600);
        assert_eq!(normalize(30_000, 35_000, 30_000), 1_000);
        assert_eq!(normalize(34_999, 35_000, 30_000), 0);
    }

    #[test]
    fn mean_below_baseline_is_clamped() {
        // Transient: the tracker has not yet absorbed this mean.
        assert_eq!(normalize(10_000, 35_000, 30_000), NORMALIZED_MAX);
    }

    #[test]
    fn large_counts_do_not_overflow() {
        assert_eq!(normalize(1, u32::MAX, 0), 999);
    }

    #[test]
    fn decreases_as_mean_rises() {
        let threshold = 35_000;
        let baseline = 34_000;
        let mut previous = normalize(baseline, threshold, baseline);
        for mean in (baseline + 1)..threshold {
            let value = normalize(mean, threshold, baseline);
            assert!(value < previous, "mean {mean} produced {value} >= {previous}");
            previous = value;
        }
    }

    #[test]
    fn never_increases_across_full_span() {
        let (threshold, baseline) = (35_000, 30_000);
        let mut previous = NORMALIZED_MAX;
        for mean in 0..=40_000 {
            let value = normalize(mean, threshold, baseline);
            assert!(value <= previous, "mean {mean} produced {value} > {previous}");
            previous = value;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn never_increases_across_wide_register_span() {
        let (threshold, baseline) = (u32::MAX - 1, 1);
        let mut previous = NORMALIZED_MAX;
        for mean in (0..=u32::MAX).step_by(1 << 20) {
            let value = normalize(mean, threshold, baseline);
            assert!(value <= previous, "mean {mean} produced {value} > {previous}");
            previous = value;
        }
    }
}
