//! Exponentially-decaying histogram.

use std::time::Duration;

use chrono::{DateTime, Utc};
use snafu::ensure;

use crate::error::{HistogramError, IncompatibleHalfLife, IncompatibleHistogramOptions, InvalidOptions, NegativeWeight};
use crate::{Histogram, HistogramCheckpoint, HistogramOptions};

/// Largest decay exponent applied to a sample before the reference timestamp is moved forward.
///
/// `2^100` is far from overflowing an `f64`, while still letting a histogram absorb a hundred half-lives of samples
/// before its weights need rescaling.
pub const MAX_DECAY_EXPONENT: f64 = 100.0;

/// A histogram in which the weight of a sample halves every `half_life`.
///
/// Rather than periodically shrinking every bucket, the weight of each *new* sample is multiplied by `2^((t - r) /
/// half_life)`, where `r` is the reference timestamp. Relative weights, and therefore percentiles, are the same as if
/// older samples had been decayed. When the multiplier grows too large, the reference timestamp is moved forward and the
/// existing weights are scaled down once to match.
#[derive(Clone, Debug, PartialEq)]
pub struct DecayingHistogram {
    histogram: Histogram,
    half_life: Duration,
    half_life_millis: i64,
    reference_timestamp: Option<DateTime<Utc>>,
}

impl DecayingHistogram {
    /// Creates an empty decaying histogram.
    ///
    /// # Errors
    ///
    /// If the half-life is shorter than a millisecond, an error is returned.
    pub fn new(options: HistogramOptions, half_life: Duration) -> Result<Self, HistogramError> {
        let half_life_millis = i64::try_from(half_life.as_millis()).unwrap_or(i64::MAX);
        ensure!(
            half_life_millis > 0,
            InvalidOptions {
                reason: "half-life must be at least one millisecond"
            }
        );

        Ok(Self {
            histogram: Histogram::new(options),
            half_life,
            half_life_millis,
            reference_timestamp: None,
        })
    }

    /// Creates a decaying histogram from a checkpoint, including its reference timestamp.
    ///
    /// # Errors
    ///
    /// If the half-life is shorter than a millisecond, or the checkpoint is invalid, an error is returned.
    pub fn from_checkpoint(
        options: HistogramOptions, half_life: Duration, checkpoint: &HistogramCheckpoint,
    ) -> Result<Self, HistogramError> {
        let mut histogram = Self::new(options, half_life)?;
        histogram.load_from_checkpoint(checkpoint)?;
        Ok(histogram)
    }

    /// Returns the underlying histogram, whose weights are expressed relative to the reference timestamp.
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Consumes the decaying histogram, returning the underlying histogram.
    pub fn into_histogram(self) -> Histogram {
        self.histogram
    }

    /// Returns the half-life.
    pub fn half_life(&self) -> Duration {
        self.half_life
    }

    /// Returns the reference timestamp, if any sample has been recorded yet.
    pub fn reference_timestamp(&self) -> Option<DateTime<Utc>> {
        self.reference_timestamp
    }

    /// Returns `true` if the histogram holds no meaningful weight.
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Returns the value at the given percentile, where `p` is in `[0, 1]`.
    pub fn percentile(&self, p: f64) -> f64 {
        self.histogram.percentile(p)
    }

    /// Adds a sample observed at `time`.
    ///
    /// # Errors
    ///
    /// If the weight is negative or NaN, an error is returned.
    pub fn add_sample(&mut self, value: f64, weight: f64, time: DateTime<Utc>) -> Result<(), HistogramError> {
        ensure!(weight >= 0.0, NegativeWeight { weight });
        let factor = self.decay_factor(time);
        self.histogram.add_sample(value, weight * factor)
    }

    /// Removes a sample previously added at `time`.
    ///
    /// # Errors
    ///
    /// If the weight is negative or NaN, an error is returned.
    pub fn subtract_sample(&mut self, value: f64, weight: f64, time: DateTime<Utc>) -> Result<(), HistogramError> {
        ensure!(weight >= 0.0, NegativeWeight { weight });
        let factor = self.decay_factor(time);
        self.histogram.subtract_sample(value, weight * factor)
    }

    /// Merges another decaying histogram into this one.
    ///
    /// Both histograms are brought to the later of the two reference timestamps before their weights are summed.
    ///
    /// # Errors
    ///
    /// If the histograms have different options or half-lives, an error is returned and this histogram is left
    /// untouched.
    pub fn merge(&mut self, other: &DecayingHistogram) -> Result<(), HistogramError> {
        ensure!(
            self.half_life == other.half_life,
            IncompatibleHalfLife {
                left: self.half_life,
                right: other.half_life,
            }
        );
        ensure!(
            self.histogram.options() == other.histogram.options(),
            IncompatibleHistogramOptions {
                left: *self.histogram.options(),
                right: *other.histogram.options(),
            }
        );

        match (self.reference_timestamp, other.reference_timestamp) {
            (Some(ours), Some(theirs)) if ours >= theirs => {
                let mut aligned = other.histogram.clone();
                aligned.scale(self.decay_between(ours, theirs));
                self.histogram.merge(&aligned)
            }
            (_, Some(theirs)) => {
                self.shift_reference(theirs);
                self.histogram.merge(&other.histogram)
            }
            (_, None) => self.histogram.merge(&other.histogram),
        }
    }

    /// Saves the histogram, along with its reference timestamp, as a checkpoint.
    pub fn save_to_checkpoint(&self) -> HistogramCheckpoint {
        let mut checkpoint = self.histogram.save_to_checkpoint();
        checkpoint.reference_timestamp = self.reference_timestamp;
        checkpoint
    }

    /// Replaces the contents of this histogram with those of a checkpoint.
    ///
    /// # Errors
    ///
    /// If the checkpoint is invalid, an error is returned and the histogram is left untouched.
    pub fn load_from_checkpoint(&mut self, checkpoint: &HistogramCheckpoint) -> Result<(), HistogramError> {
        self.histogram.load_from_checkpoint(checkpoint)?;
        self.reference_timestamp = checkpoint.reference_timestamp;
        Ok(())
    }

    /// Number of half-lives elapsed from `from` to `to`.
    fn exponent(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        (to - from).num_milliseconds() as f64 / self.half_life_millis as f64
    }

    /// Factor that expresses weights relative to `from` in terms of the later reference `to`.
    fn decay_between(&self, to: DateTime<Utc>, from: DateTime<Utc>) -> f64 {
        2f64.powf(-self.exponent(from, to))
    }

    fn floor_to_half_life(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let millis = time.timestamp_millis();
        let floored = millis - millis.rem_euclid(self.half_life_millis);
        DateTime::from_timestamp_millis(floored).unwrap_or(time)
    }

    fn shift_reference(&mut self, reference: DateTime<Utc>) {
        if let Some(current) = self.reference_timestamp {
            self.histogram.scale(self.decay_between(reference, current));
        }
        self.reference_timestamp = Some(reference);
    }

    fn decay_factor(&mut self, time: DateTime<Utc>) -> f64 {
        let reference = match self.reference_timestamp {
            Some(reference) => reference,
            None => {
                let reference = self.floor_to_half_life(time);
                self.reference_timestamp = Some(reference);
                reference
            }
        };

        let mut exponent = self.exponent(reference, time);
        if exponent > MAX_DECAY_EXPONENT {
            let reference = self.floor_to_half_life(time);
            self.shift_reference(reference);
            exponent = self.exponent(reference, time);
        }

        2f64.powf(exponent)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::float_eq;

    const HOUR: Duration = Duration::from_secs(3600);

    fn options() -> HistogramOptions {
        HistogramOptions::linear(100.0, 1.0, 1e-60).unwrap()
    }

    fn at(hours: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 / 3600 * 3600, 0).unwrap() + TimeDelta::hours(hours)
    }

    #[test]
    fn rejects_zero_half_life() {
        assert!(matches!(
            DecayingHistogram::new(options(), Duration::ZERO),
            Err(HistogramError::InvalidOptions { .. })
        ));
    }

    #[test]
    fn recent_samples_weigh_more() {
        let mut histogram = DecayingHistogram::new(options(), HOUR).unwrap();
        histogram.add_sample(10.0, 1.0, at(0)).unwrap();
        histogram.add_sample(20.0, 1.0, at(1)).unwrap();
        histogram.add_sample(30.0, 1.0, at(2)).unwrap();

        assert_eq!(histogram.reference_timestamp(), Some(at(0)));
        assert_eq!(histogram.histogram().bucket_weight(10), 1.0);
        assert_eq!(histogram.histogram().bucket_weight(20), 2.0);
        assert_eq!(histogram.histogram().bucket_weight(30), 4.0);

        // 4 out of 7 units of weight sit in the most recent bucket.
        assert_eq!(histogram.percentile(0.5), 31.0);
    }

    #[test]
    fn reference_is_aligned_to_half_life() {
        let mut histogram = DecayingHistogram::new(options(), HOUR).unwrap();
        histogram
            .add_sample(10.0, 1.0, at(3) + TimeDelta::minutes(30))
            .unwrap();

        assert_eq!(histogram.reference_timestamp(), Some(at(3)));
        assert!(float_eq(histogram.histogram().bucket_weight(10), 2f64.sqrt()));
    }

    #[test]
    fn reference_shifts_when_exponent_grows_too_large() {
        let mut histogram = DecayingHistogram::new(options(), HOUR).unwrap();
        histogram.add_sample(10.0, 1.0, at(0)).unwrap();
        histogram.add_sample(20.0, 1.0, at(150)).unwrap();

        assert_eq!(histogram.reference_timestamp(), Some(at(150)));
        assert_eq!(histogram.histogram().bucket_weight(20), 1.0);
        assert!(float_eq(histogram.histogram().bucket_weight(10), 2f64.powi(-150)));
        assert!(histogram.histogram().total_weight().is_finite());
    }

    #[test]
    fn merge_aligns_reference_timestamps() {
        let mut older = DecayingHistogram::new(options(), HOUR).unwrap();
        older.add_sample(10.0, 1.0, at(0)).unwrap();

        let mut newer = DecayingHistogram::new(options(), HOUR).unwrap();
        newer.add_sample(20.0, 1.0, at(1)).unwrap();

        let mut merged_into_older = older.clone();
        merged_into_older.merge(&newer).unwrap();

        let mut merged_into_newer = newer.clone();
        merged_into_newer.merge(&older).unwrap();

        for merged in [&merged_into_older, &merged_into_newer] {
            assert_eq!(merged.reference_timestamp(), Some(at(1)));
            assert!(float_eq(merged.histogram().bucket_weight(10), 0.5));
            assert!(float_eq(merged.histogram().bucket_weight(20), 1.0));
            assert!(float_eq(merged.histogram().total_weight(), 1.5));
        }
    }

    #[test]
    fn merge_with_empty() {
        let mut histogram = DecayingHistogram::new(options(), HOUR).unwrap();
        histogram.add_sample(10.0, 1.0, at(4)).unwrap();

        let mut empty = DecayingHistogram::new(options(), HOUR).unwrap();
        empty.merge(&histogram).unwrap();
        assert_eq!(empty, histogram);

        let before = histogram.clone();
        histogram
            .merge(&DecayingHistogram::new(options(), HOUR).unwrap())
            .unwrap();
        assert_eq!(histogram, before);
    }

    #[test]
    fn merge_rejects_different_half_life() {
        let mut left = DecayingHistogram::new(options(), HOUR).unwrap();
        let right = DecayingHistogram::new(options(), HOUR * 24).unwrap();

        assert!(matches!(
            left.merge(&right),
            Err(HistogramError::IncompatibleHalfLife { .. })
        ));
    }

    #[test]
    fn checkpoint_keeps_reference_timestamp() {
        let mut histogram = DecayingHistogram::new(options(), HOUR).unwrap();
        histogram.add_sample(10.0, 1.0, at(0)).unwrap();
        histogram.add_sample(40.0, 3.0, at(2)).unwrap();

        let checkpoint = histogram.save_to_checkpoint();
        assert_eq!(checkpoint.reference_timestamp, Some(at(0)));

        let restored = DecayingHistogram::from_checkpoint(options(), HOUR, &checkpoint).unwrap();
        assert_eq!(restored.reference_timestamp(), Some(at(0)));
        assert_eq!(restored.histogram().total_weight(), 13.0);
        assert_eq!(restored.percentile(0.5), histogram.percentile(0.5));
    }

    #[test]
    fn subtract_uses_same_decay() {
        let mut histogram = DecayingHistogram::new(options(), HOUR).unwrap();
        histogram.add_sample(10.0, 1.0, at(0)).unwrap();
        histogram.add_sample(20.0, 1.0, at(2)).unwrap();
        histogram.subtract_sample(20.0, 1.0, at(2)).unwrap();

        assert_eq!(histogram.histogram().bucket_weight(20), 0.0);
        assert_eq!(histogram.histogram().total_weight(), 1.0);
    }
}
