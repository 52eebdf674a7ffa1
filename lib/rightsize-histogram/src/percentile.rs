//! Percentile estimation.

use serde::{Deserialize, Serialize};

use crate::Histogram;

/// Value reported for any percentile of an empty histogram.
pub const EMPTY_PERCENTILE: f64 = 0.0;

/// Answers percentile queries against a histogram.
///
/// Percentiles resolve to the *upper* bound of the bucket they fall into. For capacity sizing this errs on the side of
/// over-provisioning: the true value is never above the reported one, as long as it fell within the layout.
#[derive(Clone, Copy, Debug)]
pub struct PercentileEstimator<'a> {
    histogram: &'a Histogram,
}

impl<'a> PercentileEstimator<'a> {
    /// Creates an estimator for the given histogram.
    pub fn new(histogram: &'a Histogram) -> Self {
        Self { histogram }
    }

    /// Buckets holding at least `epsilon` weight, in ascending index order.
    fn significant_buckets(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        let epsilon = self.histogram.options().epsilon();
        self.histogram.buckets().filter(move |(_, weight)| *weight >= epsilon)
    }

    fn total_weight(&self) -> Option<f64> {
        let total_weight = self.histogram.total_weight();
        if self.histogram.is_empty() || !(total_weight > 0.0) {
            None
        } else {
            Some(total_weight)
        }
    }

    /// Returns the value at the given percentile, where `p` is in `[0, 1]`.
    ///
    /// Buckets are walked in ascending order, and the first bucket at which the cumulative weight reaches
    /// `p * total_weight` determines the answer. Buckets lighter than `epsilon` count as empty and never determine the
    /// answer. `p` is clamped to `[0, 1]`, with NaN treated as zero.
    ///
    /// If the histogram is empty, [`EMPTY_PERCENTILE`] is returned.
    pub fn percentile(&self, p: f64) -> f64 {
        let Some(total_weight) = self.total_weight() else {
            return EMPTY_PERCENTILE;
        };

        let threshold = clamp_percentile(p) * total_weight;
        let options = self.histogram.options();

        let mut cumulative = 0.0;
        let mut last_index = None;
        for (index, weight) in self.significant_buckets() {
            cumulative += weight;
            last_index = Some(index);
            if cumulative >= threshold {
                return options.bucket_upper_bound(index);
            }
        }

        // Reached when rounding or skipped sub-epsilon buckets leave the sum short of the threshold.
        last_index.map_or(EMPTY_PERCENTILE, |index| options.bucket_upper_bound(index))
    }

    /// Computes the value of every integer percentile from 1 to 100 in a single pass over the buckets.
    ///
    /// Each entry is identical to what [`percentile`][Self::percentile] returns for `k / 100`.
    pub fn curve(&self) -> PercentileCurve {
        let mut values = vec![EMPTY_PERCENTILE; PercentileCurve::LEN];
        let Some(total_weight) = self.total_weight() else {
            return PercentileCurve { values };
        };

        let options = self.histogram.options();
        let mut buckets = self.significant_buckets();
        let mut cumulative = 0.0;
        let mut current = None;

        for (k, value) in values.iter_mut().enumerate().skip(1) {
            let threshold = clamp_percentile(k as f64 / 100.0) * total_weight;
            while current.is_none() || cumulative < threshold {
                match buckets.next() {
                    Some((index, weight)) => {
                        cumulative += weight;
                        current = Some(index);
                    }
                    None => break,
                }
            }

            *value = current.map_or(EMPTY_PERCENTILE, |index| options.bucket_upper_bound(index));
        }

        PercentileCurve { values }
    }
}

fn clamp_percentile(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// Precomputed values for integer percentiles 1 through 100.
///
/// Serialized as a sequence of 101 numbers. Index `0` is reserved and always holds [`EMPTY_PERCENTILE`], so that index
/// `k` holds the k-th percentile.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PercentileCurve {
    values: Vec<f64>,
}

impl PercentileCurve {
    const LEN: usize = 101;

    /// Returns the value of the given integer percentile, or `None` if it's not within `1..=100`.
    pub fn get(&self, percentile: usize) -> Option<f64> {
        if (1..Self::LEN).contains(&percentile) {
            self.values.get(percentile).copied()
        } else {
            None
        }
    }

    /// Returns all values, including the reserved slot at index `0`.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}
