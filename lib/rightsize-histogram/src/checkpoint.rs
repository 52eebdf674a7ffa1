//! Persisted histogram snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{HistogramError, InvalidCheckpoint};

/// Weight assigned to the heaviest bucket when a histogram is saved.
///
/// Every other bucket is scaled by the same factor and rounded to the nearest integer, which keeps checkpoints small
/// at the cost of precision for buckets holding less than 1/20000th of the heaviest bucket's weight.
pub const MAX_CHECKPOINT_WEIGHT: u32 = 10_000;

/// A serializable snapshot of a histogram.
///
/// Bucket weights are stored quantized (see [`MAX_CHECKPOINT_WEIGHT`]), while the total weight is stored exactly. The
/// quantized weights therefore only describe the *shape* of the distribution: their sum is generally not equal to
/// `total_weight`, and consumers must rescale them (see [`to_dense`][Self::to_dense]) rather than use them directly.
///
/// Because of the quantization, saving a histogram and loading it back yields a histogram that is approximately, but
/// not bit-for-bit, equal to the original.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramCheckpoint {
    /// Reference timestamp of a decaying histogram, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_timestamp: Option<DateTime<Utc>>,

    /// Quantized bucket weights, keyed by bucket index. Buckets that rounded to zero are omitted.
    #[serde(default)]
    pub bucket_weights: BTreeMap<usize, u32>,

    /// Total weight of the histogram at the time it was saved.
    pub total_weight: f64,
}

impl HistogramCheckpoint {
    /// Quantizes the given bucket weights into a checkpoint.
    pub(crate) fn quantize<I>(buckets: I, total_weight: f64) -> Self
    where
        I: Iterator<Item = (usize, f64)> + Clone,
    {
        let max_weight = buckets.clone().map(|(_, weight)| weight).fold(0.0, f64::max);

        let mut bucket_weights = BTreeMap::new();
        if max_weight > 0.0 {
            let ratio = f64::from(MAX_CHECKPOINT_WEIGHT) / max_weight;
            for (index, weight) in buckets {
                // SAFETY: `weight <= max_weight`, so the scaled value is within `[0, MAX_CHECKPOINT_WEIGHT]` unless the
                // ratio overflowed for a subnormal maximum, which the clamp takes care of.
                let quantized = (weight * ratio).round().min(f64::from(MAX_CHECKPOINT_WEIGHT)) as u32;
                if quantized > 0 {
                    bucket_weights.insert(index, quantized);
                }
            }
        }

        Self {
            reference_timestamp: None,
            bucket_weights,
            total_weight,
        }
    }

    /// Returns `true` if the checkpoint holds no weight.
    pub fn is_empty(&self) -> bool {
        self.bucket_weights.is_empty()
    }

    /// Checks that the checkpoint can be restored.
    ///
    /// # Errors
    ///
    /// If the total weight is negative or not finite, an error is returned.
    pub fn validate(&self) -> Result<(), HistogramError> {
        ensure!(
            self.total_weight.is_finite() && self.total_weight >= 0.0,
            InvalidCheckpoint {
                reason: format!("total weight must be a non-negative number, got {}", self.total_weight),
            }
        );
        Ok(())
    }

    /// Converts the checkpoint into a dense array of `num_buckets` weights.
    ///
    /// The quantized weights are rescaled by `total_weight / sum(bucket_weights)` so that the array sums to
    /// `total_weight`. When the checkpoint holds no bucket weight at all, the array is all zeroes. Buckets beyond the end
    /// of the array are folded into the last slot, which happens when a checkpoint saved under a larger layout is loaded
    /// into a smaller one.
    ///
    /// # Errors
    ///
    /// If the checkpoint is invalid (see [`validate`][Self::validate]), an error is returned.
    pub fn to_dense(&self, num_buckets: usize) -> Result<Vec<f64>, HistogramError> {
        self.validate()?;

        let mut dense = vec![0.0; num_buckets];
        if num_buckets == 0 {
            return Ok(dense);
        }

        let raw_sum = self.bucket_weights.values().map(|&weight| f64::from(weight)).sum::<f64>();
        if raw_sum == 0.0 {
            return Ok(dense);
        }

        let ratio = self.total_weight / raw_sum;
        for (&index, &weight) in &self.bucket_weights {
            dense[index.min(num_buckets - 1)] += f64::from(weight) * ratio;
        }

        Ok(dense)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::float_eq;

    fn checkpoint(weights: &[(usize, u32)], total_weight: f64) -> HistogramCheckpoint {
        HistogramCheckpoint {
            reference_timestamp: None,
            bucket_weights: weights.iter().copied().collect(),
            total_weight,
        }
    }

    fn assert_dense_eq(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!(float_eq(*a, *e), "bucket {}: expected {}, got {}", index, e, a);
        }
    }

    #[test]
    fn quantize_scales_to_max_weight() {
        let cp = HistogramCheckpoint::quantize([(1, 0.5), (4, 2.0), (6, 0.00001)].into_iter(), 2.50001);

        assert_eq!(cp.bucket_weights.get(&4), Some(&MAX_CHECKPOINT_WEIGHT));
        assert_eq!(cp.bucket_weights.get(&1), Some(&2_500));
        // Rounds to zero, so it's dropped.
        assert_eq!(cp.bucket_weights.get(&6), None);
        assert_eq!(cp.total_weight, 2.50001);
    }

    #[test]
    fn quantize_empty() {
        let cp = HistogramCheckpoint::quantize(std::iter::empty(), 0.0);
        assert!(cp.is_empty());
        assert_eq!(cp.total_weight, 0.0);
    }

    #[test]
    fn dense_reconciles_rounding_drift() {
        // Stored weights sum to 10_000, but the authoritative total is 4.
        let cp = checkpoint(&[(2, 2_500), (3, 7_500)], 4.0);
        let dense = cp.to_dense(6).unwrap();

        assert_dense_eq(&dense, &[0.0, 0.0, 1.0, 3.0, 0.0, 0.0]);
        assert!(float_eq(dense.iter().sum::<f64>(), 4.0));
    }

    #[test]
    fn dense_conserves_total_weight() {
        let cp = checkpoint(&[(0, 3_333), (1, 10_000), (5, 17), (7, 1)], 13.37);
        let dense = cp.to_dense(8).unwrap();

        assert!(float_eq(dense.iter().sum::<f64>(), 13.37));
    }

    #[test]
    fn dense_zero_sum() {
        let cp = checkpoint(&[], 12.0);
        assert_eq!(cp.to_dense(4).unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn dense_folds_overflowing_buckets() {
        let cp = checkpoint(&[(1, 5_000), (9, 5_000), (12, 10_000)], 8.0);
        let dense = cp.to_dense(4).unwrap();

        assert_dense_eq(&dense, &[0.0, 2.0, 0.0, 6.0]);
    }

    #[test]
    fn invalid_total_weight() {
        assert!(checkpoint(&[(1, 10)], -1.0).to_dense(4).is_err());
        assert!(checkpoint(&[(1, 10)], f64::NAN).to_dense(4).is_err());
        assert!(matches!(
            checkpoint(&[(1, 10)], f64::INFINITY).validate(),
            Err(HistogramError::InvalidCheckpoint { .. })
        ));
    }

    #[test]
    fn json_shape() {
        let cp = checkpoint(&[(3, 10_000), (7, 42)], 5.5);
        let json = serde_json::to_value(&cp).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "bucketWeights": { "3": 10000, "7": 42 },
                "totalWeight": 5.5,
            })
        );

        let decoded: HistogramCheckpoint = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, cp);
    }
}
