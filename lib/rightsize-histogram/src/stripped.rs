use serde::{Deserialize, Serialize};

use crate::{Histogram, HistogramCheckpoint, HistogramError};

/// A dense run of bucket weights with leading and trailing empty buckets removed.
///
/// `bucket_weights[0]` holds the weight of bucket `min_bucket`, and the run ends at `max_bucket` (inclusive). An empty
/// histogram strips down to `num_buckets == 0` with no weights, and both bounds set to zero.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrippedHistogram {
    /// Index of the first bucket holding weight.
    pub min_bucket: usize,

    /// Index of the last bucket holding weight.
    pub max_bucket: usize,

    /// Number of buckets between `min_bucket` and `max_bucket`, inclusive.
    pub num_buckets: usize,

    /// Weights of buckets `min_bucket..=max_bucket`.
    pub bucket_weights: Vec<f64>,
}

impl StrippedHistogram {
    /// Strips a dense array of bucket weights.
    pub fn from_dense(dense: &[f64]) -> Self {
        let Some(min_bucket) = dense.iter().position(|weight| *weight > 0.0) else {
            return Self::default();
        };
        let max_bucket = dense.iter().rposition(|weight| *weight > 0.0).unwrap_or(min_bucket);

        Self {
            min_bucket,
            max_bucket,
            num_buckets: max_bucket - min_bucket + 1,
            bucket_weights: dense[min_bucket..=max_bucket].to_vec(),
        }
    }

    /// Reconciles a checkpoint into a dense array and strips it.
    ///
    /// # Errors
    ///
    /// If the checkpoint is invalid, an error is returned.
    pub fn from_checkpoint(checkpoint: &HistogramCheckpoint, num_buckets: usize) -> Result<Self, HistogramError> {
        checkpoint.to_dense(num_buckets).map(|dense| Self::from_dense(&dense))
    }

    /// Returns `true` if there are no buckets.
    pub fn is_empty(&self) -> bool {
        self.num_buckets == 0
    }

    /// Returns the weight of the bucket at the absolute `index`.
    pub fn bucket_weight(&self, index: usize) -> f64 {
        index
            .checked_sub(self.min_bucket)
            .and_then(|offset| self.bucket_weights.get(offset))
            .copied()
            .unwrap_or(0.0)
    }
}

impl From<&Histogram> for StrippedHistogram {
    fn from(histogram: &Histogram) -> Self {
        Self::from_dense(&histogram.to_dense())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_and_trailing_zeroes() {
        let dense = [0.0, 0.0, 0.0, 1.0, 0.0, 2.5, 0.0, 4.0, 0.0, 0.0];
        let stripped = StrippedHistogram::from_dense(&dense);

        assert_eq!(stripped.min_bucket, 3);
        assert_eq!(stripped.max_bucket, 7);
        assert_eq!(stripped.num_buckets, 5);
        assert_eq!(stripped.bucket_weights, dense[3..=7].to_vec());
        assert_eq!(stripped.bucket_weight(5), 2.5);
        assert_eq!(stripped.bucket_weight(1), 0.0);
        assert_eq!(stripped.bucket_weight(9), 0.0);
    }

    #[test]
    fn single_bucket() {
        let stripped = StrippedHistogram::from_dense(&[0.0, 3.0]);

        assert_eq!(stripped.min_bucket, 1);
        assert_eq!(stripped.max_bucket, 1);
        assert_eq!(stripped.num_buckets, 1);
        assert_eq!(stripped.bucket_weights, vec![3.0]);
    }

    #[test]
    fn empty() {
        let stripped = StrippedHistogram::from_dense(&[0.0; 16]);
        assert!(stripped.is_empty());
        assert_eq!(stripped.num_buckets, 0);
        assert!(stripped.bucket_weights.is_empty());

        assert!(StrippedHistogram::from_dense(&[]).is_empty());
    }

    #[test]
    fn from_checkpoint_reconciles_before_stripping() {
        let checkpoint = HistogramCheckpoint {
            reference_timestamp: None,
            bucket_weights: [(3, 5_000), (7, 10_000)].into_iter().collect(),
            total_weight: 3.0,
        };
        let stripped = StrippedHistogram::from_checkpoint(&checkpoint, 10).unwrap();

        assert_eq!(stripped.min_bucket, 3);
        assert_eq!(stripped.max_bucket, 7);
        assert_eq!(stripped.num_buckets, 5);
        assert!(crate::float_eq(stripped.bucket_weights.iter().sum::<f64>(), 3.0));
        assert!(crate::float_eq(stripped.bucket_weight(3), 1.0));
        assert!(crate::float_eq(stripped.bucket_weight(7), 2.0));
    }

    #[test]
    fn json_shape() {
        let stripped = StrippedHistogram::from_dense(&[0.0, 1.0, 2.0]);
        assert_eq!(
            serde_json::to_value(&stripped).unwrap(),
            serde_json::json!({ "minBucket": 1, "maxBucket": 2, "numBuckets": 2, "bucketWeights": [1.0, 2.0] })
        );
    }
}
