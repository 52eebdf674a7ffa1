//! Weighted histogram.

use std::collections::BTreeMap;

use snafu::ensure;

use crate::error::{HistogramError, IncompatibleHistogramOptions, NegativeWeight};
use crate::{HistogramCheckpoint, HistogramOptions, PercentileEstimator};

/// A weighted histogram over a fixed bucket layout.
///
/// Only buckets holding weight are stored, so memory usage is proportional to the number of distinct buckets that have
/// seen samples rather than to the size of the layout.
///
/// Histograms are plain values: they are not synchronized, and callers sharing one across threads must provide their
/// own locking. Independent entities should simply use independent histograms.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    /// Bucket layout.
    options: HistogramOptions,

    /// Weight per bucket index. Never holds zero or negative weights.
    bucket_weights: BTreeMap<usize, f64>,

    /// Authoritative total weight, used to normalize percentile queries.
    total_weight: f64,
}

impl Histogram {
    /// Creates an empty histogram with the given layout.
    pub fn new(options: HistogramOptions) -> Self {
        Self {
            options,
            bucket_weights: BTreeMap::new(),
            total_weight: 0.0,
        }
    }

    /// Creates a histogram from a checkpoint.
    ///
    /// # Errors
    ///
    /// If the checkpoint is invalid, an error is returned.
    pub fn from_checkpoint(options: HistogramOptions, checkpoint: &HistogramCheckpoint) -> Result<Self, HistogramError> {
        let mut histogram = Self::new(options);
        histogram.load_from_checkpoint(checkpoint)?;
        Ok(histogram)
    }

    /// Returns the bucket layout of this histogram.
    pub fn options(&self) -> &HistogramOptions {
        &self.options
    }

    /// Returns the total weight of all samples in the histogram.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Returns the weight held by the bucket at `index`.
    pub fn bucket_weight(&self, index: usize) -> f64 {
        self.bucket_weights.get(&index).copied().unwrap_or(0.0)
    }

    /// Returns an iterator over all non-empty buckets, as `(index, weight)` pairs, in ascending index order.
    pub fn buckets(&self) -> impl DoubleEndedIterator<Item = (usize, f64)> + Clone + '_ {
        self.bucket_weights.iter().map(|(&index, &weight)| (index, weight))
    }

    /// Returns the index of the lowest bucket holding at least `epsilon` weight.
    pub fn min_bucket(&self) -> Option<usize> {
        let epsilon = self.options.epsilon();
        self.buckets().find(|(_, weight)| *weight >= epsilon).map(|(index, _)| index)
    }

    /// Returns the index of the highest bucket holding at least `epsilon` weight.
    pub fn max_bucket(&self) -> Option<usize> {
        let epsilon = self.options.epsilon();
        self.buckets().rev().find(|(_, weight)| *weight >= epsilon).map(|(index, _)| index)
    }

    /// Returns `true` if no bucket holds at least `epsilon` weight.
    pub fn is_empty(&self) -> bool {
        self.min_bucket().is_none()
    }

    /// Adds a sample with the given weight.
    ///
    /// Values outside of the layout are clamped into the first or last bucket. A weight of zero is a no-op.
    ///
    /// # Errors
    ///
    /// If the weight is negative or NaN, an error is returned and the histogram is left untouched.
    pub fn add_sample(&mut self, value: f64, weight: f64) -> Result<(), HistogramError> {
        ensure!(weight >= 0.0, NegativeWeight { weight });
        if weight == 0.0 {
            return Ok(());
        }

        let index = self.options.bucket_index_of(value);
        *self.bucket_weights.entry(index).or_insert(0.0) += weight;
        self.total_weight += weight;
        Ok(())
    }

    /// Removes a previously added sample.
    ///
    /// At most the weight present in the target bucket is removed. If the bucket is left with less than `epsilon`
    /// weight, it is dropped entirely, and the total weight is reduced by whatever was removed.
    ///
    /// # Errors
    ///
    /// If the weight is negative or NaN, an error is returned and the histogram is left untouched.
    pub fn subtract_sample(&mut self, value: f64, weight: f64) -> Result<(), HistogramError> {
        ensure!(weight >= 0.0, NegativeWeight { weight });

        let index = self.options.bucket_index_of(value);
        let Some(current) = self.bucket_weights.get_mut(&index) else {
            return Ok(());
        };

        let mut removed = weight.min(*current);
        *current -= removed;
        if *current < self.options.epsilon() {
            removed += *current;
            self.bucket_weights.remove(&index);
        }

        self.total_weight = (self.total_weight - removed).max(0.0);
        if self.bucket_weights.is_empty() {
            self.total_weight = 0.0;
        }
        Ok(())
    }

    /// Merges another histogram into this one.
    ///
    /// Merging is commutative and associative, up to floating-point rounding.
    ///
    /// # Errors
    ///
    /// If the other histogram uses different options, an error is returned and this histogram is left untouched.
    pub fn merge(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        ensure!(
            self.options == other.options,
            IncompatibleHistogramOptions {
                left: self.options,
                right: other.options,
            }
        );

        for (index, weight) in other.buckets() {
            *self.bucket_weights.entry(index).or_insert(0.0) += weight;
        }
        self.total_weight += other.total_weight;
        Ok(())
    }

    /// Multiplies every bucket weight, and the total weight, by `factor`.
    ///
    /// Negative or NaN factors are treated as zero, which clears the histogram.
    pub fn scale(&mut self, factor: f64) {
        if !(factor > 0.0) {
            self.clear();
            return;
        }

        for weight in self.bucket_weights.values_mut() {
            *weight *= factor;
        }
        self.bucket_weights.retain(|_, weight| *weight > 0.0);
        self.total_weight *= factor;
    }

    /// Removes all samples.
    pub fn clear(&mut self) {
        self.bucket_weights.clear();
        self.total_weight = 0.0;
    }

    /// Returns the weight of every bucket in the layout as a dense array.
    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.options.num_buckets()];
        for (index, weight) in self.buckets() {
            dense[index] = weight;
        }
        dense
    }

    /// Returns the value at the given percentile, where `p` is in `[0, 1]`.
    ///
    /// See [`PercentileEstimator::percentile`].
    pub fn percentile(&self, p: f64) -> f64 {
        PercentileEstimator::new(self).percentile(p)
    }

    /// Saves the histogram as a checkpoint.
    ///
    /// Bucket weights are quantized in the process, so the checkpoint is a lossy snapshot: see [`HistogramCheckpoint`].
    pub fn save_to_checkpoint(&self) -> HistogramCheckpoint {
        HistogramCheckpoint::quantize(self.buckets(), self.total_weight)
    }

    /// Replaces the contents of this histogram with those of a checkpoint.
    ///
    /// Bucket weights are rescaled so that they sum to the checkpoint's total weight. Buckets beyond the end of this
    /// histogram's layout are folded into its last bucket.
    ///
    /// # Errors
    ///
    /// If the checkpoint is invalid, an error is returned and the histogram is left untouched.
    pub fn load_from_checkpoint(&mut self, checkpoint: &HistogramCheckpoint) -> Result<(), HistogramError> {
        let dense = checkpoint.to_dense(self.options.num_buckets())?;

        self.bucket_weights = dense
            .into_iter()
            .enumerate()
            .filter(|(_, weight)| *weight > 0.0)
            .collect();
        self.total_weight = if self.bucket_weights.is_empty() {
            0.0
        } else {
            checkpoint.total_weight
        };
        Ok(())
    }
}
