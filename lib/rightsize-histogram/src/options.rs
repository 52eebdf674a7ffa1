//! Bucket layouts.

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{HistogramError, InvalidOptions};

// Keeps a misconfigured layout (say, a 1 byte bucket width over a terabyte ceiling) from turning into a dense array
// allocation that takes the process down.
const MAX_BUCKETS: usize = 1 << 20;

/// Bucket layout policy for a single resource dimension.
///
/// The layout maps sample values to bucket indices and back. Indices always start at zero and run up to
/// [`num_buckets`][Self::num_buckets] (exclusive). Values below the first bucket (including negative values and NaN)
/// land in bucket zero, and values above the last bucket are clamped into the last bucket, so adding a sample never
/// loses weight.
///
/// Two sets of options are only considered compatible when every layout parameter, including `epsilon`, is identical.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum HistogramOptions {
    /// Fixed-width buckets.
    Linear(LinearBuckets),

    /// Buckets whose upper bounds grow geometrically.
    GeometricGrowth(GeometricBuckets),
}

/// Fixed-width bucket layout.
///
/// Bucket `i` covers `[i * bucket_width, (i + 1) * bucket_width)`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "LinearParams", into = "LinearParams")]
pub struct LinearBuckets {
    max_value: f64,
    bucket_width: f64,
    epsilon: f64,
    num_buckets: usize,
}

/// Geometrically-growing bucket layout.
///
/// Bucket `0` covers `[0, first_bucket_size]`, and bucket `i > 0` covers `(first_bucket_size * growth_ratio^(i-1),
/// first_bucket_size * growth_ratio^i]`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "GeometricParams", into = "GeometricParams")]
pub struct GeometricBuckets {
    max_value: f64,
    first_bucket_size: f64,
    growth_ratio: f64,
    epsilon: f64,
    num_buckets: usize,
}

#[derive(Clone, Copy, Deserialize, Serialize)]
struct LinearParams {
    max_value: f64,
    bucket_width: f64,
    epsilon: f64,
}

#[derive(Clone, Copy, Deserialize, Serialize)]
struct GeometricParams {
    max_value: f64,
    first_bucket_size: f64,
    growth_ratio: f64,
    epsilon: f64,
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl LinearBuckets {
    fn new(max_value: f64, bucket_width: f64, epsilon: f64) -> Result<Self, HistogramError> {
        ensure!(is_positive(max_value), InvalidOptions { reason: "max value must be positive and finite" });
        ensure!(is_positive(bucket_width), InvalidOptions { reason: "bucket width must be positive and finite" });
        ensure!(is_positive(epsilon), InvalidOptions { reason: "epsilon must be positive and finite" });

        let num_buckets = (max_value / bucket_width).ceil().max(1.0);
        ensure!(num_buckets <= MAX_BUCKETS as f64, InvalidOptions { reason: "layout requires too many buckets" });

        Ok(Self {
            max_value,
            bucket_width,
            epsilon,
            num_buckets: num_buckets as usize,
        })
    }

    /// Returns the width of every bucket.
    pub fn bucket_width(&self) -> f64 {
        self.bucket_width
    }

    fn bucket_index_of(&self, value: f64) -> usize {
        if !(value > 0.0) {
            return 0;
        }

        // Float-to-int casts saturate, so infinity ends up in the last bucket like any other oversized value.
        let index = (value / self.bucket_width).floor() as usize;
        index.min(self.num_buckets - 1)
    }

    fn bucket_start(&self, index: usize) -> f64 {
        index as f64 * self.bucket_width
    }
}

impl GeometricBuckets {
    fn new(max_value: f64, first_bucket_size: f64, growth_ratio: f64, epsilon: f64) -> Result<Self, HistogramError> {
        ensure!(is_positive(max_value), InvalidOptions { reason: "max value must be positive and finite" });
        ensure!(
            is_positive(first_bucket_size),
            InvalidOptions { reason: "first bucket size must be positive and finite" }
        );
        ensure!(
            growth_ratio.is_finite() && growth_ratio > 1.0,
            InvalidOptions { reason: "growth ratio must be greater than one" }
        );
        ensure!(is_positive(epsilon), InvalidOptions { reason: "epsilon must be positive and finite" });

        let estimate = ((max_value / first_bucket_size).ln() / growth_ratio.ln()).ceil().max(0.0);
        ensure!(estimate < MAX_BUCKETS as f64, InvalidOptions { reason: "layout requires too many buckets" });

        let mut layout = Self {
            max_value,
            first_bucket_size,
            growth_ratio,
            epsilon,
            num_buckets: MAX_BUCKETS,
        };
        layout.num_buckets = layout.covering_index(max_value) + 1;
        Ok(layout)
    }

    /// Returns the upper bound of the first bucket.
    pub fn first_bucket_size(&self) -> f64 {
        self.first_bucket_size
    }

    /// Returns the ratio between the upper bounds of consecutive buckets.
    pub fn growth_ratio(&self) -> f64 {
        self.growth_ratio
    }

    fn upper_bound(&self, index: usize) -> f64 {
        self.first_bucket_size * self.growth_ratio.powi(index as i32)
    }

    /// Smallest `i` such that `upper_bound(i) >= value`, for finite values.
    fn covering_index(&self, value: f64) -> usize {
        if !(value > self.first_bucket_size) {
            return 0;
        }

        // The logarithm gets us within one bucket of the answer; the correction steps absorb the rounding error so
        // that index and bound computations always agree with each other.
        let mut index = ((value / self.first_bucket_size).ln() / self.growth_ratio.ln())
            .ceil()
            .max(0.0) as usize;
        while index > 0 && self.upper_bound(index - 1) >= value {
            index -= 1;
        }
        while self.upper_bound(index) < value {
            index += 1;
        }
        index
    }

    fn bucket_index_of(&self, value: f64) -> usize {
        let last = self.num_buckets - 1;
        if value >= self.upper_bound(last) {
            return last;
        }

        self.covering_index(value)
    }

    fn bucket_start(&self, index: usize) -> f64 {
        if index == 0 {
            0.0
        } else {
            self.upper_bound(index - 1)
        }
    }
}

impl TryFrom<LinearParams> for LinearBuckets {
    type Error = HistogramError;

    fn try_from(params: LinearParams) -> Result<Self, Self::Error> {
        Self::new(params.max_value, params.bucket_width, params.epsilon)
    }
}

impl From<LinearBuckets> for LinearParams {
    fn from(layout: LinearBuckets) -> Self {
        Self {
            max_value: layout.max_value,
            bucket_width: layout.bucket_width,
            epsilon: layout.epsilon,
        }
    }
}

impl TryFrom<GeometricParams> for GeometricBuckets {
    type Error = HistogramError;

    fn try_from(params: GeometricParams) -> Result<Self, Self::Error> {
        Self::new(
            params.max_value,
            params.first_bucket_size,
            params.growth_ratio,
            params.epsilon,
        )
    }
}

impl From<GeometricBuckets> for GeometricParams {
    fn from(layout: GeometricBuckets) -> Self {
        Self {
            max_value: layout.max_value,
            first_bucket_size: layout.first_bucket_size,
            growth_ratio: layout.growth_ratio,
            epsilon: layout.epsilon,
        }
    }
}

impl HistogramOptions {
    /// Creates a fixed-width bucket layout covering `[0, max_value]`.
    ///
    /// # Errors
    ///
    /// If any parameter is not a positive, finite number, or the layout would need an unreasonable number of buckets,
    /// an error is returned.
    pub fn linear(max_value: f64, bucket_width: f64, epsilon: f64) -> Result<Self, HistogramError> {
        LinearBuckets::new(max_value, bucket_width, epsilon).map(Self::Linear)
    }

    /// Creates a geometrically-growing bucket layout covering `[0, max_value]`.
    ///
    /// # Errors
    ///
    /// If any parameter is not a positive, finite number, the growth ratio is not greater than one, or the layout would
    /// need an unreasonable number of buckets, an error is returned.
    pub fn geometric_growth(
        max_value: f64, first_bucket_size: f64, growth_ratio: f64, epsilon: f64,
    ) -> Result<Self, HistogramError> {
        GeometricBuckets::new(max_value, first_bucket_size, growth_ratio, epsilon).map(Self::GeometricGrowth)
    }

    /// Returns a copy of these options with a different ceiling.
    ///
    /// Used when the current observed ceiling of an entity should drive the layout of a fresh merge.
    ///
    /// # Errors
    ///
    /// If the new ceiling is not a positive, finite number, an error is returned.
    pub fn with_max_value(&self, max_value: f64) -> Result<Self, HistogramError> {
        match self {
            Self::Linear(layout) => Self::linear(max_value, layout.bucket_width, layout.epsilon),
            Self::GeometricGrowth(layout) => Self::geometric_growth(
                max_value,
                layout.first_bucket_size,
                layout.growth_ratio,
                layout.epsilon,
            ),
        }
    }

    /// Returns the number of buckets in this layout.
    pub fn num_buckets(&self) -> usize {
        match self {
            Self::Linear(layout) => layout.num_buckets,
            Self::GeometricGrowth(layout) => layout.num_buckets,
        }
    }

    /// Returns the smallest weight considered meaningful.
    ///
    /// Buckets holding less than this are treated as empty.
    pub fn epsilon(&self) -> f64 {
        match self {
            Self::Linear(layout) => layout.epsilon,
            Self::GeometricGrowth(layout) => layout.epsilon,
        }
    }

    /// Returns the resource ceiling this layout was built for.
    pub fn max_value(&self) -> f64 {
        match self {
            Self::Linear(layout) => layout.max_value,
            Self::GeometricGrowth(layout) => layout.max_value,
        }
    }

    /// Returns the index of the bucket holding `value`.
    pub fn bucket_index_of(&self, value: f64) -> usize {
        match self {
            Self::Linear(layout) => layout.bucket_index_of(value),
            Self::GeometricGrowth(layout) => layout.bucket_index_of(value),
        }
    }

    /// Returns the lower bound of the bucket at `index`.
    pub fn bucket_start(&self, index: usize) -> f64 {
        match self {
            Self::Linear(layout) => layout.bucket_start(index),
            Self::GeometricGrowth(layout) => layout.bucket_start(index),
        }
    }

    /// Returns the upper bound of the bucket at `index`.
    ///
    /// This is the value reported for percentiles falling into the bucket.
    pub fn bucket_upper_bound(&self, index: usize) -> f64 {
        match self {
            Self::Linear(layout) => layout.bucket_start(index + 1),
            Self::GeometricGrowth(layout) => layout.upper_bound(index),
        }
    }
}
