//! Weighted, decaying histograms for resource right-sizing.
//!
//! Utilization samples are accumulated into a [`Histogram`] whose bucket layout is described by [`HistogramOptions`].
//! At the end of an observation window, a histogram is saved as a [`HistogramCheckpoint`], which is the form that gets
//! persisted. Checkpoints from many windows are later loaded back and merged into a consolidated histogram, which is
//! then queried for percentiles (see [`PercentileEstimator`]) and compacted for transport (see [`StrippedHistogram`]).
//!
//! # Quick Start
//!
//! ```
//! use rightsize_histogram::{Histogram, HistogramOptions};
//!
//! let options = HistogramOptions::linear(100.0, 1.0, 0.0001).unwrap();
//! let mut histogram = Histogram::new(options);
//! histogram.add_sample(42.5, 1.0).unwrap();
//! histogram.add_sample(57.0, 3.0).unwrap();
//!
//! let checkpoint = histogram.save_to_checkpoint();
//! let restored = Histogram::from_checkpoint(options, &checkpoint).unwrap();
//! assert_eq!(restored.percentile(0.5), 58.0);
//! ```
#![deny(missing_docs)]

mod checkpoint;
pub use self::checkpoint::{HistogramCheckpoint, MAX_CHECKPOINT_WEIGHT};

mod common;
pub use self::common::float_eq;

mod decaying;
pub use self::decaying::{DecayingHistogram, MAX_DECAY_EXPONENT};

mod error;
pub use self::error::HistogramError;

mod histogram;
pub use self::histogram::Histogram;

mod options;
pub use self::options::{GeometricBuckets, HistogramOptions, LinearBuckets};

mod percentile;
pub use self::percentile::{PercentileCurve, PercentileEstimator, EMPTY_PERCENTILE};

mod stripped;
pub use self::stripped::StrippedHistogram;
