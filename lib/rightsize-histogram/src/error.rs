use std::time::Duration;

use snafu::Snafu;

use crate::HistogramOptions;

/// Errors that can occur while building, combining, or restoring histograms.
#[derive(Clone, Debug, PartialEq, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum HistogramError {
    /// The bucket layout parameters do not describe a usable histogram.
    #[snafu(display("Invalid histogram options: {}.", reason))]
    InvalidOptions {
        /// Why the options were rejected.
        reason: &'static str,
    },

    /// Two histograms (or a histogram and a checkpoint) were combined despite using different bucket layouts.
    #[snafu(display("Cannot combine histograms with incompatible options: {:?} vs {:?}.", left, right))]
    IncompatibleHistogramOptions {
        /// Options of the histogram being merged into.
        left: HistogramOptions,

        /// Options of the histogram being merged from.
        right: HistogramOptions,
    },

    /// Two decaying histograms with different half-lives were merged.
    #[snafu(display("Cannot merge decaying histograms with different half-lives: {:?} vs {:?}.", left, right))]
    IncompatibleHalfLife {
        /// Half-life of the histogram being merged into.
        left: Duration,

        /// Half-life of the histogram being merged from.
        right: Duration,
    },

    /// A sample was added or removed with a negative (or NaN) weight.
    #[snafu(display("Sample weight must be a non-negative number, got {}.", weight))]
    NegativeWeight {
        /// The offending weight.
        weight: f64,
    },

    /// A checkpoint could not be restored.
    #[snafu(display("Invalid histogram checkpoint: {}.", reason))]
    InvalidCheckpoint {
        /// Why the checkpoint was rejected.
        reason: String,
    },
}
