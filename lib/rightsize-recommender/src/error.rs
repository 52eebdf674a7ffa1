use chrono::{DateTime, Utc};
use rightsize_histogram::HistogramError;
use snafu::Snafu;

use crate::{EntityKey, Resource};

/// Errors that can occur while aggregating checkpoints or producing recommendations.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum AggregationError {
    /// The requested time range is empty.
    #[snafu(display("Time range must end after it starts: {} to {}.", start, end))]
    InvalidTimeRange {
        /// Start of the range.
        start: DateTime<Utc>,

        /// End of the range.
        end: DateTime<Utc>,
    },

    /// A checkpoint record's window is empty.
    #[snafu(display("Checkpoint record for '{}' has an empty window: {} to {}.", key, start, end))]
    InvalidWindow {
        /// Entity the record belongs to.
        key: EntityKey,

        /// Start of the window.
        start: DateTime<Utc>,

        /// End of the window.
        end: DateTime<Utc>,
    },

    /// The histogram options for a resource could not be built from the current ceiling.
    #[snafu(display("Failed to build {} histogram options.", resource))]
    Options {
        /// Resource dimension.
        resource: Resource,

        /// Error source.
        source: HistogramError,
    },

    /// The configured half-life cannot be used for decaying histograms.
    #[snafu(display("Invalid half-life of {:?}.", half_life))]
    HalfLife {
        /// Configured half-life.
        half_life: std::time::Duration,

        /// Error source.
        source: HistogramError,
    },

    /// A checkpoint could not be loaded or merged.
    #[snafu(display("Failed to process {} histogram for '{}'.", resource, key))]
    Histogram {
        /// Entity being processed.
        key: EntityKey,

        /// Resource dimension.
        resource: Resource,

        /// Error source.
        source: HistogramError,
    },
}
