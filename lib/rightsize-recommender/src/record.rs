use chrono::{DateTime, Utc};
use rightsize_histogram::HistogramCheckpoint;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{AggregationError, InvalidTimeRange, InvalidWindow};
use crate::EntityKey;

/// A half-open time range, `[start, end)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new time range.
    ///
    /// # Errors
    ///
    /// If `end` is not strictly after `start`, an error is returned.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AggregationError> {
        ensure!(end > start, InvalidTimeRange { start, end });
        Ok(Self { start, end })
    }

    /// Returns the start of the range (inclusive).
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the end of the range (exclusive).
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns `true` if the two ranges share any instant.
    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns the smallest range covering both ranges.
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Checkpoints of a single entity over a single observation window, as fetched from the checkpoint store.
///
/// Either dimension may be missing, for example when a container was only scraped for CPU during that window.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    /// Entity the checkpoints belong to.
    pub key: EntityKey,

    /// Start of the observation window (inclusive).
    pub window_start: DateTime<Utc>,

    /// End of the observation window (exclusive).
    pub window_end: DateTime<Utc>,

    /// CPU usage checkpoint.
    #[serde(default)]
    pub cpu: Option<HistogramCheckpoint>,

    /// Memory usage checkpoint.
    #[serde(default)]
    pub memory: Option<HistogramCheckpoint>,

    /// Peak memory usage observed during the window.
    #[serde(default)]
    pub memory_peak: f64,

    /// Number of samples that went into the checkpoints.
    #[serde(default)]
    pub total_samples: u64,
}

impl CheckpointRecord {
    /// Returns the observation window of this record.
    ///
    /// # Errors
    ///
    /// If the window ends at or before its start, an error is returned.
    pub fn window(&self) -> Result<TimeRange, AggregationError> {
        ensure!(
            self.window_end > self.window_start,
            InvalidWindow {
                key: self.key.clone(),
                start: self.window_start,
                end: self.window_end,
            }
        );
        Ok(TimeRange {
            start: self.window_start,
            end: self.window_end,
        })
    }
}
