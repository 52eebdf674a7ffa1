//! Merging of per-window checkpoints into per-entity histograms.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use rightsize_histogram::{DecayingHistogram, HistogramCheckpoint, HistogramOptions};
use serde::{Deserialize, Serialize};
use snafu::ResultExt as _;
use tracing::{debug, warn};

use crate::error::{AggregationError, HalfLife, Histogram, Options};
use crate::{CheckpointRecord, EntityKey, ResourceFamilyConfig, TimeRange};

/// A resource dimension.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// CPU usage.
    Cpu,

    /// Memory usage.
    Memory,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("CPU"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Current maximum CPU and memory observed for an entity.
///
/// When set, a ceiling replaces the configured `max_value` of that dimension's histogram options, so that every
/// checkpoint is loaded into buckets matching the entity as it is today.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Ceilings {
    /// Current CPU ceiling.
    pub cpu: Option<f64>,

    /// Current memory ceiling.
    pub memory: Option<f64>,
}

/// Histograms and statistics of a single entity, merged across windows.
#[derive(Clone, Debug)]
pub struct AggregatedEntity {
    /// Entity the histograms belong to.
    pub key: EntityKey,

    /// Merged CPU histogram.
    pub cpu: DecayingHistogram,

    /// Merged memory histogram.
    pub memory: DecayingHistogram,

    /// Number of samples across all merged windows.
    pub total_samples: u64,

    /// Highest memory peak across all merged windows.
    pub memory_peak: f64,

    /// Smallest range covering all merged windows, or `None` if no window was merged.
    pub window: Option<TimeRange>,
}

impl AggregatedEntity {
    /// Returns `true` if both the CPU and memory histograms hold weight.
    pub fn is_complete(&self) -> bool {
        !self.cpu.is_empty() && !self.memory.is_empty()
    }
}

/// Merges checkpoint records over a time range.
///
/// Each checkpoint is loaded into a histogram built with the aggregator's options, regardless of the options it was
/// saved under, and merged with the other checkpoints of the same entity and dimension.
#[derive(Clone, Debug)]
pub struct Aggregator {
    cpu_options: HistogramOptions,
    memory_options: HistogramOptions,
    half_life: Duration,
    range: TimeRange,
    empty_cpu: DecayingHistogram,
    empty_memory: DecayingHistogram,
}

impl Aggregator {
    /// Creates an aggregator for the given family, ceilings, and time range.
    ///
    /// # Errors
    ///
    /// If a ceiling is not a valid maximum value for the configured histogram options, or the configured half-life is
    /// too short, an error is returned.
    pub fn new(config: &ResourceFamilyConfig, ceilings: Ceilings, range: TimeRange) -> Result<Self, AggregationError> {
        let cpu_options = match ceilings.cpu {
            Some(ceiling) => config
                .cpu_histogram
                .with_max_value(ceiling)
                .context(Options { resource: Resource::Cpu })?,
            None => config.cpu_histogram,
        };
        let memory_options = match ceilings.memory {
            Some(ceiling) => config.memory_histogram.with_max_value(ceiling).context(Options {
                resource: Resource::Memory,
            })?,
            None => config.memory_histogram,
        };

        let half_life = config.half_life();
        let empty_cpu = DecayingHistogram::new(cpu_options, half_life).context(HalfLife { half_life })?;
        let empty_memory = DecayingHistogram::new(memory_options, half_life).context(HalfLife { half_life })?;

        Ok(Self {
            cpu_options,
            memory_options,
            half_life,
            range,
            empty_cpu,
            empty_memory,
        })
    }

    /// Returns the histogram options used for the given resource.
    pub fn options(&self, resource: Resource) -> &HistogramOptions {
        match resource {
            Resource::Cpu => &self.cpu_options,
            Resource::Memory => &self.memory_options,
        }
    }

    /// Returns the time range that records must intersect to be merged.
    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// Returns the configured half-life.
    pub fn half_life(&self) -> Duration {
        self.half_life
    }

    fn merge_checkpoint(
        &self, key: &EntityKey, resource: Resource, merged: &mut DecayingHistogram, checkpoint: &HistogramCheckpoint,
    ) -> Result<(), AggregationError> {
        let context = || Histogram {
            key: key.clone(),
            resource,
        };

        let loaded = DecayingHistogram::from_checkpoint(*self.options(resource), self.half_life, checkpoint)
            .with_context(|_| context())?;
        merged.merge(&loaded).with_context(|_| context())
    }

    /// Merges all records of a single entity that intersect the time range.
    ///
    /// Records belonging to other entities are ignored.
    ///
    /// # Errors
    ///
    /// If a record has an empty window, or one of its checkpoints is invalid, an error is returned.
    pub fn aggregate_entity<'a, I>(&self, key: &EntityKey, records: I) -> Result<AggregatedEntity, AggregationError>
    where
        I: IntoIterator<Item = &'a CheckpointRecord>,
    {
        let mut entity = AggregatedEntity {
            key: key.clone(),
            cpu: self.empty_cpu.clone(),
            memory: self.empty_memory.clone(),
            total_samples: 0,
            memory_peak: 0.0,
            window: None,
        };

        for record in records.into_iter().filter(|record| &record.key == key) {
            let window = record.window()?;
            if !window.intersects(&self.range) {
                continue;
            }

            if let Some(checkpoint) = &record.cpu {
                self.merge_checkpoint(key, Resource::Cpu, &mut entity.cpu, checkpoint)?;
            }
            if let Some(checkpoint) = &record.memory {
                self.merge_checkpoint(key, Resource::Memory, &mut entity.memory, checkpoint)?;
            }

            entity.total_samples = entity.total_samples.saturating_add(record.total_samples);
            entity.memory_peak = entity.memory_peak.max(record.memory_peak);
            entity.window = Some(match entity.window {
                Some(covered) => covered.union(&window),
                None => window,
            });
        }

        debug!(
            entity = %key,
            total_samples = entity.total_samples,
            cpu_weight = entity.cpu.histogram().total_weight(),
            memory_weight = entity.memory.histogram().total_weight(),
            "Aggregated entity."
        );

        Ok(entity)
    }

    /// Merges the records of every entity belonging to `group`, applying the completeness rule.
    ///
    /// An entity is only part of the result if both its CPU and its memory histograms hold weight. Entities with a
    /// single dimension are excluded rather than reported with a partial recommendation. Results are ordered by key.
    ///
    /// # Errors
    ///
    /// If a record has an empty window, or one of its checkpoints is invalid, an error is returned.
    pub fn aggregate_group(
        &self, group: &EntityKey, records: &[CheckpointRecord],
    ) -> Result<Vec<AggregatedEntity>, AggregationError> {
        let mut members = BTreeMap::new();
        for record in records.iter().filter(|record| &record.key.group() == group) {
            members.entry(&record.key).or_insert_with(Vec::new).push(record);
        }

        let mut aggregated = Vec::with_capacity(members.len());
        for (key, member_records) in members {
            let entity = self.aggregate_entity(key, member_records)?;
            if entity.is_complete() {
                aggregated.push(entity);
            } else {
                warn!(
                    entity = %key,
                    group = %group,
                    has_cpu = !entity.cpu.is_empty(),
                    has_memory = !entity.memory.is_empty(),
                    "Excluding entity without both CPU and memory usage."
                );
            }
        }

        Ok(aggregated)
    }

    /// Merges all records, group by group.
    ///
    /// # Errors
    ///
    /// If a record has an empty window, or one of its checkpoints is invalid, an error is returned.
    pub fn aggregate_all(&self, records: &[CheckpointRecord]) -> Result<Vec<AggregatedEntity>, AggregationError> {
        let groups = records
            .iter()
            .map(|record| record.key.group())
            .collect::<BTreeSet<_>>();

        let mut aggregated = Vec::new();
        for group in groups {
            aggregated.extend(self.aggregate_group(&group, records)?);
        }
        Ok(aggregated)
    }
}
