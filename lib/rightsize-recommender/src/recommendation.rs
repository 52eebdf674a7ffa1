use rightsize_histogram::{Histogram, HistogramError, PercentileCurve, PercentileEstimator, StrippedHistogram};
use serde::{Deserialize, Serialize};
use snafu::ResultExt as _;
use tracing::{debug, warn};

use crate::error::{self, AggregationError};
use crate::postprocess::{truncate, ResourceAmounts, ResourceTier};
use crate::{AggregatedEntity, EntityKey, Resource, ResourceFamilyConfig};

/// The distribution of one resource dimension, as handed to API consumers.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramOutput {
    /// Number of buckets between `min_bucket` and `max_bucket`, inclusive.
    pub num_buckets: usize,

    /// Index of the first bucket holding weight.
    pub min_bucket: usize,

    /// Index of the last bucket holding weight.
    pub max_bucket: usize,

    /// Weights of buckets `min_bucket..=max_bucket`, summing to `total_weight`.
    pub bucket_weights: Vec<f64>,

    /// Total weight of the distribution.
    pub total_weight: f64,

    /// Values of percentiles 1 through 100, with index 0 unused.
    pub precomputed_percentiles: PercentileCurve,
}

impl HistogramOutput {
    /// Builds the output for a merged histogram.
    ///
    /// Bucket weights go through the same checkpoint round-trip they would if they were persisted, so that they match
    /// what a consumer reading the checkpoint back would reconcile. Percentiles are computed on the merged histogram
    /// itself, since the round-trip drops light buckets that may hold rare peaks.
    fn from_histogram(histogram: &Histogram) -> Result<Self, HistogramError> {
        let checkpoint = histogram.save_to_checkpoint();
        let stripped = StrippedHistogram::from_checkpoint(&checkpoint, histogram.options().num_buckets())?;

        let total_weight = if stripped.is_empty() { 0.0 } else { checkpoint.total_weight };

        Ok(Self {
            num_buckets: stripped.num_buckets,
            min_bucket: stripped.min_bucket,
            max_bucket: stripped.max_bucket,
            bucket_weights: stripped.bucket_weights,
            total_weight,
            precomputed_percentiles: PercentileEstimator::new(histogram).curve(),
        })
    }
}

/// A sizing recommendation for one entity.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Entity the recommendation is for.
    pub key: EntityKey,

    /// CPU usage distribution.
    pub cpu: HistogramOutput,

    /// Memory usage distribution.
    pub memory: HistogramOutput,

    /// Recommended amounts, after buffering and unit conversion.
    pub requested: ResourceAmounts,

    /// Smallest supported tier fitting the recommended amounts, if the family has tiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<ResourceTier>,
}

/// Turns aggregated entities into recommendations for one resource family.
#[derive(Clone, Debug)]
pub struct Recommender {
    config: ResourceFamilyConfig,
}

impl Recommender {
    /// Creates a recommender with the given family configuration.
    pub fn new(config: ResourceFamilyConfig) -> Self {
        Self { config }
    }

    /// Returns the family configuration.
    pub fn config(&self) -> &ResourceFamilyConfig {
        &self.config
    }

    /// Computes the recommendation for an aggregated entity.
    ///
    /// # Errors
    ///
    /// If either histogram cannot be reconciled, an error is returned.
    pub fn recommend(&self, entity: &AggregatedEntity) -> Result<Recommendation, AggregationError> {
        let cpu_histogram = entity.cpu.histogram();
        let memory_histogram = entity.memory.histogram();

        let cpu = HistogramOutput::from_histogram(cpu_histogram).context(error::Histogram {
            key: entity.key.clone(),
            resource: Resource::Cpu,
        })?;
        let memory = HistogramOutput::from_histogram(memory_histogram).context(error::Histogram {
            key: entity.key.clone(),
            resource: Resource::Memory,
        })?;

        let estimate = ResourceAmounts {
            cpu: truncate(cpu_histogram.percentile(self.config.target_percentile.cpu)),
            memory: truncate(memory_histogram.percentile(self.config.target_percentile.memory)),
        };
        let requested = self
            .config
            .unit_conversion
            .convert(estimate.with_buffer(self.config.buffer_percent));

        let tier = if self.config.tiers.is_empty() {
            None
        } else {
            let tier = self.config.tiers.snap(&requested).cloned();
            if tier.is_none() {
                warn!(
                    entity = %entity.key,
                    cpu = requested.cpu,
                    memory = requested.memory,
                    "No supported tier fits the recommended amounts."
                );
            }
            tier
        };

        debug!(
            entity = %entity.key,
            cpu_estimate = estimate.cpu,
            memory_estimate = estimate.memory,
            cpu = requested.cpu,
            memory = requested.memory,
            "Computed recommendation."
        );

        Ok(Recommendation {
            key: entity.key.clone(),
            cpu,
            memory,
            requested,
            tier,
        })
    }

    /// Computes recommendations for every entity, in order.
    ///
    /// # Errors
    ///
    /// If any recommendation fails, an error is returned.
    pub fn recommend_all(&self, entities: &[AggregatedEntity]) -> Result<Vec<Recommendation>, AggregationError> {
        entities.iter().map(|entity| self.recommend(entity)).collect()
    }
}
