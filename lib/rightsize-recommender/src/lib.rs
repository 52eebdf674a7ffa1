//! Resource right-sizing recommendations built on decaying usage histograms.
//!
//! Checkpoints persisted at the end of each observation window are fetched as [`CheckpointRecord`]s and merged per
//! entity by an [`Aggregator`]. The merged histograms are then turned into [`Recommendation`]s by a [`Recommender`],
//! which applies the sizing policy of the entity's [`ResourceFamily`]: target percentile, buffer, unit conversion, and
//! tier snapping.
//!
//! Nothing in this crate performs I/O other than [`ConfigurationLoader`] reading configuration files. Each entity is
//! aggregated independently, so callers are free to spread entities across threads.
#![deny(missing_docs)]

mod aggregator;
pub use self::aggregator::{AggregatedEntity, Aggregator, Ceilings, Resource};

pub mod config;
pub use self::config::{
    ConfigurationError, ConfigurationLoader, RecommenderConfiguration, ResourceFamily, ResourceFamilyConfig,
};

mod error;
pub use self::error::AggregationError;

mod key;
pub use self::key::EntityKey;

pub mod postprocess;
pub use self::postprocess::{ResourceAmounts, ResourceTier, TierTable, UnitConversion};

mod record;
pub use self::record::{CheckpointRecord, TimeRange};

mod recommendation;
pub use self::recommendation::{HistogramOutput, Recommendation, Recommender};
