//! Resource family configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fmt, fs};

use figment::error::Kind;
use figment::providers::{Env, Format as _, Json, Serialized, Yaml};
use figment::Figment;
use rightsize_histogram::{HistogramError, HistogramOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

use crate::postprocess::{TierTable, UnitConversion};

const DEFAULT_HALF_LIFE_SECS: u64 = 24 * 60 * 60;
const DEFAULT_EPSILON: f64 = 0.0001;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// A configuration file could not be read.
    #[snafu(display("Failed to read configuration file '{}'.", path.display()))]
    Io {
        /// Path of the file.
        path: PathBuf,

        /// Error source.
        source: std::io::Error,
    },

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration.", field))]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// Field had a different data type than expected.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// One of the built-in resource family presets could not be built.
    #[snafu(display("Invalid built-in configuration."))]
    Preset {
        /// Error source.
        source: HistogramError,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to load configuration."))]
    Generic {
        /// Error source.
        source: Box<figment::Error>,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        match e.kind.clone() {
            Kind::MissingField(field) => Self::MissingField {
                field: if e.path.is_empty() {
                    field.to_string()
                } else {
                    format!("{}.{}", e.path.join("."), field)
                },
            },
            Kind::InvalidType(actual_ty, expected_ty) => Self::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => Self::Generic { source: Box::new(e) },
        }
    }
}

/// A family of resources that share sizing policy.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFamily {
    /// Kubernetes workloads and containers.
    Kubernetes,

    /// ECS services.
    Ecs,

    /// Virtual machine instances.
    Vm,
}

impl fmt::Display for ResourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kubernetes => f.write_str("kubernetes"),
            Self::Ecs => f.write_str("ecs"),
            Self::Vm => f.write_str("vm"),
        }
    }
}

/// Percentiles, in `[0, 1]`, that recommendations are sized at.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct TargetPercentile {
    /// CPU percentile.
    pub cpu: f64,

    /// Memory percentile.
    pub memory: f64,
}

impl Default for TargetPercentile {
    fn default() -> Self {
        Self { cpu: 0.95, memory: 0.95 }
    }
}

/// Sizing policy for one resource family.
///
/// Histogram options are expressed in the units samples are recorded in. [`unit_conversion`][Self::unit_conversion]
/// then maps recommendations into the units they're reported in.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ResourceFamilyConfig {
    /// Bucket layout for CPU usage.
    pub cpu_histogram: HistogramOptions,

    /// Bucket layout for memory usage.
    pub memory_histogram: HistogramOptions,

    /// Percentage added on top of the percentile estimate.
    #[serde(default)]
    pub buffer_percent: u32,

    /// Conversion into reporting units.
    #[serde(default)]
    pub unit_conversion: UnitConversion,

    /// Percentiles recommendations are sized at.
    #[serde(default)]
    pub target_percentile: TargetPercentile,

    /// Half-life of usage samples, in seconds.
    #[serde(default = "default_half_life_secs")]
    pub half_life_secs: u64,

    /// Supported resource tiers, in reporting units. When empty, recommendations are not snapped.
    #[serde(default)]
    pub tiers: TierTable,
}

fn default_half_life_secs() -> u64 {
    DEFAULT_HALF_LIFE_SECS
}

impl ResourceFamilyConfig {
    /// Kubernetes containers: geometric buckets over millicores and bytes.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the error covers the histogram option validation.
    pub fn kubernetes() -> Result<Self, HistogramError> {
        Ok(Self {
            // 10 millicores up to 1000 cores.
            cpu_histogram: HistogramOptions::geometric_growth(1_000_000.0, 10.0, 1.05, DEFAULT_EPSILON)?,
            // 10MB up to 1TB.
            memory_histogram: HistogramOptions::geometric_growth(1e12, 1e7, 1.05, DEFAULT_EPSILON)?,
            buffer_percent: 15,
            unit_conversion: UnitConversion::IDENTITY,
            target_percentile: TargetPercentile { cpu: 0.9, memory: 0.95 },
            half_life_secs: DEFAULT_HALF_LIFE_SECS,
            tiers: TierTable::default(),
        })
    }

    /// ECS services: linear buckets over CPU units and megabytes, reported as CPU units and bytes.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the error covers the histogram option validation.
    pub fn ecs() -> Result<Self, HistogramError> {
        Ok(Self {
            cpu_histogram: HistogramOptions::linear(16_384.0, 1.0, DEFAULT_EPSILON)?,
            memory_histogram: HistogramOptions::linear(122_880.0, 1.0, DEFAULT_EPSILON)?,
            buffer_percent: 20,
            unit_conversion: UnitConversion {
                cpu_factor: 1,
                memory_factor: 1024 * 1024,
            },
            target_percentile: TargetPercentile::default(),
            half_life_secs: DEFAULT_HALF_LIFE_SECS,
            tiers: TierTable::default(),
        })
    }

    /// Virtual machines: linear buckets over utilization percentages.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the error covers the histogram option validation.
    pub fn vm() -> Result<Self, HistogramError> {
        Ok(Self {
            cpu_histogram: HistogramOptions::linear(100.0, 1.0, DEFAULT_EPSILON)?,
            memory_histogram: HistogramOptions::linear(100.0, 1.0, DEFAULT_EPSILON)?,
            buffer_percent: 10,
            unit_conversion: UnitConversion::IDENTITY,
            target_percentile: TargetPercentile::default(),
            half_life_secs: 7 * DEFAULT_HALF_LIFE_SECS,
            tiers: TierTable::default(),
        })
    }

    /// Returns the half-life of usage samples.
    pub fn half_life(&self) -> Duration {
        Duration::from_secs(self.half_life_secs)
    }
}

/// Recommender configuration, with one sizing policy per resource family.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RecommenderConfiguration {
    /// Kubernetes sizing policy.
    pub kubernetes: ResourceFamilyConfig,

    /// ECS sizing policy.
    pub ecs: ResourceFamilyConfig,

    /// Virtual machine sizing policy.
    pub vm: ResourceFamilyConfig,
}

impl RecommenderConfiguration {
    /// Returns the configuration made up of the built-in presets.
    ///
    /// # Errors
    ///
    /// If a preset fails validation, an error is returned.
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Ok(Self {
            kubernetes: ResourceFamilyConfig::kubernetes().context(Preset)?,
            ecs: ResourceFamilyConfig::ecs().context(Preset)?,
            vm: ResourceFamilyConfig::vm().context(Preset)?,
        })
    }

    /// Returns the sizing policy for the given family.
    pub fn family(&self, family: ResourceFamily) -> &ResourceFamilyConfig {
        match family {
            ResourceFamily::Kubernetes => &self.kubernetes,
            ResourceFamily::Ecs => &self.ecs,
            ResourceFamily::Vm => &self.vm,
        }
    }
}

/// A configuration loader that layers multiple sources over the built-in presets.
///
/// Sources added later take precedence over sources added earlier. Nested tables are merged, so a source only needs
/// to set the fields it overrides.
///
/// # Supported sources
///
/// - YAML file
/// - JSON file
/// - environment variables (must be prefixed; see [`from_environment`][Self::from_environment])
pub struct ConfigurationLoader {
    figment: Figment,
}

impl ConfigurationLoader {
    /// Creates a loader seeded with [`RecommenderConfiguration::builtin`].
    ///
    /// # Errors
    ///
    /// If the built-in configuration is invalid, an error is returned.
    pub fn new() -> Result<Self, ConfigurationError> {
        let builtin = RecommenderConfiguration::builtin()?;
        Ok(Self {
            figment: Figment::from(Serialized::defaults(builtin)),
        })
    }

    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, an error is returned. Syntax errors surface when the configuration is extracted.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let contents = read_file(path.as_ref())?;
        self.figment = self.figment.merge(Yaml::string(&contents));
        Ok(self)
    }

    /// Loads the given JSON configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, an error is returned. Syntax errors surface when the configuration is extracted.
    pub fn from_json<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let contents = read_file(path.as_ref())?;
        self.figment = self.figment.merge(Json::string(&contents));
        Ok(self)
    }

    /// Loads configuration from environment variables.
    ///
    /// The prefix given will have an underscore appended to it if it does not already end with one. Nested fields are
    /// separated by a double underscore: with a prefix of `rightsize`, `RIGHTSIZE_ECS__BUFFER_PERCENT` sets
    /// `ecs.buffer_percent`.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, an error will be returned.
    pub fn from_environment(mut self, prefix: &'static str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let prefix = if prefix.ends_with('_') {
            prefix.to_string()
        } else {
            format!("{}_", prefix)
        };

        self.figment = self.figment.merge(Env::prefixed(&prefix).split("__"));
        Ok(self)
    }

    /// Consumes the loader, deserializing it as `T`.
    ///
    /// # Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error will be returned.
    pub fn into_typed<T>(self) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned,
    {
        self.figment.extract().map_err(Into::into)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigurationError> {
    debug!(file_path = %path.display(), "Reading configuration file.");
    fs::read_to_string(path).context(Io { path })
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use rightsize_histogram::float_eq;

    use super::*;
    use crate::postprocess::ResourceTier;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn presets_are_valid() {
        let config = RecommenderConfiguration::builtin().unwrap();

        assert!(matches!(config.kubernetes.cpu_histogram, HistogramOptions::GeometricGrowth(_)));
        assert!(matches!(config.ecs.memory_histogram, HistogramOptions::Linear(_)));
        assert_eq!(config.ecs.unit_conversion.memory_factor, 1_048_576);
        assert_eq!(config.vm.cpu_histogram.num_buckets(), 100);
        assert_eq!(config.family(ResourceFamily::Vm), &config.vm);
        assert_eq!(config.kubernetes.half_life(), Duration::from_secs(86_400));
    }

    #[test]
    fn builtin_without_sources() {
        let config: RecommenderConfiguration = ConfigurationLoader::new().unwrap().into_typed().unwrap();
        assert_eq!(config, RecommenderConfiguration::builtin().unwrap());
    }

    #[test]
    fn yaml_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "rightsize.yaml",
            r#"
ecs:
  buffer_percent: 25
  memory_histogram:
    layout: linear
    max_value: 30720.0
    bucket_width: 2.0
    epsilon: 0.001
  tiers:
    - { name: "0.25 vCPU", cpu: 256, memory: 536870912 }
    - { cpu: 512, memory: 1073741824 }
"#,
        );

        let config: RecommenderConfiguration = ConfigurationLoader::new()
            .unwrap()
            .from_yaml(&path)
            .unwrap()
            .into_typed()
            .unwrap();

        assert_eq!(config.ecs.buffer_percent, 25);
        assert_eq!(config.ecs.memory_histogram.num_buckets(), 15_360);
        assert!(float_eq(config.ecs.memory_histogram.epsilon(), 0.001));
        assert_eq!(
            config.ecs.tiers.snap(&crate::ResourceAmounts { cpu: 300, memory: 1 }),
            Some(&ResourceTier {
                name: None,
                cpu: 512,
                memory: 1_073_741_824
            })
        );

        // Untouched fields keep their built-in values.
        assert_eq!(config.ecs.unit_conversion.memory_factor, 1_048_576);
        assert_eq!(config.kubernetes, ResourceFamilyConfig::kubernetes().unwrap());
    }

    #[test]
    fn json_and_environment_layering() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rightsize.json", r#"{ "vm": { "buffer_percent": 30, "half_life_secs": 60 } }"#);

        std::env::set_var("RIGHTSIZE_TEST_LAYERING_VM__BUFFER_PERCENT", "40");

        let config: RecommenderConfiguration = ConfigurationLoader::new()
            .unwrap()
            .from_json(&path)
            .unwrap()
            .from_environment("RIGHTSIZE_TEST_LAYERING")
            .unwrap()
            .into_typed()
            .unwrap();

        assert_eq!(config.vm.buffer_percent, 40);
        assert_eq!(config.vm.half_life_secs, 60);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "rightsize.yaml",
            "vm:\n  cpu_histogram:\n    layout: geometric_growth\n    max_value: 100.0\n    first_bucket_size: 1.0\n    growth_ratio: 0.5\n    epsilon: 0.001\n",
        );

        let result = ConfigurationLoader::new()
            .unwrap()
            .from_yaml(&path)
            .unwrap()
            .into_typed::<RecommenderConfiguration>();
        assert!(result.is_err());
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigurationLoader::new()
            .unwrap()
            .from_yaml(dir.path().join("missing.yaml"));

        assert!(matches!(result, Err(ConfigurationError::Io { .. })));
    }

    #[test]
    fn empty_environment_prefix() {
        assert!(matches!(
            ConfigurationLoader::new().unwrap().from_environment(""),
            Err(ConfigurationError::EmptyPrefix)
        ));
    }
}
