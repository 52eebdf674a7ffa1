use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use rightsize_recommender::{Ceilings, ResourceFamily};

#[derive(Clone, Parser)]
#[command(about)]
pub struct Cli {
    /// Path to the configuration file, in YAML or JSON format.
    ///
    /// Files ending in `.json` are read as JSON, and everything else as YAML. Settings not present in the file fall back
    /// to the built-in presets, and can be overridden with `RIGHTSIZE_`-prefixed environment variables.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the checkpoint records to aggregate, as a JSON array.
    #[arg(long)]
    pub records: PathBuf,

    /// Resource family the records belong to.
    #[arg(long, value_enum, default_value_t = Family::Kubernetes)]
    pub family: Family,

    /// Start of the time range to aggregate (RFC 3339).
    #[arg(long)]
    pub start: DateTime<Utc>,

    /// End of the time range to aggregate (RFC 3339).
    #[arg(long)]
    pub end: DateTime<Utc>,

    /// Current CPU ceiling, overriding the configured histogram maximum.
    #[arg(long)]
    pub cpu_ceiling: Option<f64>,

    /// Current memory ceiling, overriding the configured histogram maximum.
    #[arg(long)]
    pub memory_ceiling: Option<f64>,
}

impl Cli {
    pub fn ceilings(&self) -> Ceilings {
        Ceilings {
            cpu: self.cpu_ceiling,
            memory: self.memory_ceiling,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Family {
    /// Kubernetes containers, grouped by workload.
    Kubernetes,

    /// ECS services.
    Ecs,

    /// Virtual machine instances.
    Vm,
}

impl From<Family> for ResourceFamily {
    fn from(family: Family) -> Self {
        match family {
            Family::Kubernetes => ResourceFamily::Kubernetes,
            Family::Ecs => ResourceFamily::Ecs,
            Family::Vm => ResourceFamily::Vm,
        }
    }
}
