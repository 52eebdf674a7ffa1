//! Computes resource right-sizing recommendations from persisted usage checkpoints.

#![deny(missing_docs)]

use std::io::Write as _;

use clap::Parser as _;
use rightsize_error::{generic_error, ErrorContext as _, GenericError};
use rightsize_recommender::{
    Aggregator, CheckpointRecord, ConfigurationLoader, RecommenderConfiguration, Recommender, ResourceFamily, TimeRange,
};
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod config;
use self::config::Cli;

fn main() -> Result<(), GenericError> {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(true)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => info!("rightsize stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_configuration(cli: &Cli) -> Result<RecommenderConfiguration, GenericError> {
    let mut loader = ConfigurationLoader::new()?;
    if let Some(path) = &cli.config {
        loader = if path.extension().is_some_and(|ext| ext == "json") {
            loader.from_json(path)?
        } else {
            loader.from_yaml(path)?
        };
    }

    loader
        .from_environment("RIGHTSIZE")?
        .into_typed()
        .error_context("Failed to load configuration.")
}

fn run(cli: Cli) -> Result<(), GenericError> {
    let configuration = load_configuration(&cli)?;
    let family = ResourceFamily::from(cli.family);
    let family_config = configuration.family(family).clone();

    let contents = std::fs::read_to_string(&cli.records)
        .with_error_context(|| format!("Failed to read checkpoint records from '{}'.", cli.records.display()))?;
    let records: Vec<CheckpointRecord> =
        serde_json::from_str(&contents).error_context("Failed to parse checkpoint records.")?;
    if records.is_empty() {
        return Err(generic_error!("No checkpoint records found in '{}'.", cli.records.display()));
    }
    info!(records = records.len(), %family, "Loaded checkpoint records.");

    let range = TimeRange::new(cli.start, cli.end)?;
    let aggregator = Aggregator::new(&family_config, cli.ceilings(), range)?;
    let entities = aggregator
        .aggregate_all(&records)
        .error_context("Failed to aggregate checkpoint records.")?;

    let recommendations = Recommender::new(family_config)
        .recommend_all(&entities)
        .error_context("Failed to compute recommendations.")?;
    info!(entities = recommendations.len(), "Computed recommendations.");

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &recommendations).error_context("Failed to write recommendations.")?;
    writeln!(stdout)?;

    Ok(())
}
