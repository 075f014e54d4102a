//! Command implementations

mod cache;
mod config;
mod register;
mod run;

use crate::cli::{Cli, Commands};
use crate::output::OutputWriter;
use anyhow::{Context, Result};
use geocorr_core::config::{CliConfigOverrides, LayeredConfig, PipelineSettings};
use geocorr_store::{CacheService, DiskTier};
use std::path::Path;

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Run(args) => run::execute(args, config_file, &output).await,
        Commands::Register(args) => register::execute(args, config_file, &output).await,
        Commands::Cache(args) => cache::execute(args, config_file, &output).await,
        Commands::Config(args) => config::execute(args, config_file, &output),
    }
}

/// Layer defaults, the optional config file, the environment and CLI overrides
pub fn load_config(config_file: Option<&Path>, overrides: CliConfigOverrides) -> Result<LayeredConfig> {
    let mut config = LayeredConfig::with_defaults();
    if let Some(path) = config_file {
        config = config
            .load_from_file(path)
            .with_context(|| format!("Failed to load configuration file {}", path.display()))?;
    }

    let mut config = config.load_from_env();
    config.update_from_cli(overrides);
    Ok(config)
}

/// Cache for a run: disk-backed when a cache directory is configured
pub async fn open_cache(settings: &PipelineSettings) -> Result<CacheService> {
    match &settings.cache_dir {
        Some(dir) => {
            let disk = DiskTier::open(dir.clone(), settings.cache_budget_bytes)
                .await
                .with_context(|| format!("Failed to open cache directory {}", dir.display()))?;
            Ok(CacheService::with_disk(disk))
        }
        None => Ok(CacheService::in_memory()),
    }
}
