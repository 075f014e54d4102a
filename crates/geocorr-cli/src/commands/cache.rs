//! Cache command implementation

use crate::cli::{CacheArgs, CacheCommands};
use crate::commands::load_config;
use crate::output::OutputWriter;
use anyhow::{Context, Result};
use geocorr_core::config::CliConfigOverrides;
use geocorr_store::{CacheService, DiskTier};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct CacheStatsOutput {
    dir: PathBuf,
    entries: usize,
    bytes: u64,
    budget_bytes: u64,
}

#[derive(Debug, Serialize)]
struct CacheClearOutput {
    dir: PathBuf,
    removed: usize,
}

pub async fn execute(args: CacheArgs, config_file: Option<&Path>, output: &OutputWriter) -> Result<()> {
    let overrides = CliConfigOverrides { cache_dir: args.cache_dir.clone(), ..Default::default() };
    let settings = load_config(config_file, overrides)?.settings()?;

    let Some(dir) = settings.cache_dir.clone() else {
        anyhow::bail!("No cache directory configured. Pass --cache-dir or set GEOCORR_CACHE_DIR.");
    };

    let disk = DiskTier::open(dir.clone(), settings.cache_budget_bytes)
        .await
        .with_context(|| format!("Failed to open cache directory {}", dir.display()))?;
    let cache = CacheService::with_disk(disk);

    match args.command {
        CacheCommands::Stats => {
            let report = cache.report().await;
            let stats = CacheStatsOutput {
                dir,
                entries: report.disk_entries,
                bytes: report.disk_bytes,
                budget_bytes: settings.cache_budget_bytes,
            };

            if output.is_json() {
                output.result(stats)?;
            } else {
                output.section("Cache");
                output.kv("Directory", stats.dir.display());
                output.kv("Entries", stats.entries);
                output.kv("Size", format!("{} of {} bytes", stats.bytes, stats.budget_bytes));
            }
        }
        CacheCommands::Clear => {
            let removed = cache.clear().await?;
            if output.is_json() {
                output.result(CacheClearOutput { dir, removed })?;
            } else {
                output.success(format!("Removed {} cached entr(y/ies) from {}", removed, dir.display()));
            }
        }
    }

    Ok(())
}
