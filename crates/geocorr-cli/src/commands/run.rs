//! Run command implementation

use crate::cli::RunArgs;
use crate::commands::{load_config, open_cache};
use crate::inputs::read_tables;
use crate::output::{metres, OutputWriter};
use anyhow::{Context, Result};
use geocorr_core::models::StageCounts;
use geocorr_core::schema::TablePurpose;
use geocorr_core::table::write_csv_file;
use geocorr_merge::{Pipeline, PipelineContext, RunSummary};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;

#[derive(Debug, Serialize)]
struct RunOutput {
    summary: RunSummary,
    files: Vec<PathBuf>,
}

#[derive(Tabled)]
struct ConsistencyRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Consistency")]
    consistency: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Intervals")]
    intervals: usize,
    #[tabled(rename = "Samples")]
    samples: usize,
    #[tabled(rename = "Mean Vs (m/s)")]
    mean: String,
    #[tabled(rename = "Range (m/s)")]
    range: String,
}

pub async fn execute(args: RunArgs, config_file: Option<&Path>, output: &OutputWriter) -> Result<()> {
    let config = load_config(config_file, args.params.overrides()?)?;
    let params = config.params().context("Invalid pipeline parameters")?;
    let settings = config.settings().context("Invalid pipeline settings")?;

    let mut inputs = read_tables(TablePurpose::Geophysics, &args.inputs.geophysics)?;
    inputs.extend(read_tables(TablePurpose::BoreholeInterpretation, &args.inputs.boreholes)?);
    inputs.extend(read_tables(TablePurpose::LabSummary, &args.inputs.lab)?);

    let cache = open_cache(&settings).await?;
    let pipeline = Pipeline::new(Arc::new(cache), settings);
    let context = pipeline.run(params, inputs).await.context("Pipeline run failed")?;
    let summary = pipeline.summary(&context).await;

    let files = write_outputs(&context, &summary, &args.output)?;

    for failure in &summary.failures {
        output.error(format!("{} table '{}' skipped: {}", failure.purpose, failure.input, failure.error));
    }
    for skipped in &summary.skipped_lines {
        output.warning(format!("Line '{}' skipped: {}", skipped.line_id, skipped.reason));
    }
    for warning in &summary.warnings {
        output.warning(warning);
    }

    if output.is_json() {
        return output.result(RunOutput { summary, files });
    }

    output.section("Inputs");
    output.kv("Survey lines", summary.lines);
    output.kv("Boreholes", summary.boreholes);
    output.kv("Lab records", context.dataset().lab.len());
    if !summary.failures.is_empty() {
        output.kv("Failed tables", summary.failures.len());
    }

    output.section("Registration");
    output.kv("Matches", summary.registrations);

    output.section("Consistency Merge");
    print_counts(output, &summary.consistency_counts, "registrations");
    if summary.excluded_extrapolated > 0 {
        output.kv("Excluded (extrapolated)", summary.excluded_extrapolated);
    }
    if !summary.unknown_labels.is_empty() {
        output.kv("Unknown labels", summary.unknown_labels.join(", "));
    }

    let rows: Vec<ConsistencyRow> = context
        .consistency_summary()
        .iter()
        .map(|c| ConsistencyRow {
            rank: c.consistency_rank,
            consistency: c.consistency.clone(),
            group: c.soil_group.to_string(),
            intervals: c.intervals,
            samples: c.samples,
            mean: format!("{:.0}", c.weighted_mean_velocity),
            range: format!("{:.0} - {:.0}", c.min_velocity, c.max_velocity),
        })
        .collect();
    output.table(rows);

    output.section("Lab Merge");
    print_counts(output, &summary.lab_counts, "lab records");
    output.kv("Lab depth tolerance", metres(summary.params.lab_depth_tolerance));

    output.section("Cache");
    output.kv("Hits", summary.cache.hits());
    output.kv("Computations", summary.cache.computations);
    if summary.cache.corruptions > 0 {
        output.kv("Corrupt entries replaced", summary.cache.corruptions);
    }

    println!();
    output.success(format!("Wrote {} file(s) to {}", files.len(), args.output.display()));
    Ok(())
}

fn print_counts(output: &OutputWriter, counts: &StageCounts, unit: &str) {
    output.kv("Matched", format!("{} of {} {}", counts.matched, counts.total, unit));
    output.kv("Unmatched", format!("{} ({:.0}%)", counts.unmatched, counts.unmatched_ratio() * 100.0));
}

/// Write the result tables and the run summary into `dir`
fn write_outputs(context: &PipelineContext, summary: &RunSummary, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let files = vec![
        dir.join("registrations.csv"),
        dir.join("merged.csv"),
        dir.join("lab_merged.csv"),
        dir.join("consistency_summary.csv"),
        dir.join("summary.json"),
    ];

    write_csv_file(context.registrations(), &files[0])
        .with_context(|| format!("Failed to write {}", files[0].display()))?;
    write_csv_file(context.merged(), &files[1])
        .with_context(|| format!("Failed to write {}", files[1].display()))?;
    write_csv_file(context.lab_merged(), &files[2])
        .with_context(|| format!("Failed to write {}", files[2].display()))?;
    write_csv_file(context.consistency_summary(), &files[3])
        .with_context(|| format!("Failed to write {}", files[3].display()))?;

    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&files[4], json).with_context(|| format!("Failed to write {}", files[4].display()))?;

    tracing::info!("Results written to {}", dir.display());
    Ok(files)
}
