//! Register command implementation

use crate::cli::RegisterArgs;
use crate::commands::{load_config, open_cache};
use crate::inputs::read_tables;
use crate::output::{metres, OutputWriter};
use anyhow::{Context, Result};
use geocorr_core::models::RegistrationRecord;
use geocorr_core::schema::TablePurpose;
use geocorr_core::table::write_csv_file;
use geocorr_merge::{InputFailure, Pipeline, PipelineContext, SkippedLine};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Debug, Serialize)]
struct RegisterOutput<'a> {
    registrations: &'a [RegistrationRecord],
    failures: &'a [InputFailure],
    skipped_lines: &'a [SkippedLine],
}

#[derive(Tabled)]
struct RegistrationRow {
    #[tabled(rename = "Line")]
    line: String,
    #[tabled(rename = "Hole")]
    hole: String,
    #[tabled(rename = "Chainage")]
    chainage: String,
    #[tabled(rename = "Offset")]
    offset: String,
    #[tabled(rename = "Position")]
    position: String,
}

pub async fn execute(args: RegisterArgs, config_file: Option<&Path>, output: &OutputWriter) -> Result<()> {
    let config = load_config(config_file, args.params.overrides()?)?;
    let params = config.params().context("Invalid pipeline parameters")?;
    let settings = config.settings().context("Invalid pipeline settings")?;

    let mut inputs = read_tables(TablePurpose::Geophysics, &args.geophysics)?;
    inputs.extend(read_tables(TablePurpose::BoreholeInterpretation, &args.boreholes)?);

    let cache = open_cache(&settings).await?;
    let pipeline = Pipeline::new(Arc::new(cache), settings);
    let context = PipelineContext::new(params)?;
    let context = pipeline.load(context, inputs).await?;
    let context = pipeline.register(context).await?;

    if let Some(path) = &args.output {
        write_csv_file(context.registrations(), path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    for failure in context.failures() {
        output.error(format!("{} table '{}' skipped: {}", failure.purpose, failure.input, failure.error));
    }
    for skipped in context.skipped_lines() {
        output.warning(format!("Line '{}' skipped: {}", skipped.line_id, skipped.reason));
    }

    if output.is_json() {
        return output.result(RegisterOutput {
            registrations: context.registrations(),
            failures: context.failures(),
            skipped_lines: context.skipped_lines(),
        });
    }

    output.section("Registrations");
    let rows: Vec<RegistrationRow> = context
        .registrations()
        .iter()
        .map(|r| RegistrationRow {
            line: r.line_id.clone(),
            hole: r.hole_id.clone(),
            chainage: metres(r.chainage),
            offset: metres(r.offset),
            position: r.position.to_string(),
        })
        .collect();
    output.table(rows);

    let holes = context.dataset().boreholes.len();
    let registered: std::collections::BTreeSet<&str> =
        context.registrations().iter().map(|r| r.hole_id.as_str()).collect();
    output.kv("Boreholes registered", format!("{} of {}", registered.len(), holes));

    if let Some(path) = &args.output {
        output.success(format!("Wrote {}", path.display()));
    }
    Ok(())
}
