//! Pipeline context and stage orchestration.
//!
//! A [`PipelineContext`] is immutable: every stage takes the context by value
//! and hands back a new one carrying its output. Stage outputs are cached
//! under a fingerprint of the stage name, the digests of the input tables it
//! reads and the full parameter set, so rerunning with unchanged inputs and
//! parameters reads everything back instead of recomputing.
//!
//! CPU-bound work (table parsing, per-line registration, the merges) runs on
//! the blocking pool, bounded by the worker semaphore and a per-task timeout.

use crate::consistency::{merge_consistency, ConsistencyMerge};
use crate::lab::{merge_lab, LabMerge};
use crate::quality::{check_quality, CONSISTENCY_STAGE, LAB_STAGE};
use crate::stats::ConsistencyVelocity;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use geocorr_core::config::PipelineSettings;
use geocorr_core::error::{GeocorrError, Result};
use geocorr_core::models::{
    DataQualityWarning, Dataset, LabMergedResult, MatchThresholds, MergedResult, ParsedTable,
    PipelineParams, RegistrationRecord, StageCounts, SurveyLine,
};
use geocorr_core::schema::TablePurpose;
use geocorr_core::table::{ContentDigest, RawTable};
use geocorr_geo::{register_line, BoreholeIndex};
use geocorr_store::{CacheKey, CacheReport, CacheService, Computed, Fingerprint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

const REGISTER_STAGE: &str = "register";

/// A raw table handed to the pipeline together with its declared purpose
#[derive(Debug, Clone)]
pub struct InputTable {
    pub purpose: TablePurpose,
    pub table: RawTable,
}

impl InputTable {
    pub fn new(purpose: TablePurpose, table: RawTable) -> Self {
        Self { purpose, table }
    }
}

/// An input table that could not be parsed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFailure {
    pub input: String,
    pub purpose: TablePurpose,
    pub error: String,
}

/// A loaded input table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSummary {
    pub name: String,
    pub purpose: TablePurpose,
    pub digest: String,
    pub rows: usize,

    /// Lines, boreholes or lab records parsed from the table
    pub items: usize,
}

/// A survey line left out of registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub line_id: String,
    pub reason: String,
}

/// Cached output of the registration stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationOutput {
    pub records: Vec<RegistrationRecord>,
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug, Clone)]
struct LoadedInput {
    summary: InputSummary,
    digest: ContentDigest,
}

/// State of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    params: Arc<PipelineParams>,
    inputs: Arc<Vec<LoadedInput>>,
    failures: Arc<Vec<InputFailure>>,
    dataset: Arc<Dataset>,
    registration: Arc<RegistrationOutput>,
    consistency: Arc<ConsistencyMerge>,
    lab: Arc<LabMerge>,
    warnings: Arc<Vec<DataQualityWarning>>,
}

impl PipelineContext {
    /// Start a run; parameters are validated here, before any stage
    pub fn new(params: PipelineParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            params: Arc::new(params),
            inputs: Arc::new(Vec::new()),
            failures: Arc::new(Vec::new()),
            dataset: Arc::new(Dataset::default()),
            registration: Arc::new(RegistrationOutput::default()),
            consistency: Arc::new(ConsistencyMerge::default()),
            lab: Arc::new(LabMerge::default()),
            warnings: Arc::new(Vec::new()),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn inputs(&self) -> Vec<InputSummary> {
        self.inputs.iter().map(|i| i.summary.clone()).collect()
    }

    pub fn failures(&self) -> &[InputFailure] {
        &self.failures
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn registrations(&self) -> &[RegistrationRecord] {
        &self.registration.records
    }

    pub fn skipped_lines(&self) -> &[SkippedLine] {
        &self.registration.skipped
    }

    pub fn merged(&self) -> &[MergedResult] {
        &self.consistency.results
    }

    pub fn consistency_summary(&self) -> &[ConsistencyVelocity] {
        &self.consistency.summary
    }

    pub fn lab_merged(&self) -> &[LabMergedResult] {
        &self.lab.results
    }

    pub fn consistency_counts(&self) -> StageCounts {
        self.consistency.counts
    }

    pub fn lab_counts(&self) -> StageCounts {
        self.lab.counts
    }

    pub fn unknown_labels(&self) -> &[String] {
        &self.consistency.unknown_labels
    }

    pub fn warnings(&self) -> &[DataQualityWarning] {
        &self.warnings
    }

    /// Cache key for a stage reading the loaded tables of `purposes`
    fn stage_key(&self, stage: &str, purposes: &[TablePurpose]) -> Result<CacheKey> {
        let relevant: Vec<&LoadedInput> =
            self.inputs.iter().filter(|i| purposes.contains(&i.summary.purpose)).collect();
        let names: Vec<&str> = relevant.iter().map(|i| i.summary.name.as_str()).collect();

        Ok(Fingerprint::stage(stage)
            .inputs(relevant.iter().copied().map(|i| &i.digest))
            .params("tables", &names)?
            .params("pipeline", self.params.as_ref())?
            .finish())
    }

    fn with_warning(&self, warning: Option<DataQualityWarning>) -> Arc<Vec<DataQualityWarning>> {
        match warning {
            Some(warning) => {
                let mut warnings = self.warnings.as_ref().clone();
                warnings.push(warning);
                Arc::new(warnings)
            }
            None => Arc::clone(&self.warnings),
        }
    }
}

/// JSON-serializable outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub params: PipelineParams,
    pub inputs: Vec<InputSummary>,
    pub failures: Vec<InputFailure>,
    pub skipped_lines: Vec<SkippedLine>,
    pub lines: usize,
    pub boreholes: usize,
    pub registrations: usize,
    pub consistency_counts: StageCounts,
    pub excluded_extrapolated: usize,
    pub lab_counts: StageCounts,
    pub unknown_labels: Vec<String>,
    pub warnings: Vec<DataQualityWarning>,
    pub cache: CacheReport,
}

/// Runs pipeline stages against a shared cache
pub struct Pipeline {
    cache: Arc<CacheService>,
    settings: PipelineSettings,
    workers: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(cache: Arc<CacheService>, settings: PipelineSettings) -> Self {
        let workers = Arc::new(Semaphore::new(settings.workers.max(1)));
        Self { cache, settings, workers }
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run every stage in order
    pub async fn run(&self, params: PipelineParams, inputs: Vec<InputTable>) -> Result<PipelineContext> {
        let context = PipelineContext::new(params)?;
        tracing::info!("Starting run {}", context.run_id);

        let context = self.load(context, inputs).await?;
        let context = self.register(context).await?;
        let context = self.merge_consistency(context).await?;
        self.merge_lab(context).await
    }

    /// Parse every input table concurrently.
    ///
    /// A table that fails to parse is recorded as an [`InputFailure`] and the
    /// run continues with the others.
    pub async fn load(&self, context: PipelineContext, inputs: Vec<InputTable>) -> Result<PipelineContext> {
        let started = Instant::now();
        let params = Arc::clone(&context.params);

        let outcomes = join_all(inputs.into_iter().map(|input| {
            let params = Arc::clone(&params);
            async move {
                let outcome = self.parse_input(&input, &params).await;
                (input, outcome)
            }
        }))
        .await;

        let mut loaded = context.inputs.as_ref().clone();
        let mut failures = context.failures.as_ref().clone();
        let mut dataset = context.dataset.as_ref().clone();

        for (input, outcome) in outcomes {
            match outcome {
                Ok(parsed) => {
                    let digest = input.table.content_digest();
                    loaded.push(LoadedInput {
                        summary: InputSummary {
                            name: input.table.name.clone(),
                            purpose: input.purpose,
                            digest: digest.to_string(),
                            rows: input.table.len(),
                            items: parsed.len(),
                        },
                        digest,
                    });
                    dataset.absorb(parsed);
                }
                Err(e) => {
                    tracing::warn!("Skipping {} table '{}': {}", input.purpose, input.table.name, e);
                    failures.push(InputFailure {
                        input: input.table.name.clone(),
                        purpose: input.purpose,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Loaded {} table(s) in {:.2?}: {} line(s), {} borehole(s), {} lab record(s), {} failed",
            loaded.len(),
            started.elapsed(),
            dataset.lines.len(),
            dataset.boreholes.len(),
            dataset.lab.len(),
            failures.len()
        );

        Ok(PipelineContext {
            inputs: Arc::new(loaded),
            failures: Arc::new(failures),
            dataset: Arc::new(dataset),
            ..context
        })
    }

    async fn parse_input(&self, input: &InputTable, params: &PipelineParams) -> Result<ParsedTable> {
        let key = Fingerprint::stage(&format!("parse:{}", input.purpose.name()))
            .input(&input.table.content_digest())
            .params("table", &input.table.name)?
            .params("pipeline", params)?
            .finish();

        let purpose = input.purpose;
        let table = input.table.clone();
        let interval = params.velocity_interval;
        let task = format!("parse {}", input.table.name);

        self.cache
            .get_or_compute(&key, || {
                self.blocking(&task, move || ParsedTable::parse(purpose, &table, interval))
            })
            .await
    }

    /// Register every survey line against the borehole index.
    ///
    /// A line that fails is skipped and reported while the other lines keep
    /// their registrations. Degenerate geometry is a property of the input and
    /// the output is cached as usual; after a timed-out or failed line the
    /// output is used for this run only and never cached.
    pub async fn register(&self, context: PipelineContext) -> Result<PipelineContext> {
        let started = Instant::now();
        let key = context.stage_key(
            REGISTER_STAGE,
            &[TablePurpose::Geophysics, TablePurpose::BoreholeInterpretation],
        )?;

        let dataset = Arc::clone(&context.dataset);
        let thresholds = context.params.thresholds();
        let registration: RegistrationOutput = self
            .cache
            .get_or_compute_partial(&key, move || async move { Ok(self.register_lines(dataset, thresholds).await) })
            .await?;

        tracing::info!(
            "Registered {} borehole match(es) in {:.2?} ({} line(s) skipped)",
            registration.records.len(),
            started.elapsed(),
            registration.skipped.len()
        );

        Ok(PipelineContext { registration: Arc::new(registration), ..context })
    }

    async fn register_lines(&self, dataset: Arc<Dataset>, thresholds: MatchThresholds) -> Computed<RegistrationOutput> {
        let index = BoreholeIndex::from_boreholes(dataset.boreholes.values());
        self.register_lines_with(dataset, move |line| register_line(line, &index, &thresholds)).await
    }

    async fn register_lines_with<F>(&self, dataset: Arc<Dataset>, register: F) -> Computed<RegistrationOutput>
    where
        F: Fn(&SurveyLine) -> Result<Vec<RegistrationRecord>> + Send + Sync + 'static,
    {
        let register = Arc::new(register);
        let outcomes = join_all(dataset.lines.keys().map(|line_id| {
            let dataset = Arc::clone(&dataset);
            let register = Arc::clone(&register);
            let id = line_id.clone();
            let task = format!("register line {}", line_id);
            async move {
                let outcome = self
                    .blocking(&task, move || match dataset.line(&id) {
                        Some(line) => (*register)(line),
                        None => Ok(Vec::new()),
                    })
                    .await;
                (line_id, outcome)
            }
        }))
        .await;

        let mut output = RegistrationOutput::default();
        let mut complete = true;
        for (line_id, outcome) in outcomes {
            match outcome {
                Ok(records) => output.records.extend(records),
                Err(e) => {
                    if matches!(e, GeocorrError::DegenerateGeometry { .. }) {
                        tracing::warn!("Skipping line '{}': {}", line_id, e);
                    } else {
                        tracing::error!("Line '{}' failed, registration will not be cached: {}", line_id, e);
                        complete = false;
                    }
                    output.skipped.push(SkippedLine { line_id: line_id.clone(), reason: e.to_string() });
                }
            }
        }

        geocorr_geo::matcher::sort_records(&mut output.records);
        if complete {
            Computed::Complete(output)
        } else {
            Computed::Partial(output)
        }
    }

    /// Stage A: registrations joined with borehole consistency intervals
    pub async fn merge_consistency(&self, context: PipelineContext) -> Result<PipelineContext> {
        let key = context.stage_key(
            CONSISTENCY_STAGE,
            &[TablePurpose::Geophysics, TablePurpose::BoreholeInterpretation],
        )?;

        let registration = Arc::clone(&context.registration);
        let dataset = Arc::clone(&context.dataset);
        let params = Arc::clone(&context.params);
        let merge: ConsistencyMerge = self
            .cache
            .get_or_compute(&key, || {
                self.blocking(CONSISTENCY_STAGE, move || {
                    Ok(merge_consistency(&registration.records, &dataset, &params))
                })
            })
            .await?;

        tracing::info!(
            "Consistency merge: {} row(s), {} of {} registration(s) unmatched",
            merge.results.len(),
            merge.counts.unmatched,
            merge.counts.total
        );
        for label in &merge.unknown_labels {
            tracing::warn!("Unknown consistency label '{}' ranked after the known categories", label);
        }

        let warnings = context.with_warning(check_quality(CONSISTENCY_STAGE, &merge.counts));
        Ok(PipelineContext { consistency: Arc::new(merge), warnings, ..context })
    }

    /// Stage B: merged results joined with lab records
    pub async fn merge_lab(&self, context: PipelineContext) -> Result<PipelineContext> {
        let key = context.stage_key(
            LAB_STAGE,
            &[TablePurpose::Geophysics, TablePurpose::BoreholeInterpretation, TablePurpose::LabSummary],
        )?;

        let consistency = Arc::clone(&context.consistency);
        let dataset = Arc::clone(&context.dataset);
        let tolerance = context.params.lab_depth_tolerance;
        let merge: LabMerge = self
            .cache
            .get_or_compute(&key, || {
                self.blocking(LAB_STAGE, move || Ok(merge_lab(&consistency.results, &dataset.lab, tolerance)))
            })
            .await?;

        tracing::info!(
            "Lab merge: {} row(s), {} of {} lab record(s) unmatched",
            merge.results.len(),
            merge.counts.unmatched,
            merge.counts.total
        );

        let warnings = context.with_warning(check_quality(LAB_STAGE, &merge.counts));
        Ok(PipelineContext { lab: Arc::new(merge), warnings, ..context })
    }

    /// Summarize a finished run, including the current cache counters
    pub async fn summary(&self, context: &PipelineContext) -> RunSummary {
        RunSummary {
            run_id: context.run_id,
            started_at: context.started_at,
            finished_at: Utc::now(),
            params: context.params.as_ref().clone(),
            inputs: context.inputs(),
            failures: context.failures.as_ref().clone(),
            skipped_lines: context.registration.skipped.clone(),
            lines: context.dataset.lines.len(),
            boreholes: context.dataset.boreholes.len(),
            registrations: context.registration.records.len(),
            consistency_counts: context.consistency.counts,
            excluded_extrapolated: context.consistency.excluded,
            lab_counts: context.lab.counts,
            unknown_labels: context.consistency.unknown_labels.clone(),
            warnings: context.warnings.as_ref().clone(),
            cache: self.cache.report().await,
        }
    }

    /// Run `work` on the blocking pool under a worker permit and the stage timeout.
    ///
    /// The permit moves into the blocking task, so a task that outlives its
    /// timeout keeps its worker slot until it actually finishes.
    async fn blocking<T, F>(&self, task: &str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.workers).acquire_owned().await.map_err(|e| {
            GeocorrError::TaskFailed { task: task.to_string(), reason: e.to_string() }
        })?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        });
        match tokio::time::timeout(self.settings.stage_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(GeocorrError::TaskFailed { task: task.to_string(), reason: e.to_string() }),
            Err(_) => Err(GeocorrError::Timeout {
                stage: task.to_string(),
                seconds: self.settings.stage_timeout.as_secs(),
            }),
        }
    }
}
