//! geocorr Merge - Merge engine and pipeline orchestration
//!
//! This crate joins registrations with borehole intervals and lab records,
//! checks data quality, and runs the cached, bounded-concurrency pipeline
//! that ties every stage together.

pub mod consistency;
pub mod lab;
pub mod pipeline;
pub mod quality;
pub mod stats;

pub use consistency::{merge_consistency, ConsistencyMerge};
pub use lab::{merge_lab, LabMerge};
pub use pipeline::{
    InputFailure, InputSummary, InputTable, Pipeline, PipelineContext, RegistrationOutput, RunSummary,
    SkippedLine,
};
pub use quality::{check_quality, WARNING_RATIO};
pub use stats::{summarize_by_consistency, ConsistencyVelocity, VelocityStats};
