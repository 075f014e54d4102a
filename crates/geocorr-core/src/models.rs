pub mod borehole;
pub mod dataset;
pub mod lab;
pub mod params;
pub mod results;
pub mod survey;

pub use borehole::{Borehole, DepthInterval};
pub use dataset::{Dataset, ParsedTable};
pub use lab::{LabRecord, TestType};
pub use params::{ExtrapolationPolicy, MatchThresholds, PipelineParams};
pub use results::{
    DataQualityWarning, LabMergedResult, MatchPosition, MergedResult, RegistrationRecord,
    StageCounts,
};
pub use survey::{Layer, Sample, SurveyLine, Vertex};
