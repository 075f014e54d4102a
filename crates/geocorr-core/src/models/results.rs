//! Derived relation tables produced by registration and merging.
//!
//! Cardinality: a survey line registers against zero or many holes and a hole
//! registers against zero or many lines, so [`RegistrationRecord`] is keyed by
//! the `(line_id, hole_id)` pair. A registration expands into one
//! [`MergedResult`] per overlapping interval, and each merged result expands
//! into one [`LabMergedResult`] per matched lab record (or a single unmatched
//! row).

use crate::classify::SoilGroup;
use crate::models::borehole::DepthInterval;
use crate::models::lab::{LabRecord, TestType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the foot of a borehole's projection falls relative to the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPosition {
    BeforeStart,
    WithinLine,
    AfterEnd,
}

impl MatchPosition {
    pub fn is_extrapolated(&self) -> bool {
        !matches!(self, MatchPosition::WithinLine)
    }
}

impl fmt::Display for MatchPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchPosition::BeforeStart => "before-start",
            MatchPosition::WithinLine => "within-line",
            MatchPosition::AfterEnd => "after-end",
        };
        f.write_str(name)
    }
}

/// An accepted line/borehole spatial match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub line_id: String,
    pub hole_id: String,

    /// Tangential chainage of the projection; negative or beyond the line
    /// length for extrapolated positions
    pub chainage: f64,

    /// Signed perpendicular offset, positive to the left of the line direction
    pub offset: f64,

    pub position: MatchPosition,

    /// Distance past the nearest endpoint along the line direction; zero
    /// within the line
    pub overrun: f64,
}

/// A registration joined with one overlapping consistency interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub line_id: String,
    pub hole_id: String,
    pub chainage: f64,
    pub offset: f64,
    pub position: MatchPosition,
    pub depth_from: f64,
    pub depth_to: f64,
    pub top_rl: f64,
    pub bottom_rl: f64,
    pub consistency: String,
    pub geology: Option<String>,
    pub soil_group: SoilGroup,
    pub consistency_rank: usize,

    /// Velocity layers behind the statistics
    pub sample_count: usize,
    pub velocity_mean: f64,
    pub velocity_median: f64,
    pub velocity_std: Option<f64>,

    /// Aggregation weight; below 1 for down-weighted extrapolated matches
    pub weight: f64,
}

impl MergedResult {
    /// The borehole interval this row was merged from
    pub fn interval(&self) -> DepthInterval {
        DepthInterval {
            depth_from: self.depth_from,
            depth_to: self.depth_to,
            consistency: self.consistency.clone(),
            geology: self.geology.clone(),
        }
    }
}

/// A merged result with its matched lab record, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabMergedResult {
    pub line_id: String,
    pub hole_id: String,
    pub chainage: f64,
    pub offset: f64,
    pub position: MatchPosition,
    pub depth_from: f64,
    pub depth_to: f64,
    pub consistency: String,
    pub geology: Option<String>,
    pub soil_group: SoilGroup,
    pub consistency_rank: usize,
    pub velocity_mean: f64,
    pub velocity_median: f64,
    pub velocity_std: Option<f64>,
    pub weight: f64,
    pub lab_matched: bool,
    pub test_type: Option<TestType>,
    pub lab_depth: Option<f64>,
    pub lab_value: Option<f64>,
}

impl LabMergedResult {
    pub fn new(merged: &MergedResult, lab: Option<&LabRecord>) -> Self {
        Self {
            line_id: merged.line_id.clone(),
            hole_id: merged.hole_id.clone(),
            chainage: merged.chainage,
            offset: merged.offset,
            position: merged.position,
            depth_from: merged.depth_from,
            depth_to: merged.depth_to,
            consistency: merged.consistency.clone(),
            geology: merged.geology.clone(),
            soil_group: merged.soil_group,
            consistency_rank: merged.consistency_rank,
            velocity_mean: merged.velocity_mean,
            velocity_median: merged.velocity_median,
            velocity_std: merged.velocity_std,
            weight: merged.weight,
            lab_matched: lab.is_some(),
            test_type: lab.map(|l| l.test_type),
            lab_depth: lab.map(|l| l.depth),
            lab_value: lab.map(|l| l.value),
        }
    }
}

/// Match statistics for one merge stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
}

impl StageCounts {
    pub fn unmatched_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.unmatched as f64 / self.total as f64
        }
    }
}

/// Non-fatal warning attached to a run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub stage: String,
    pub ratio: f64,
    pub unmatched: usize,
    pub total: usize,
    pub suggestion: String,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} of {} unmatched ({:.0}%). {}",
            self.stage,
            self.unmatched,
            self.total,
            self.ratio * 100.0,
            self.suggestion
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_position_serializes_kebab_case() {
        let json = serde_json::to_string(&MatchPosition::BeforeStart).unwrap();
        assert_eq!(json, "\"before-start\"");
        assert_eq!(MatchPosition::AfterEnd.to_string(), "after-end");
        assert!(!MatchPosition::WithinLine.is_extrapolated());
    }

    #[test]
    fn test_unmatched_ratio() {
        let counts = StageCounts { total: 10, matched: 6, unmatched: 4 };
        assert!((counts.unmatched_ratio() - 0.4).abs() < 1e-12);
        assert_eq!(StageCounts::default().unmatched_ratio(), 0.0);
    }
}
