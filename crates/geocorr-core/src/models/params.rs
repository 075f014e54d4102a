//! Parameters that shape registration and merging.

use crate::classify::ConsistencyOrder;
use crate::error::{GeocorrError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TANGENT_THRESHOLD: f64 = 5.0;
pub const DEFAULT_PERPENDICULAR_THRESHOLD: f64 = 25.0;
pub const DEFAULT_CHAINAGE_RANGE: f64 = 0.5;
pub const DEFAULT_LAB_DEPTH_TOLERANCE: f64 = 0.1;

/// How registrations beyond the ends of a line take part in aggregation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExtrapolationPolicy {
    /// Treated like within-line matches (weight 1)
    #[default]
    Include,
    /// Kept with a reduced weight in `(0, 1]`
    Downweight { weight: f64 },
    /// Left out of the merge entirely
    Exclude,
}

impl ExtrapolationPolicy {
    /// Weight for a registration; `None` when it is excluded
    pub fn weight(&self, extrapolated: bool) -> Option<f64> {
        match (self, extrapolated) {
            (_, false) => Some(1.0),
            (ExtrapolationPolicy::Include, true) => Some(1.0),
            (ExtrapolationPolicy::Downweight { weight }, true) => Some(*weight),
            (ExtrapolationPolicy::Exclude, true) => None,
        }
    }
}

/// Distance thresholds used by the spatial matcher
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchThresholds {
    /// Maximum overrun past a line end for extrapolated matches
    pub tangent: f64,
    /// Maximum absolute perpendicular offset
    pub perpendicular: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self { tangent: DEFAULT_TANGENT_THRESHOLD, perpendicular: DEFAULT_PERPENDICULAR_THRESHOLD }
    }
}

/// Every parameter that affects pipeline output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    pub tangent_threshold: f64,
    pub perpendicular_threshold: f64,

    /// Half-width of the chainage window read around a registration
    pub chainage_range: f64,

    /// Tolerance on interval boundaries when matching lab depths
    pub lab_depth_tolerance: f64,

    pub extrapolation: ExtrapolationPolicy,

    pub consistency_order: ConsistencyOrder,

    /// Keep only samples whose velocity is a multiple of this interval
    pub velocity_interval: Option<f64>,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            tangent_threshold: DEFAULT_TANGENT_THRESHOLD,
            perpendicular_threshold: DEFAULT_PERPENDICULAR_THRESHOLD,
            chainage_range: DEFAULT_CHAINAGE_RANGE,
            lab_depth_tolerance: DEFAULT_LAB_DEPTH_TOLERANCE,
            extrapolation: ExtrapolationPolicy::default(),
            consistency_order: ConsistencyOrder::default(),
            velocity_interval: None,
        }
    }
}

impl PipelineParams {
    pub fn thresholds(&self) -> MatchThresholds {
        MatchThresholds { tangent: self.tangent_threshold, perpendicular: self.perpendicular_threshold }
    }

    /// Check parameter ranges; run before any stage
    pub fn validate(&self) -> Result<()> {
        non_negative("tangent_threshold", self.tangent_threshold)?;
        non_negative("perpendicular_threshold", self.perpendicular_threshold)?;
        non_negative("lab_depth_tolerance", self.lab_depth_tolerance)?;

        if !(self.chainage_range > 0.0 && self.chainage_range.is_finite()) {
            return Err(invalid("chainage_range", format!("must be > 0, got {}", self.chainage_range)));
        }

        if let ExtrapolationPolicy::Downweight { weight } = self.extrapolation {
            if !(weight > 0.0 && weight <= 1.0) {
                return Err(invalid("extrapolation.weight", format!("must be in (0, 1], got {}", weight)));
            }
        }

        if let Some(interval) = self.velocity_interval {
            if !(interval > 0.0 && interval.is_finite()) {
                return Err(invalid("velocity_interval", format!("must be > 0, got {}", interval)));
            }
        }

        Ok(())
    }
}

fn non_negative(key: &str, value: f64) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(key, format!("must be a non-negative number, got {}", value)))
    }
}

fn invalid(key: &str, reason: String) -> GeocorrError {
    GeocorrError::ConfigInvalid { key: key.to_string(), reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = PipelineParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.thresholds(), MatchThresholds { tangent: 5.0, perpendicular: 25.0 });
        assert_eq!(params.chainage_range, 0.5);
    }

    #[test]
    fn test_validation() {
        let negative = PipelineParams { tangent_threshold: -1.0, ..Default::default() };
        assert!(negative.validate().is_err());

        let zero_range = PipelineParams { chainage_range: 0.0, ..Default::default() };
        assert!(zero_range.validate().is_err());

        let nan = PipelineParams { perpendicular_threshold: f64::NAN, ..Default::default() };
        assert!(nan.validate().is_err());

        let zero_thresholds = PipelineParams {
            tangent_threshold: 0.0,
            perpendicular_threshold: 0.0,
            ..Default::default()
        };
        assert!(zero_thresholds.validate().is_ok());

        let bad_weight = PipelineParams {
            extrapolation: ExtrapolationPolicy::Downweight { weight: 1.5 },
            ..Default::default()
        };
        assert!(bad_weight.validate().is_err());
    }

    #[test]
    fn test_policy_weights() {
        assert_eq!(ExtrapolationPolicy::Include.weight(true), Some(1.0));
        assert_eq!(ExtrapolationPolicy::Downweight { weight: 0.5 }.weight(true), Some(0.5));
        assert_eq!(ExtrapolationPolicy::Downweight { weight: 0.5 }.weight(false), Some(1.0));
        assert_eq!(ExtrapolationPolicy::Exclude.weight(true), None);
    }
}
