//! Data quality checks on merge stage counts.

use geocorr_core::models::{DataQualityWarning, StageCounts};

/// Unmatched share above which a stage is flagged
pub const WARNING_RATIO: f64 = 0.3;

pub const CONSISTENCY_STAGE: &str = "consistency_merge";
pub const LAB_STAGE: &str = "lab_merge";

/// Warn when more than [`WARNING_RATIO`] of a stage's records went unmatched
pub fn check_quality(stage: &str, counts: &StageCounts) -> Option<DataQualityWarning> {
    let ratio = counts.unmatched_ratio();
    if ratio <= WARNING_RATIO {
        return None;
    }

    let suggestion = match stage {
        CONSISTENCY_STAGE => {
            "Consider widening chainage_range, or check that borehole collars and survey elevations share a datum."
        }
        LAB_STAGE => "Consider widening lab_depth_tolerance, or check that lab hole IDs match the borehole table.",
        _ => "Consider widening the matching thresholds.",
    };

    let warning = DataQualityWarning {
        stage: stage.to_string(),
        ratio,
        unmatched: counts.unmatched,
        total: counts.total,
        suggestion: suggestion.to_string(),
    };
    tracing::warn!("{}", warning);
    Some(warning)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_exclusive() {
        let at_limit = StageCounts { total: 10, matched: 7, unmatched: 3 };
        assert!(check_quality(CONSISTENCY_STAGE, &at_limit).is_none());

        let over = StageCounts { total: 10, matched: 6, unmatched: 4 };
        let warning = check_quality(LAB_STAGE, &over).unwrap();
        assert_eq!(warning.stage, LAB_STAGE);
        assert!((warning.ratio - 0.4).abs() < 1e-12);
        assert!(warning.suggestion.contains("lab_depth_tolerance"));
    }

    #[test]
    fn test_empty_stage_is_quiet() {
        assert!(check_quality(CONSISTENCY_STAGE, &StageCounts::default()).is_none());
    }
}
