//! Stage B: attach lab records to merged results.

use geocorr_core::models::{LabMergedResult, LabRecord, MergedResult, StageCounts};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output of the lab merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabMerge {
    /// One row per (merged result, matched lab record); merged results
    /// without a match appear once with `lab_matched = false`
    pub results: Vec<LabMergedResult>,

    /// `total` counts lab records; `unmatched` those matching no merged
    /// result, which are left out of `results`
    pub counts: StageCounts,
}

/// Match lab records to merged results of the same hole whose depth
/// interval, widened by `tolerance` at both ends, contains the record depth
pub fn merge_lab(merged: &[MergedResult], lab: &[LabRecord], tolerance: f64) -> LabMerge {
    let mut by_hole: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, record) in lab.iter().enumerate() {
        by_hole.entry(record.hole_id.as_str()).or_default().push(i);
    }
    for indices in by_hole.values_mut() {
        indices.sort_by(|&a, &b| {
            lab[a]
                .depth
                .total_cmp(&lab[b].depth)
                .then_with(|| lab[a].test_type.cmp(&lab[b].test_type))
                .then_with(|| lab[a].value.total_cmp(&lab[b].value))
        });
    }

    let mut used = vec![false; lab.len()];
    let mut results = Vec::with_capacity(merged.len());

    for result in merged {
        let candidates = by_hole.get(result.hole_id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let interval = result.interval();
        let mut attached = false;
        for &i in candidates {
            let record = &lab[i];
            if interval.contains_depth(record.depth, tolerance) {
                results.push(LabMergedResult::new(result, Some(record)));
                used[i] = true;
                attached = true;
            }
        }
        if !attached {
            results.push(LabMergedResult::new(result, None));
        }
    }

    let matched = used.iter().filter(|u| **u).count();
    let counts = StageCounts { total: lab.len(), matched, unmatched: lab.len() - matched };

    if counts.unmatched > 0 {
        tracing::debug!("{} of {} lab record(s) matched no merged interval", counts.unmatched, counts.total);
    }

    LabMerge { results, counts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocorr_core::classify::SoilGroup;
    use geocorr_core::models::{MatchPosition, TestType};

    fn merged(hole: &str, from: f64, to: f64, consistency: &str) -> MergedResult {
        MergedResult {
            line_id: "L1".into(),
            hole_id: hole.into(),
            chainage: 40.0,
            offset: 10.0,
            position: MatchPosition::WithinLine,
            depth_from: from,
            depth_to: to,
            top_rl: 100.0 - from,
            bottom_rl: 100.0 - to,
            consistency: consistency.into(),
            geology: None,
            soil_group: SoilGroup::Cohesive,
            consistency_rank: 3,
            sample_count: 2,
            velocity_mean: 500.0,
            velocity_median: 500.0,
            velocity_std: Some(10.0),
            weight: 1.0,
        }
    }

    fn record(hole: &str, depth: f64, test_type: TestType, value: f64) -> LabRecord {
        LabRecord { hole_id: hole.into(), depth, test_type, value }
    }

    #[test]
    fn test_ucs_attached_to_stiff_interval() {
        let merge = merge_lab(
            &[merged("BH1", 2.0, 5.0, "Stiff")],
            &[record("BH1", 3.0, TestType::Ucs, 150.0)],
            0.1,
        );

        assert_eq!(merge.results.len(), 1);
        let row = &merge.results[0];
        assert!(row.lab_matched);
        assert_eq!(row.consistency, "Stiff");
        assert_eq!(row.test_type, Some(TestType::Ucs));
        assert_eq!(row.lab_value, Some(150.0));
        assert_eq!(merge.counts, StageCounts { total: 1, matched: 1, unmatched: 0 });
    }

    #[test]
    fn test_tolerance_at_boundaries() {
        let rows = [merged("BH1", 2.0, 5.0, "St")];
        let lab = [
            record("BH1", 5.08, TestType::SptN, 30.0),
            record("BH1", 1.85, TestType::SptN, 12.0),
        ];

        let merge = merge_lab(&rows, &lab, 0.1);
        assert_eq!(merge.counts.matched, 1);
        assert_eq!(merge.counts.unmatched, 1);
        assert_eq!(merge.results[0].lab_depth, Some(5.08));

        let strict = merge_lab(&rows, &lab, 0.0);
        assert_eq!(strict.counts.matched, 0);
        assert!(!strict.results[0].lab_matched);
    }

    #[test]
    fn test_unmatched_interval_kept_and_records_excluded() {
        let rows = [merged("BH1", 0.0, 2.0, "F"), merged("BH2", 0.0, 2.0, "VSt")];
        let lab = [
            record("BH1", 1.0, TestType::LiquidLimit, 45.0),
            record("BH1", 1.0, TestType::PlasticLimit, 20.0),
            record("BH9", 1.0, TestType::Ucs, 80.0),
        ];

        let merge = merge_lab(&rows, &lab, 0.1);
        assert_eq!(merge.results.len(), 3);
        assert_eq!(merge.results[0].test_type, Some(TestType::LiquidLimit));
        assert_eq!(merge.results[1].test_type, Some(TestType::PlasticLimit));
        assert_eq!(merge.results[2].hole_id, "BH2");
        assert!(!merge.results[2].lab_matched);
        assert!(merge.results.iter().all(|r| r.hole_id != "BH9"));
        assert_eq!(merge.counts, StageCounts { total: 3, matched: 2, unmatched: 1 });
    }

    #[test]
    fn test_record_on_shared_boundary_attaches_to_both() {
        let rows = [merged("BH1", 0.0, 2.0, "F"), merged("BH1", 2.0, 4.0, "St")];
        let merge = merge_lab(&rows, &[record("BH1", 2.0, TestType::Ucs, 90.0)], 0.1);
        assert_eq!(merge.results.iter().filter(|r| r.lab_matched).count(), 2);
        assert_eq!(merge.counts.matched, 1);
    }
}
