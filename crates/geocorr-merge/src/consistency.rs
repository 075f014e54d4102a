//! Stage A: join registrations with borehole consistency intervals.

use crate::stats::{summarize_by_consistency, ConsistencyVelocity, VelocityStats};
use geocorr_core::classify::ConsistencyClass;
use geocorr_core::models::{Dataset, Layer, MergedResult, PipelineParams, RegistrationRecord, StageCounts};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output of the consistency merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyMerge {
    /// One row per (registration, overlapping interval)
    pub results: Vec<MergedResult>,

    /// `total` counts registrations taking part; `unmatched` those that
    /// produced no row
    pub counts: StageCounts,

    /// Registrations left out by the extrapolation policy
    pub excluded: usize,

    /// Consistency labels outside the known set, in rank order
    pub unknown_labels: Vec<String>,

    pub summary: Vec<ConsistencyVelocity>,
}

/// Merge each registration with the intervals of its borehole.
///
/// The chainage window is centred on the registered chainage clamped to the
/// line, so holes beyond an end read the samples at that end. Without a
/// surveyed collar the highest sample elevation in the window stands in for
/// ground level. Each station in the window contributes layers between its
/// consecutive samples; an interval overlaps a layer when the shared RL range
/// has positive length, and statistics are taken over the velocities of the
/// overlapping layers.
pub fn merge_consistency(
    registrations: &[RegistrationRecord],
    dataset: &Dataset,
    params: &PipelineParams,
) -> ConsistencyMerge {
    let observed = registrations
        .iter()
        .filter_map(|r| dataset.borehole(&r.hole_id))
        .flat_map(|hole| hole.intervals.iter().map(|i| i.consistency.as_str()));
    let arrangement = params.consistency_order.arrange(observed);
    let classes: HashMap<&str, &ConsistencyClass> =
        arrangement.classes.iter().map(|c| (c.label.as_str(), c)).collect();

    let mut merge = ConsistencyMerge { unknown_labels: arrangement.unknown.clone(), ..Default::default() };

    for registration in registrations {
        let Some(weight) = params.extrapolation.weight(registration.position.is_extrapolated()) else {
            merge.excluded += 1;
            continue;
        };
        merge.counts.total += 1;

        let (Some(line), Some(hole)) =
            (dataset.line(&registration.line_id), dataset.borehole(&registration.hole_id))
        else {
            tracing::warn!(
                "Registration {}/{} refers to data that is no longer loaded",
                registration.line_id,
                registration.hole_id
            );
            merge.counts.unmatched += 1;
            continue;
        };

        let centre = registration.chainage.clamp(0.0, line.length());
        let layers: Vec<Layer> = line.layers_within(centre, params.chainage_range);
        if layers.is_empty() {
            tracing::debug!(
                "No velocity layers within {} of chainage {:.2} on line {} for hole {}",
                params.chainage_range,
                centre,
                line.id(),
                hole.id
            );
            merge.counts.unmatched += 1;
            continue;
        }

        let collar_rl = hole
            .collar_rl
            .unwrap_or_else(|| layers.iter().map(|l| l.top_rl).fold(f64::NEG_INFINITY, f64::max));

        let before = merge.results.len();
        for interval in &hole.intervals {
            let (top_rl, bottom_rl) = interval.rl_range(collar_rl);
            let velocities: Vec<f64> = layers
                .iter()
                .filter(|l| l.overlap(top_rl, bottom_rl) > 0.0)
                .map(|l| l.velocity)
                .collect();
            let Some(stats) = VelocityStats::from_values(&velocities) else {
                continue;
            };

            let class = params.consistency_order.classify(&interval.consistency);
            let rank = classes.get(class.label.as_str()).map_or(class.rank, |c| c.rank);

            merge.results.push(MergedResult {
                line_id: registration.line_id.clone(),
                hole_id: registration.hole_id.clone(),
                chainage: registration.chainage,
                offset: registration.offset,
                position: registration.position,
                depth_from: interval.depth_from,
                depth_to: interval.depth_to,
                top_rl,
                bottom_rl,
                consistency: interval.consistency.clone(),
                geology: interval.geology.clone(),
                soil_group: class.group,
                consistency_rank: rank,
                sample_count: stats.count,
                velocity_mean: stats.mean,
                velocity_median: stats.median,
                velocity_std: stats.std,
                weight,
            });
        }

        if merge.results.len() == before {
            merge.counts.unmatched += 1;
        } else {
            merge.counts.matched += 1;
        }
    }

    if merge.excluded > 0 {
        tracing::info!("{} extrapolated registration(s) excluded from the merge", merge.excluded);
    }

    merge.summary = summarize_by_consistency(&merge.results);
    merge
}
