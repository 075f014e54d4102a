//! Velocity statistics.

use geocorr_core::classify::SoilGroup;
use geocorr_core::models::MergedResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary statistics over a set of velocity samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,

    /// Sample standard deviation; `None` below two samples
    pub std: Option<f64>,
}

impl VelocityStats {
    /// Statistics over `values`; `None` when empty
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        };

        let std = (count >= 2).then(|| {
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        });

        Some(Self { count, mean, median, std })
    }
}

/// Weighted velocity per consistency category across merged results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyVelocity {
    pub consistency: String,
    pub consistency_rank: usize,
    pub soil_group: SoilGroup,
    pub intervals: usize,
    pub samples: usize,

    /// Mean of interval means, weighted by sample count and registration weight
    pub weighted_mean_velocity: f64,
    pub min_velocity: f64,
    pub max_velocity: f64,
}

/// Aggregate merged results per consistency category, ordered by rank.
///
/// Down-weighted extrapolated registrations contribute proportionally less
/// to the weighted mean.
pub fn summarize_by_consistency(results: &[MergedResult]) -> Vec<ConsistencyVelocity> {
    let mut groups: BTreeMap<(usize, &str), Vec<&MergedResult>> = BTreeMap::new();
    for result in results {
        groups.entry((result.consistency_rank, result.consistency.as_str())).or_default().push(result);
    }

    groups
        .into_iter()
        .map(|((rank, label), members)| {
            let total_weight: f64 = members.iter().map(|m| m.weight * m.sample_count as f64).sum();
            let weighted_sum: f64 =
                members.iter().map(|m| m.weight * m.sample_count as f64 * m.velocity_mean).sum();
            let weighted_mean_velocity = if total_weight > 0.0 {
                weighted_sum / total_weight
            } else {
                members.iter().map(|m| m.velocity_mean).sum::<f64>() / members.len() as f64
            };

            ConsistencyVelocity {
                consistency: label.to_string(),
                consistency_rank: rank,
                soil_group: members[0].soil_group,
                intervals: members.len(),
                samples: members.iter().map(|m| m.sample_count).sum(),
                weighted_mean_velocity,
                min_velocity: members.iter().map(|m| m.velocity_mean).fold(f64::INFINITY, f64::min),
                max_velocity: members.iter().map(|m| m.velocity_mean).fold(f64::NEG_INFINITY, f64::max),
            }
        })
        .collect()
}
