//! Boreholes and their interpreted depth intervals.

use crate::error::Result;
use crate::schema::{CanonicalField, CanonicalTable};
use geo::Coord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A logged depth interval (metres below collar)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthInterval {
    pub depth_from: f64,
    pub depth_to: f64,
    pub consistency: String,
    pub geology: Option<String>,
}

impl DepthInterval {
    /// Whether a depth lies inside the interval widened by `tolerance` at both ends
    pub fn contains_depth(&self, depth: f64, tolerance: f64) -> bool {
        depth >= self.depth_from - tolerance && depth <= self.depth_to + tolerance
    }

    /// Reduced-level range `(top, bottom)` for a collar elevation
    pub fn rl_range(&self, collar_rl: f64) -> (f64, f64) {
        (collar_rl - self.depth_from, collar_rl - self.depth_to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Borehole {
    pub id: String,
    pub x: f64,
    pub y: f64,

    /// Ground elevation at the collar, when surveyed
    pub collar_rl: Option<f64>,

    /// Intervals sorted by `depth_from`
    pub intervals: Vec<DepthInterval>,
}

impl Borehole {
    pub fn coord(&self) -> Coord<f64> {
        Coord { x: self.x, y: self.y }
    }
}

/// Group a canonical borehole interpretation table by hole ID.
///
/// Location and collar level come from the first row of each hole.
pub fn boreholes_from_table(table: &CanonicalTable) -> Result<Vec<Borehole>> {
    let mut holes: BTreeMap<String, Borehole> = BTreeMap::new();

    for row in 0..table.len() {
        let hole_id = table.require_text(row, CanonicalField::HoleId)?.to_string();
        let x = table.require_number(row, CanonicalField::Easting)?;
        let y = table.require_number(row, CanonicalField::Northing)?;
        let collar_rl = table.number(row, CanonicalField::CollarRl)?;
        let depth_from = table.require_number(row, CanonicalField::DepthFrom)?;
        let depth_to = table.require_number(row, CanonicalField::DepthTo)?;

        if depth_to < depth_from {
            return Err(table.invalid(
                row,
                CanonicalField::DepthTo,
                &format!("depth_to {} is above depth_from {}", depth_to, depth_from),
            ));
        }

        let interval = DepthInterval {
            depth_from,
            depth_to,
            consistency: table.text(row, CanonicalField::Consistency).unwrap_or_default().to_string(),
            geology: table.text(row, CanonicalField::Geology).map(str::to_string),
        };

        let hole = holes.entry(hole_id.clone()).or_insert_with(|| Borehole {
            id: hole_id.clone(),
            x,
            y,
            collar_rl,
            intervals: Vec::new(),
        });

        if hole.x != x || hole.y != y {
            tracing::warn!(
                "Table '{}': hole {} listed at ({}, {}) and ({}, {}); using the first location",
                table.name,
                hole_id,
                hole.x,
                hole.y,
                x,
                y
            );
        }
        hole.intervals.push(interval);
    }

    let mut boreholes: Vec<Borehole> = holes.into_values().collect();
    for hole in &mut boreholes {
        hole.intervals.sort_by(|a, b| a.depth_from.total_cmp(&b.depth_from));
    }

    Ok(boreholes)
}
