//! Survey lines built from geophysics sample tables.

use crate::error::Result;
use crate::schema::{CanonicalField, CanonicalTable};
use geo::Coord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One geophysics sample: a planar station with the elevation and velocity measured there
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub elevation: f64,
    pub velocity: f64,
}

impl Vertex {
    pub fn coord(&self) -> Coord<f64> {
        Coord { x: self.x, y: self.y }
    }
}

/// A velocity sample positioned along the line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub chainage: f64,
    pub elevation: f64,
    pub velocity: f64,
}

/// Elevation span between two consecutive samples at one station
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub chainage: f64,
    pub top_rl: f64,
    pub bottom_rl: f64,
    pub velocity: f64,
}

impl Layer {
    /// Length of the elevation range shared with `[bottom, top]`; zero or
    /// negative when the ranges only touch or are disjoint
    pub fn overlap(&self, top: f64, bottom: f64) -> f64 {
        self.top_rl.min(top) - self.bottom_rl.max(bottom)
    }
}

/// An ordered geophysics traverse.
///
/// Chainage is the cumulative planar arc length over the vertex sequence.
/// Several samples recorded at one station produce zero-length segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyLine {
    id: String,
    vertices: Vec<Vertex>,
    chainage: Vec<f64>,
}

impl SurveyLine {
    pub fn new(id: impl Into<String>, vertices: Vec<Vertex>) -> Self {
        let mut chainage = Vec::with_capacity(vertices.len());
        let mut total = 0.0;
        for (i, vertex) in vertices.iter().enumerate() {
            if i > 0 {
                let prev = &vertices[i - 1];
                total += (vertex.x - prev.x).hypot(vertex.y - prev.y);
            }
            chainage.push(total);
        }
        Self { id: id.into(), vertices, chainage }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Chainage of every vertex, parallel to [`SurveyLine::vertices`]
    pub fn chainages(&self) -> &[f64] {
        &self.chainage
    }

    /// Total planar length
    pub fn length(&self) -> f64 {
        self.chainage.last().copied().unwrap_or(0.0)
    }

    pub fn coords(&self) -> Vec<Coord<f64>> {
        self.vertices.iter().map(Vertex::coord).collect()
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.vertices.iter().zip(&self.chainage).map(|(v, &chainage)| Sample {
            chainage,
            elevation: v.elevation,
            velocity: v.velocity,
        })
    }

    /// Samples with `|chainage - centre| <= range`
    pub fn samples_within(&self, centre: f64, range: f64) -> Vec<Sample> {
        self.samples().filter(|s| (s.chainage - centre).abs() <= range).collect()
    }

    /// Velocity layers of every station with `|chainage - centre| <= range`.
    ///
    /// At each station the samples are ordered by elevation, highest first,
    /// and each consecutive pair spans one layer carrying the velocity of its
    /// upper sample. Pairs at the same elevation and the lowest sample of a
    /// station produce no layer.
    pub fn layers_within(&self, centre: f64, range: f64) -> Vec<Layer> {
        let window = self.samples_within(centre, range);
        let mut layers = Vec::new();

        let mut start = 0;
        while start < window.len() {
            let chainage = window[start].chainage;
            let end = window[start..]
                .iter()
                .position(|s| s.chainage != chainage)
                .map_or(window.len(), |n| start + n);

            let mut station = window[start..end].to_vec();
            station.sort_by(|a, b| b.elevation.total_cmp(&a.elevation));
            layers.extend(station.windows(2).filter(|pair| pair[0].elevation > pair[1].elevation).map(|pair| {
                Layer {
                    chainage,
                    top_rl: pair[0].elevation,
                    bottom_rl: pair[1].elevation,
                    velocity: pair[0].velocity,
                }
            }));

            start = end;
        }

        layers
    }

    /// Keep only vertices whose velocity is a whole multiple of `interval`.
    ///
    /// Contour-exported sections repeat the same station for every contour
    /// level; this keeps the contour levels and drops the interpolated rows.
    pub fn filter_velocity_interval(&self, interval: f64) -> Self {
        let vertices = self
            .vertices
            .iter()
            .filter(|v| {
                let ratio = v.velocity / interval;
                (ratio - ratio.round()).abs() < 1e-9
            })
            .copied()
            .collect();
        Self::new(self.id.clone(), vertices)
    }
}

/// Build survey lines from a canonical geophysics table.
///
/// Without a `line_id` column the whole table is one line named after the
/// table. A `chainage` column only orders the rows; chainage is always
/// recomputed from the coordinates.
pub fn survey_lines_from_table(table: &CanonicalTable) -> Result<Vec<SurveyLine>> {
    let mut grouped: BTreeMap<String, Vec<(Option<f64>, Vertex)>> = BTreeMap::new();

    for row in 0..table.len() {
        let line_id = match table.text(row, CanonicalField::LineId) {
            Some(id) => id.to_string(),
            None if table.has(CanonicalField::LineId) => {
                return Err(table.invalid(row, CanonicalField::LineId, "value is empty"));
            }
            None => table.name.clone(),
        };

        let vertex = Vertex {
            x: table.require_number(row, CanonicalField::Easting)?,
            y: table.require_number(row, CanonicalField::Northing)?,
            elevation: table.require_number(row, CanonicalField::Elevation)?,
            velocity: table.require_number(row, CanonicalField::Velocity)?,
        };
        let order = table.number(row, CanonicalField::Chainage)?;

        grouped.entry(line_id).or_default().push((order, vertex));
    }

    let lines = grouped
        .into_iter()
        .map(|(id, mut rows)| {
            if rows.iter().all(|(order, _)| order.is_some()) {
                // Stable sort keeps the source order of samples at one station
                rows.sort_by(|a, b| a.0.unwrap_or(0.0).total_cmp(&b.0.unwrap_or(0.0)));
            }
            SurveyLine::new(id, rows.into_iter().map(|(_, v)| v).collect())
        })
        .collect::<Vec<_>>();

    tracing::debug!("Table '{}' produced {} survey line(s)", table.name, lines.len());

    Ok(lines)
}
