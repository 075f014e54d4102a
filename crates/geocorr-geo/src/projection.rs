//! Projection of a point onto a polyline.

use geocorr_core::models::{MatchPosition, SurveyLine};
use geocorr_core::{GeocorrError, Result};
use geo::{BoundingRect, Coord, Line, LineString, Rect};
use serde::{Deserialize, Serialize};

/// Result of projecting a point onto a polyline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Arc length from the line start to the foot of the projection.
    /// Negative before the start, beyond the line length after the end.
    pub chainage: f64,

    /// Distance to the nearest point on the polyline, positive on the left
    /// of the direction of travel
    pub offset: f64,

    pub position: MatchPosition,

    /// Distance along the line direction past the nearest endpoint
    pub overrun: f64,

    /// Index of the vertex starting the winning segment
    pub segment: usize,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    index: usize,
    line: Line<f64>,
    start_chainage: f64,
    length: f64,
}

/// A polyline prepared for repeated projection.
///
/// Zero-length segments (repeated stations) are skipped; a polyline
/// without any segment of positive length is degenerate.
#[derive(Debug, Clone)]
pub struct Projector {
    line_id: String,
    segments: Vec<Segment>,
    length: f64,
}

impl Projector {
    pub fn new(line_id: impl Into<String>, coords: &[Coord<f64>]) -> Result<Self> {
        let line_id = line_id.into();
        if coords.len() < 2 {
            return Err(GeocorrError::DegenerateGeometry {
                line_id,
                reason: format!("{} vertex(es); at least 2 are required", coords.len()),
            });
        }

        let mut segments = Vec::new();
        let mut chainage = 0.0;
        for (index, pair) in coords.windows(2).enumerate() {
            let line = Line::new(pair[0], pair[1]);
            let length = line.dx().hypot(line.dy());
            if length > 0.0 {
                segments.push(Segment { index, line, start_chainage: chainage, length });
            }
            chainage += length;
        }

        if segments.is_empty() {
            return Err(GeocorrError::DegenerateGeometry {
                line_id,
                reason: "every segment has zero length".to_string(),
            });
        }

        Ok(Self { line_id, segments, length: chainage })
    }

    pub fn from_survey_line(line: &SurveyLine) -> Result<Self> {
        Self::new(line.id(), &line.coords())
    }

    pub fn line_id(&self) -> &str {
        &self.line_id
    }

    /// Total planar length
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Bounding rectangle of the polyline
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let mut coords: Vec<Coord<f64>> = self.segments.iter().map(|s| s.line.start).collect();
        if let Some(last) = self.segments.last() {
            coords.push(last.line.end);
        }
        LineString::new(coords).bounding_rect()
    }

    /// Project a point onto the polyline.
    ///
    /// The winning segment is the one with the smallest distance to the
    /// clamped foot; on ties the earlier segment wins.
    pub fn project(&self, point: Coord<f64>) -> Projection {
        let first = 0;
        let last = self.segments.len() - 1;

        let mut best: Option<(usize, f64, f64)> = None;
        for (i, segment) in self.segments.iter().enumerate() {
            let t_raw = segment_parameter(&segment.line, segment.length, point);
            let t = t_raw.clamp(0.0, 1.0);
            let foot = Coord {
                x: segment.line.start.x + t * segment.line.dx(),
                y: segment.line.start.y + t * segment.line.dy(),
            };
            let distance = (point.x - foot.x).hypot(point.y - foot.y);
            if best.map_or(true, |(_, _, d)| distance < d) {
                best = Some((i, t_raw, distance));
            }
        }

        // segments is non-empty, so a winner always exists
        let (winner, t_raw, distance) = best.unwrap_or((first, 0.0, 0.0));
        let segment = &self.segments[winner];

        let (position, t) = if winner == first && t_raw < 0.0 {
            (MatchPosition::BeforeStart, t_raw)
        } else if winner == last && t_raw > 1.0 {
            (MatchPosition::AfterEnd, t_raw)
        } else {
            (MatchPosition::WithinLine, t_raw.clamp(0.0, 1.0))
        };

        let chainage = segment.start_chainage + t * segment.length;
        let overrun = match position {
            MatchPosition::BeforeStart => -chainage,
            MatchPosition::AfterEnd => chainage - self.length,
            MatchPosition::WithinLine => 0.0,
        };

        let cross = segment.line.dx() * (point.y - segment.line.start.y)
            - segment.line.dy() * (point.x - segment.line.start.x);
        let offset = if cross < 0.0 { -distance } else { distance };

        Projection { chainage, offset, position, overrun, segment: segment.index }
    }
}

fn segment_parameter(line: &Line<f64>, length: f64, point: Coord<f64>) -> f64 {
    let along = (point.x - line.start.x) * line.dx() + (point.y - line.start.y) * line.dy();
    along / (length * length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn straight() -> Projector {
        Projector::new("L1", &[c(0.0, 0.0), c(100.0, 0.0)]).unwrap()
    }

    #[test]
    fn test_point_beside_line() {
        let p = straight().project(c(40.0, 10.0));
        assert!((p.chainage - 40.0).abs() < 1e-9);
        assert!((p.offset - 10.0).abs() < 1e-9);
        assert_eq!(p.position, MatchPosition::WithinLine);
        assert_eq!(p.overrun, 0.0);
    }

    #[test]
    fn test_offset_sign_follows_direction() {
        let right = straight().project(c(40.0, -10.0));
        assert!((right.offset + 10.0).abs() < 1e-9);

        let reversed = Projector::new("L1", &[c(100.0, 0.0), c(0.0, 0.0)]).unwrap();
        let p = reversed.project(c(40.0, 10.0));
        assert!((p.chainage - 60.0).abs() < 1e-9);
        assert!((p.offset + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_after_end_extrapolates() {
        let p = straight().project(c(120.0, 5.0));
        assert_eq!(p.position, MatchPosition::AfterEnd);
        assert!((p.chainage - 120.0).abs() < 1e-9);
        assert!((p.overrun - 20.0).abs() < 1e-9);
        assert!((p.offset - 425f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_before_start_is_negative() {
        let p = straight().project(c(-3.0, -4.0));
        assert_eq!(p.position, MatchPosition::BeforeStart);
        assert!((p.chainage + 3.0).abs() < 1e-9);
        assert!((p.overrun - 3.0).abs() < 1e-9);
        assert!((p.offset + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_corner_is_within_line() {
        let projector = Projector::new("L1", &[c(0.0, 0.0), c(10.0, 0.0), c(10.0, 10.0)]).unwrap();
        // outside the corner: nearest point is the shared vertex
        let p = projector.project(c(12.0, -2.0));
        assert_eq!(p.position, MatchPosition::WithinLine);
        assert!((p.chainage - 10.0).abs() < 1e-9);
        assert_eq!(p.segment, 0);

        let p = projector.project(c(9.0, 5.0));
        assert!((p.chainage - 15.0).abs() < 1e-9);
        assert!((p.offset - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_length_segments_skipped() {
        let projector = Projector::new(
            "L1",
            &[c(0.0, 0.0), c(0.0, 0.0), c(10.0, 0.0), c(10.0, 0.0), c(20.0, 0.0)],
        )
        .unwrap();
        assert_eq!(projector.length(), 20.0);

        let p = projector.project(c(15.0, 1.0));
        assert!((p.chainage - 15.0).abs() < 1e-9);
        assert_eq!(p.segment, 3);

        let before = projector.project(c(-2.0, 0.0));
        assert_eq!(before.position, MatchPosition::BeforeStart);
        assert!((before.chainage + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_lines() {
        assert!(matches!(
            Projector::new("L1", &[c(1.0, 1.0)]),
            Err(GeocorrError::DegenerateGeometry { .. })
        ));
        assert!(matches!(
            Projector::new("L1", &[c(1.0, 1.0), c(1.0, 1.0)]),
            Err(GeocorrError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn test_bounding_rect() {
        let rect = Projector::new("L1", &[c(0.0, 5.0), c(10.0, -5.0)]).unwrap().bounding_rect().unwrap();
        assert_eq!(rect.min(), c(0.0, -5.0));
        assert_eq!(rect.max(), c(10.0, 5.0));
    }
}
