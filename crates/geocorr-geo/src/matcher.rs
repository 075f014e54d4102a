//! Spatial matching of boreholes to survey lines.

use crate::index::BoreholeIndex;
use crate::projection::{Projection, Projector};
use geocorr_core::models::{MatchPosition, MatchThresholds, RegistrationRecord, SurveyLine};
use geocorr_core::{GeocorrError, Result};

/// Slack on the candidate box so holes exactly on the threshold are not lost
const PREFILTER_SLACK: f64 = 1e-6;

/// Whether a projection passes the match thresholds.
///
/// Holes beside the line are limited by lateral offset only; holes beyond an
/// end must also lie within the tangent threshold of that end.
pub fn accept(projection: &Projection, thresholds: &MatchThresholds) -> bool {
    if projection.offset.abs() > thresholds.perpendicular {
        return false;
    }
    match projection.position {
        MatchPosition::WithinLine => true,
        MatchPosition::BeforeStart | MatchPosition::AfterEnd => {
            projection.overrun.abs() <= thresholds.tangent
        }
    }
}

/// Register one line against every borehole in the index.
///
/// Records are sorted by hole ID.
pub fn register_line(
    line: &SurveyLine,
    index: &BoreholeIndex,
    thresholds: &MatchThresholds,
) -> Result<Vec<RegistrationRecord>> {
    let projector = Projector::from_survey_line(line)?;

    let candidates = match projector.bounding_rect() {
        Some(rect) => index.query_around(&rect, thresholds.perpendicular + PREFILTER_SLACK),
        None => Vec::new(),
    };

    let mut records: Vec<RegistrationRecord> = candidates
        .into_iter()
        .filter_map(|hole| {
            let projection = projector.project(hole.location);
            accept(&projection, thresholds).then(|| RegistrationRecord {
                line_id: line.id().to_string(),
                hole_id: hole.hole_id.clone(),
                chainage: projection.chainage,
                offset: projection.offset,
                position: projection.position,
                overrun: projection.overrun,
            })
        })
        .collect();

    records.sort_by(|a, b| a.hole_id.cmp(&b.hole_id));

    tracing::debug!(
        "Line '{}' ({:.1} m): {} borehole(s) registered",
        line.id(),
        projector.length(),
        records.len()
    );

    Ok(records)
}

/// Registration output for a set of lines
#[derive(Debug, Default)]
pub struct Registration {
    /// Accepted records sorted by `(line_id, hole_id)`
    pub records: Vec<RegistrationRecord>,

    /// Lines that could not be registered
    pub failures: Vec<(String, GeocorrError)>,
}

/// Register every line; a degenerate line is reported and skipped
pub fn register_all<'a, I>(lines: I, index: &BoreholeIndex, thresholds: &MatchThresholds) -> Registration
where
    I: IntoIterator<Item = &'a SurveyLine>,
{
    let mut registration = Registration::default();

    for line in lines {
        match register_line(line, index, thresholds) {
            Ok(records) => registration.records.extend(records),
            Err(e) => {
                tracing::warn!("Skipping line '{}': {}", line.id(), e);
                registration.failures.push((line.id().to_string(), e));
            }
        }
    }

    sort_records(&mut registration.records);
    registration
}

/// Sort registrations into their canonical `(line_id, hole_id)` order
pub fn sort_records(records: &mut [RegistrationRecord]) {
    records.sort_by(|a, b| a.line_id.cmp(&b.line_id).then_with(|| a.hole_id.cmp(&b.hole_id)));
}
