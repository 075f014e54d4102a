//! Parsed inputs of one pipeline run.

use crate::error::Result;
use crate::models::borehole::{boreholes_from_table, Borehole};
use crate::models::lab::{lab_records_from_table, LabRecord};
use crate::models::survey::{survey_lines_from_table, SurveyLine};
use crate::schema::{CanonicalTable, TablePurpose};
use crate::table::RawTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The domain content of one input table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum ParsedTable {
    Lines(Vec<SurveyLine>),
    Boreholes(Vec<Borehole>),
    Lab(Vec<LabRecord>),
}

impl ParsedTable {
    /// Map, validate and parse a raw table declared for `purpose`
    pub fn parse(purpose: TablePurpose, raw: &RawTable, velocity_interval: Option<f64>) -> Result<Self> {
        let table = CanonicalTable::from_raw(purpose, raw)?;
        let parsed = match purpose {
            TablePurpose::Geophysics => {
                let lines = survey_lines_from_table(&table)?;
                let lines = match velocity_interval {
                    Some(interval) => lines.iter().map(|l| l.filter_velocity_interval(interval)).collect(),
                    None => lines,
                };
                ParsedTable::Lines(lines)
            }
            TablePurpose::BoreholeInterpretation => {
                ParsedTable::Boreholes(boreholes_from_table(&table)?)
            }
            TablePurpose::LabSummary => ParsedTable::Lab(lab_records_from_table(&table)?),
        };
        Ok(parsed)
    }

    pub fn len(&self) -> usize {
        match self {
            ParsedTable::Lines(items) => items.len(),
            ParsedTable::Boreholes(items) => items.len(),
            ParsedTable::Lab(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All successfully parsed inputs, keyed by their IDs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub lines: BTreeMap<String, SurveyLine>,
    pub boreholes: BTreeMap<String, Borehole>,
    pub lab: Vec<LabRecord>,
}

impl Dataset {
    /// Add a parsed table. Later lines or holes with an existing ID replace
    /// the earlier ones.
    pub fn absorb(&mut self, parsed: ParsedTable) {
        match parsed {
            ParsedTable::Lines(lines) => {
                for line in lines {
                    if self.lines.contains_key(line.id()) {
                        tracing::warn!("Survey line '{}' defined twice; keeping the later table", line.id());
                    }
                    self.lines.insert(line.id().to_string(), line);
                }
            }
            ParsedTable::Boreholes(holes) => {
                for hole in holes {
                    if self.boreholes.contains_key(&hole.id) {
                        tracing::warn!("Borehole '{}' defined twice; keeping the later table", hole.id);
                    }
                    self.boreholes.insert(hole.id.clone(), hole);
                }
            }
            ParsedTable::Lab(records) => self.lab.extend(records),
        }
    }

    pub fn line(&self, id: &str) -> Option<&SurveyLine> {
        self.lines.get(id)
    }

    pub fn borehole(&self, id: &str) -> Option<&Borehole> {
        self.boreholes.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeocorrError;

    fn raw(name: &str, headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            name,
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect(),
        )
    }

    #[test]
    fn test_parse_dispatches_on_purpose() {
        let geo = raw("L1", &["E", "N", "RL", "Velocity"], &[&["0", "0", "10", "200"], &["5", "0", "10", "250"]]);
        let parsed = ParsedTable::parse(TablePurpose::Geophysics, &geo, None).unwrap();
        assert!(matches!(parsed, ParsedTable::Lines(ref l) if l.len() == 1));

        let err = ParsedTable::parse(TablePurpose::BoreholeInterpretation, &geo, None).unwrap_err();
        assert!(matches!(err, GeocorrError::Schema { .. }));
    }

    #[test]
    fn test_velocity_interval_applied() {
        let geo = raw("L1", &["E", "N", "RL", "Velocity"], &[&["0", "0", "10", "200"], &["0", "0", "9", "215"]]);
        let parsed = ParsedTable::parse(TablePurpose::Geophysics, &geo, Some(50.0)).unwrap();
        match parsed {
            ParsedTable::Lines(lines) => assert_eq!(lines[0].vertices().len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_absorb_merges_tables() {
        let mut dataset = Dataset::default();
        let holes = raw(
            "holes",
            &["Hole", "E", "N", "From", "To", "Consistency"],
            &[&["BH1", "0", "0", "0", "1", "F"]],
        );
        dataset.absorb(ParsedTable::parse(TablePurpose::BoreholeInterpretation, &holes, None).unwrap());
        let lab = raw("lab", &["Hole", "Depth", "UCS"], &[&["BH1", "0.5", "100"]]);
        dataset.absorb(ParsedTable::parse(TablePurpose::LabSummary, &lab, None).unwrap());

        assert!(dataset.borehole("BH1").is_some());
        assert_eq!(dataset.lab.len(), 1);
        assert!(dataset.line("L1").is_none());
    }
}
