//! Laboratory test records.

use crate::error::{GeocorrError, Result};
use crate::schema::{normalize_header, CanonicalField, CanonicalTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported laboratory tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestType {
    /// Unconfined compressive strength
    #[serde(rename = "UCS")]
    Ucs,
    /// Standard penetration test blow count
    #[serde(rename = "SPT_N")]
    SptN,
    #[serde(rename = "LL")]
    LiquidLimit,
    #[serde(rename = "PL")]
    PlasticLimit,
    #[serde(rename = "PI")]
    PlasticityIndex,
}

impl TestType {
    pub const ALL: [TestType; 5] = [
        TestType::Ucs,
        TestType::SptN,
        TestType::LiquidLimit,
        TestType::PlasticLimit,
        TestType::PlasticityIndex,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            TestType::Ucs => "UCS",
            TestType::SptN => "SPT_N",
            TestType::LiquidLimit => "LL",
            TestType::PlasticLimit => "PL",
            TestType::PlasticityIndex => "PI",
        }
    }

    /// The wide-format column carrying this test
    pub fn field(&self) -> CanonicalField {
        match self {
            TestType::Ucs => CanonicalField::Ucs,
            TestType::SptN => CanonicalField::SptN,
            TestType::LiquidLimit => CanonicalField::LiquidLimit,
            TestType::PlasticLimit => CanonicalField::PlasticLimit,
            TestType::PlasticityIndex => CanonicalField::PlasticityIndex,
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TestType {
    type Err = String;

    /// Accepts the test codes and any header alias of the matching wide column
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = normalize_header(s);
        TestType::ALL
            .into_iter()
            .find(|t| normalize_header(t.code()) == normalized || t.field().matches(s))
            .ok_or_else(|| format!("unknown test type '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabRecord {
    pub hole_id: String,
    pub depth: f64,
    pub test_type: TestType,
    pub value: f64,
}

/// Parse a canonical lab table in long (`test_type` + `value`) or wide
/// (one column per test) form. Wide rows produce one record per filled cell.
pub fn lab_records_from_table(table: &CanonicalTable) -> Result<Vec<LabRecord>> {
    let long_form = table.has(CanonicalField::TestType) && table.has(CanonicalField::Value);
    let wide_tests: Vec<TestType> =
        TestType::ALL.into_iter().filter(|t| table.has(t.field())).collect();

    if !long_form && wide_tests.is_empty() {
        return Err(GeocorrError::Schema {
            table: table.name.clone(),
            field: CanonicalField::TestType.name().to_string(),
        });
    }

    let mut records = Vec::new();
    for row in 0..table.len() {
        let hole_id = table.require_text(row, CanonicalField::HoleId)?;
        let depth = table.require_number(row, CanonicalField::Depth)?;

        if long_form {
            if let Some(text) = table.text(row, CanonicalField::TestType) {
                let test_type = text
                    .parse::<TestType>()
                    .map_err(|reason| table.invalid(row, CanonicalField::TestType, &reason))?;
                if let Some(value) = table.number(row, CanonicalField::Value)? {
                    records.push(LabRecord { hole_id: hole_id.to_string(), depth, test_type, value });
                }
            }
        }

        for test_type in &wide_tests {
            if let Some(value) = table.number(row, test_type.field())? {
                records.push(LabRecord {
                    hole_id: hole_id.to_string(),
                    depth,
                    test_type: *test_type,
                    value,
                });
            }
        }
    }

    Ok(records)
}
