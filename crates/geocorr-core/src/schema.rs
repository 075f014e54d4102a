//! Column mapping from source headers to the canonical schema.
//!
//! Every canonical field owns a fixed list of accepted header spellings.
//! Headers are compared after [`normalize_header`], so `"Depth From (m)"`,
//! `"depth_from_m"` and `"DEPTH FROM M"` are the same header. There is no
//! fuzzy matching: a header either appears in the alias table or it is ignored.

use crate::error::{GeocorrError, Result};
use crate::table::RawTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a raw table is declared to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TablePurpose {
    /// Velocity samples along one or more survey lines
    Geophysics,
    /// Borehole depth intervals with consistency categories
    BoreholeInterpretation,
    /// Laboratory test results
    LabSummary,
}

impl TablePurpose {
    pub fn name(&self) -> &'static str {
        match self {
            TablePurpose::Geophysics => "geophysics",
            TablePurpose::BoreholeInterpretation => "borehole_interpretation",
            TablePurpose::LabSummary => "lab_summary",
        }
    }

    /// Canonical fields for this purpose, with their requirement level
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            TablePurpose::Geophysics => GEOPHYSICS_FIELDS,
            TablePurpose::BoreholeInterpretation => BOREHOLE_FIELDS,
            TablePurpose::LabSummary => LAB_FIELDS,
        }
    }
}

const GEOPHYSICS_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(CanonicalField::Easting),
    FieldSpec::required(CanonicalField::Northing),
    FieldSpec::required(CanonicalField::Elevation),
    FieldSpec::required(CanonicalField::Velocity),
    FieldSpec::optional(CanonicalField::LineId),
    FieldSpec::optional(CanonicalField::Chainage),
];

const BOREHOLE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(CanonicalField::HoleId),
    FieldSpec::required(CanonicalField::Easting),
    FieldSpec::required(CanonicalField::Northing),
    FieldSpec::required(CanonicalField::DepthFrom),
    FieldSpec::required(CanonicalField::DepthTo),
    FieldSpec::required(CanonicalField::Consistency),
    FieldSpec::optional(CanonicalField::Geology),
    FieldSpec::optional(CanonicalField::CollarRl),
];

const LAB_FIELDS: &[FieldSpec] = &[
    FieldSpec::required(CanonicalField::HoleId),
    FieldSpec::required(CanonicalField::Depth),
    FieldSpec::optional(CanonicalField::TestType),
    FieldSpec::optional(CanonicalField::Value),
    FieldSpec::optional(CanonicalField::Ucs),
    FieldSpec::optional(CanonicalField::SptN),
    FieldSpec::optional(CanonicalField::LiquidLimit),
    FieldSpec::optional(CanonicalField::PlasticLimit),
    FieldSpec::optional(CanonicalField::PlasticityIndex),
];

impl fmt::Display for TablePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical field names shared by all input tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    LineId,
    HoleId,
    Easting,
    Northing,
    Elevation,
    Velocity,
    Chainage,
    CollarRl,
    DepthFrom,
    DepthTo,
    Consistency,
    Geology,
    Depth,
    TestType,
    Value,
    Ucs,
    SptN,
    LiquidLimit,
    PlasticLimit,
    PlasticityIndex,
}

impl CanonicalField {
    pub fn name(&self) -> &'static str {
        use CanonicalField::*;
        match self {
            LineId => "line_id",
            HoleId => "hole_id",
            Easting => "easting",
            Northing => "northing",
            Elevation => "elevation",
            Velocity => "velocity",
            Chainage => "chainage",
            CollarRl => "collar_rl",
            DepthFrom => "depth_from",
            DepthTo => "depth_to",
            Consistency => "consistency",
            Geology => "geology",
            Depth => "depth",
            TestType => "test_type",
            Value => "value",
            Ucs => "ucs",
            SptN => "spt_n",
            LiquidLimit => "liquid_limit",
            PlasticLimit => "plastic_limit",
            PlasticityIndex => "plasticity_index",
        }
    }

    /// Accepted source header spellings, before normalization
    pub fn aliases(&self) -> &'static [&'static str] {
        use CanonicalField::*;
        match self {
            LineId => &["line_id", "line", "line id", "geophysics_id", "geophysics id", "survey line", "traverse", "profile"],
            HoleId => &["hole_id", "hole id", "hole", "borehole", "borehole id", "bh", "bh id", "location id", "point id"],
            Easting => &["easting", "east", "x", "e", "easting (m)", "mga easting"],
            Northing => &["northing", "north", "y", "n", "northing (m)", "mga northing"],
            Elevation => &["elevation", "elev", "rl", "reduced level", "from_rl", "from rl", "z", "elevation (m)"],
            Velocity => &["velocity", "vel", "vs", "s-velocity", "shear velocity", "velocity (m/s)", "vs (m/s)", "vp"],
            Chainage => &["chainage", "ch", "station", "distance", "chainage (m)"],
            CollarRl => &["collar_rl", "collar rl", "ground rl", "ground level", "surface rl", "collar elevation"],
            DepthFrom => &["depth_from", "depth from", "from", "top", "top depth", "depth from (m)", "from (m)"],
            DepthTo => &["depth_to", "depth to", "to", "bottom", "base", "bottom depth", "depth to (m)", "to (m)"],
            Consistency => &["consistency", "consistency/density", "density", "strength", "consistency class"],
            Geology => &["geology", "geology_orgin", "geology origin", "geology_origin", "origin", "unit", "geological unit", "lithology"],
            Depth => &["depth", "depth (m)", "sample depth", "test depth", "depth_m", "mid depth"],
            TestType => &["test_type", "test type", "test", "test name", "parameter"],
            Value => &["value", "result", "test value", "reading"],
            Ucs => &["ucs", "ucs (mpa)", "ucs (kpa)", "ucs_mpa", "unconfined compressive strength"],
            SptN => &["spt_n", "spt n", "spt n value", "spt", "n value", "n-value", "spt n-value"],
            LiquidLimit => &["liquid_limit", "liquid limit", "ll", "ll (%)", "wl"],
            PlasticLimit => &["plastic_limit", "plastic limit", "pl", "pl (%)", "wp"],
            PlasticityIndex => &["plasticity_index", "plasticity index", "pi", "pi (%)", "ip"],
        }
    }

    /// Whether a header (in any spelling) is an alias of this field
    pub fn matches(&self, header: &str) -> bool {
        let normalized = normalize_header(header);
        !normalized.is_empty() && self.aliases().iter().any(|a| normalize_header(a) == normalized)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A canonical field and whether a table must provide it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: CanonicalField,
    pub required: bool,
}

impl FieldSpec {
    const fn required(field: CanonicalField) -> Self {
        Self { field, required: true }
    }

    const fn optional(field: CanonicalField) -> Self {
        Self { field, required: false }
    }
}

/// Lowercase and drop everything that is not a letter or digit
pub fn normalize_header(header: &str) -> String {
    header.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

/// Result of mapping a header row onto the canonical fields of a purpose
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    purpose: TablePurpose,
    columns: BTreeMap<CanonicalField, usize>,
}

impl ColumnMapping {
    /// Detect canonical columns in a header row.
    ///
    /// The first header matching a field wins; later duplicates are ignored.
    pub fn detect(purpose: TablePurpose, table: &str, headers: &[String]) -> Result<Self> {
        let mut columns = BTreeMap::new();

        for spec in purpose.fields() {
            let mut found = headers.iter().enumerate().filter(|(_, h)| spec.field.matches(h));

            match found.next() {
                Some((index, _)) => {
                    if let Some((dup, header)) = found.next() {
                        tracing::warn!(
                            "Table '{}': header '{}' (column {}) also maps to '{}', using column {}",
                            table,
                            header,
                            dup,
                            spec.field,
                            index
                        );
                    }
                    columns.insert(spec.field, index);
                }
                None if spec.required => {
                    return Err(GeocorrError::Schema {
                        table: table.to_string(),
                        field: spec.field.name().to_string(),
                    });
                }
                None => {}
            }
        }

        Ok(Self { purpose, columns })
    }

    pub fn purpose(&self) -> TablePurpose {
        self.purpose
    }

    /// Column index of a canonical field, if present
    pub fn index(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    /// Canonical name for a source header; `None` for unmapped columns
    pub fn rename(&self, header: &str) -> Option<&'static str> {
        self.columns.keys().find(|field| field.matches(header)).map(|f| f.name())
    }

    /// Apply the mapping to a raw table
    pub fn apply(&self, table: &RawTable) -> CanonicalTable {
        let columns = self
            .columns
            .iter()
            .map(|(field, &index)| {
                let values = table.rows.iter().map(|row| row.get(index).cloned().unwrap_or_default());
                (*field, values.collect())
            })
            .collect();

        CanonicalTable {
            name: table.name.clone(),
            purpose: self.purpose,
            row_count: table.rows.len(),
            columns,
        }
    }
}

/// A table whose columns are addressed by canonical field
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    pub name: String,
    pub purpose: TablePurpose,
    row_count: usize,
    columns: BTreeMap<CanonicalField, Vec<String>>,
}

impl CanonicalTable {
    /// Map and convert a raw table in one step
    pub fn from_raw(purpose: TablePurpose, table: &RawTable) -> Result<Self> {
        let mapping = ColumnMapping::detect(purpose, &table.name, &table.headers)?;
        Ok(mapping.apply(table))
    }

    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn has(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    /// Canonical header of this table, in field order
    pub fn headers(&self) -> Vec<&'static str> {
        self.columns.keys().map(|f| f.name()).collect()
    }

    /// Raw cell text; `None` when the field is absent or the cell is blank
    pub fn text(&self, row: usize, field: CanonicalField) -> Option<&str> {
        self.columns
            .get(&field)
            .and_then(|col| col.get(row))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Required text cell
    pub fn require_text(&self, row: usize, field: CanonicalField) -> Result<&str> {
        self.text(row, field).ok_or_else(|| self.invalid(row, field, "value is empty"))
    }

    /// Optional numeric cell
    pub fn number(&self, row: usize, field: CanonicalField) -> Result<Option<f64>> {
        match self.text(row, field) {
            None => Ok(None),
            Some(text) => match text.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Some(value)),
                _ => Err(self.invalid(row, field, &format!("'{}' is not a finite number", text))),
            },
        }
    }

    /// Required numeric cell
    pub fn require_number(&self, row: usize, field: CanonicalField) -> Result<f64> {
        self.number(row, field)?.ok_or_else(|| self.invalid(row, field, "value is empty"))
    }

    pub fn invalid(&self, row: usize, field: CanonicalField, reason: &str) -> GeocorrError {
        GeocorrError::InvalidValue {
            table: self.name.clone(),
            // Report 1-based data rows, the way spreadsheets number them below the header
            row: row + 1,
            field: field.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Depth From (m)"), "depthfromm");
        assert_eq!(normalize_header("  hole_ID "), "holeid");
        assert_eq!(normalize_header("S-Velocity"), "svelocity");
        assert_eq!(normalize_header("---"), "");
    }

    #[test]
    fn test_aliases_unique_within_purpose() {
        for purpose in
            [TablePurpose::Geophysics, TablePurpose::BoreholeInterpretation, TablePurpose::LabSummary]
        {
            let mut seen: BTreeMap<String, CanonicalField> = BTreeMap::new();
            for spec in purpose.fields() {
                for alias in spec.field.aliases() {
                    let key = normalize_header(alias);
                    if let Some(other) = seen.insert(key.clone(), spec.field).filter(|f| *f != spec.field) {
                        panic!("alias '{}' shared by {} and {} in {}", key, other, spec.field, purpose);
                    }
                }
            }
        }
    }

    #[test]
    fn test_every_field_accepts_its_canonical_name() {
        for purpose in
            [TablePurpose::Geophysics, TablePurpose::BoreholeInterpretation, TablePurpose::LabSummary]
        {
            for spec in purpose.fields() {
                assert!(spec.field.matches(spec.field.name()), "{} rejects own name", spec.field);
            }
        }
    }

    #[test]
    fn test_borehole_field_variants() {
        let cases: &[(CanonicalField, &[&str])] = &[
            (CanonicalField::HoleId, &["Hole_ID", "Borehole", "BH ID", "hole id"]),
            (CanonicalField::Easting, &["Easting", "EASTING (m)", "X"]),
            (CanonicalField::Northing, &["Northing", "north", "Y"]),
            (CanonicalField::DepthFrom, &["Depth From", "From (m)", "TOP"]),
            (CanonicalField::DepthTo, &["Depth To", "to (m)", "Base"]),
            (CanonicalField::Consistency, &["Consistency", "Consistency/Density"]),
            (CanonicalField::Geology, &["Geology_Orgin", "Lithology"]),
            (CanonicalField::CollarRl, &["Collar RL", "Ground Level"]),
        ];
        for (field, variants) in cases {
            for variant in *variants {
                assert!(field.matches(variant), "{} should match '{}'", field, variant);
            }
        }
    }

    #[test]
    fn test_geophysics_field_variants() {
        let cases: &[(CanonicalField, &[&str])] = &[
            (CanonicalField::Elevation, &["Elevation", "From_RL", "RL"]),
            (CanonicalField::Velocity, &["Velocity", "S-Velocity", "Vs (m/s)"]),
            (CanonicalField::LineId, &["Geophysics_ID", "Line"]),
            (CanonicalField::Chainage, &["Chainage", "CH", "Station"]),
        ];
        for (field, variants) in cases {
            for variant in *variants {
                assert!(field.matches(variant), "{} should match '{}'", field, variant);
            }
        }
    }

    #[test]
    fn test_lab_field_variants() {
        let cases: &[(CanonicalField, &[&str])] = &[
            (CanonicalField::Depth, &["Depth", "Sample Depth", "depth (m)"]),
            (CanonicalField::TestType, &["Test Type", "Test"]),
            (CanonicalField::Value, &["Value", "Result"]),
            (CanonicalField::Ucs, &["UCS (MPa)", "ucs"]),
            (CanonicalField::SptN, &["SPT N Value", "N-Value"]),
            (CanonicalField::LiquidLimit, &["LL (%)", "Liquid Limit"]),
            (CanonicalField::PlasticLimit, &["PL (%)"]),
            (CanonicalField::PlasticityIndex, &["PI (%)", "Plasticity Index"]),
        ];
        for (field, variants) in cases {
            for variant in *variants {
                assert!(field.matches(variant), "{} should match '{}'", field, variant);
            }
        }
    }

    #[test]
    fn test_unrelated_header_does_not_match() {
        assert!(!CanonicalField::Velocity.matches("Velocity Model"));
        assert!(!CanonicalField::HoleId.matches("Hole Diameter"));
        assert!(!CanonicalField::Depth.matches(""));
    }

    #[test]
    fn test_detect_missing_required_field() {
        let err = ColumnMapping::detect(
            TablePurpose::BoreholeInterpretation,
            "holes",
            &headers(&["Hole ID", "Easting", "Northing", "Depth From", "Depth To"]),
        )
        .unwrap_err();

        match err {
            GeocorrError::Schema { table, field } => {
                assert_eq!(table, "holes");
                assert_eq!(field, "consistency");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_detect_optional_field_absent() {
        let mapping = ColumnMapping::detect(
            TablePurpose::Geophysics,
            "line_a",
            &headers(&["Easting", "Northing", "Elevation", "Velocity"]),
        )
        .unwrap();

        assert_eq!(mapping.index(CanonicalField::Velocity), Some(3));
        assert!(!mapping.contains(CanonicalField::LineId));
        assert!(!mapping.contains(CanonicalField::Chainage));
    }

    #[test]
    fn test_rename_and_apply() {
        let raw = RawTable::new(
            "lab",
            headers(&["BH", "Sample Depth", "Remarks", "UCS (MPa)"]),
            vec![headers(&["BH1", "3.0", "ok", "1.5"])],
        );
        let mapping = ColumnMapping::detect(TablePurpose::LabSummary, &raw.name, &raw.headers).unwrap();

        assert_eq!(mapping.rename("Sample Depth"), Some("depth"));
        assert_eq!(mapping.rename("Remarks"), None);

        let table = mapping.apply(&raw);
        assert_eq!(table.headers(), vec!["hole_id", "depth", "ucs"]);
        assert_eq!(table.text(0, CanonicalField::HoleId), Some("BH1"));
        assert_eq!(table.require_number(0, CanonicalField::Ucs).unwrap(), 1.5);
        assert_eq!(table.number(0, CanonicalField::SptN).unwrap(), None);
    }

    #[test]
    fn test_invalid_number_reports_row_and_field() {
        let raw = RawTable::new(
            "lab",
            headers(&["hole_id", "depth"]),
            vec![headers(&["BH1", "abc"])],
        );
        let table = CanonicalTable::from_raw(TablePurpose::LabSummary, &raw).unwrap();
        let err = table.require_number(0, CanonicalField::Depth).unwrap_err();
        assert!(matches!(
            err,
            GeocorrError::InvalidValue { row: 1, ref field, .. } if field.as_str() == "depth"
        ));
    }
}
