//! Consistency categories: ordering and soil-group buckets.

use crate::error::{GeocorrError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Cohesive consistency codes, softest first
const COHESIVE: &[&str] = &["VS", "S", "F", "St", "VSt", "H"];

/// Granular density codes, loosest first
const GRANULAR: &[&str] = &["VL", "L", "MD", "D", "VD"];

/// Rock weathering/strength classes
const ROCK: &[&str] = &["5a", "5b", "4a", "4b", "3a", "3b", "2a", "2b", "1a", "1b"];

/// Descriptive names accepted in place of the codes
const FULL_NAMES: &[(&str, &str)] = &[
    ("very soft", "VS"),
    ("soft", "S"),
    ("firm", "F"),
    ("stiff", "St"),
    ("very stiff", "VSt"),
    ("hard", "H"),
    ("very loose", "VL"),
    ("loose", "L"),
    ("medium dense", "MD"),
    ("dense", "D"),
    ("very dense", "VD"),
];

/// Broad material bucket a consistency category belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SoilGroup {
    Cohesive,
    Granular,
    Rock,
    Other,
}

impl SoilGroup {
    /// Display color used for this group in charts
    pub fn color(&self) -> &'static str {
        match self {
            SoilGroup::Cohesive => "#8c564b",
            SoilGroup::Granular => "#ffbf00",
            SoilGroup::Rock => "#7f7f7f",
            SoilGroup::Other => "#c7c7c7",
        }
    }
}

impl fmt::Display for SoilGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SoilGroup::Cohesive => "Cohesive",
            SoilGroup::Granular => "Granular",
            SoilGroup::Rock => "Rock",
            SoilGroup::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Normalize a consistency label to its code.
///
/// Codes are case sensitive (`S` is soft, `St` is stiff); descriptive names
/// such as `"Very Stiff"` are matched case-insensitively.
pub fn canonical_label(label: &str) -> String {
    let trimmed = label.trim();
    let lowered = trimmed.to_lowercase();
    FULL_NAMES
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Soil group of a consistency label
pub fn soil_group(label: &str) -> SoilGroup {
    let code = canonical_label(label);
    if code.is_empty() {
        return SoilGroup::Other;
    }
    if COHESIVE.contains(&code.as_str()) {
        SoilGroup::Cohesive
    } else if GRANULAR.contains(&code.as_str()) {
        SoilGroup::Granular
    } else if ROCK.contains(&code.as_str()) || code.starts_with(|c: char| c.is_ascii_digit()) {
        SoilGroup::Rock
    } else {
        SoilGroup::Other
    }
}

/// All known consistency codes in default order
pub fn known_labels() -> impl Iterator<Item = &'static str> {
    COHESIVE.iter().chain(GRANULAR).chain(ROCK).copied()
}

/// A consistency label placed in an ordering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyClass {
    /// Normalized code
    pub label: String,

    /// Position in the ordering; unknown labels rank after every known one
    pub rank: usize,

    pub group: SoilGroup,

    /// False for labels outside the known category set
    pub known: bool,
}

/// Ordered consistency categories, optionally overridden by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyOrder {
    labels: Vec<String>,
}

impl Default for ConsistencyOrder {
    fn default() -> Self {
        Self { labels: known_labels().map(str::to_string).collect() }
    }
}

impl ConsistencyOrder {
    /// Build an ordering from a user override.
    ///
    /// The override must be a subset (or permutation) of the known labels.
    /// Overridden labels rank first; the remaining known labels follow in
    /// default order.
    pub fn with_override<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let known: BTreeSet<&str> = known_labels().collect();
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::with_capacity(known.len());

        for label in labels {
            let code = canonical_label(label.as_ref());
            if !known.contains(code.as_str()) {
                return Err(GeocorrError::ConfigInvalid {
                    key: "consistency_order".to_string(),
                    reason: format!("unknown consistency category '{}'", label.as_ref()),
                });
            }
            if !seen.insert(code.clone()) {
                return Err(GeocorrError::ConfigInvalid {
                    key: "consistency_order".to_string(),
                    reason: format!("category '{}' listed more than once", code),
                });
            }
            ordered.push(code);
        }

        for label in known_labels() {
            if !seen.contains(label) {
                ordered.push(label.to_string());
            }
        }

        Ok(Self { labels: ordered })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Classify a single label against this ordering
    pub fn classify(&self, label: &str) -> ConsistencyClass {
        let code = canonical_label(label);
        let position = self.labels.iter().position(|l| *l == code);
        ConsistencyClass {
            rank: position.unwrap_or(self.labels.len()),
            known: position.is_some(),
            group: soil_group(&code),
            label: code,
        }
    }

    /// Arrange observed labels: known ones in order, unknown ones appended
    /// alphabetically after them and flagged.
    pub fn arrange<'a, I>(&self, observed: I) -> Arrangement
    where
        I: IntoIterator<Item = &'a str>,
    {
        let observed: BTreeSet<String> =
            observed.into_iter().map(canonical_label).filter(|l| !l.is_empty()).collect();

        let mut classes: Vec<ConsistencyClass> = self
            .labels
            .iter()
            .filter(|l| observed.contains(*l))
            .map(|l| self.classify(l))
            .collect();

        let unknown: Vec<String> =
            observed.iter().filter(|l| !self.labels.contains(l)).cloned().collect();

        for (offset, label) in unknown.iter().enumerate() {
            classes.push(ConsistencyClass {
                label: label.clone(),
                rank: self.labels.len() + offset,
                group: soil_group(label),
                known: false,
            });
        }

        if !unknown.is_empty() {
            tracing::debug!("Unknown consistency categories appended: {:?}", unknown);
        }

        Arrangement { classes, unknown }
    }
}

/// Observed labels arranged by a [`ConsistencyOrder`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrangement {
    pub classes: Vec<ConsistencyClass>,

    /// Labels not in the known set, in the order they were appended
    pub unknown: Vec<String>,
}
