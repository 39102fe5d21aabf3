//! Regex-based column auto-detection.
//!
//! Datasets from different sources name the same quantity in wildly
//! different ways (`SOC (%)`, `battery_level`, `state of charge`...). The
//! [`ColumnTable`] is an explicit ordered list of (canonical field, pattern
//! list) pairs; [`ColumnTable::map_columns`] resolves raw header names
//! against it. New dataset shapes are supported by supplying a different
//! table, not by code changes.

use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use super::field;

/// Which kind of dataset a raw CSV is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Consumption,
    Stations,
}

/// Mapping from canonical field name to the raw column it was matched from.
/// Each canonical field maps to at most one raw column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping(BTreeMap<String, String>);

impl ColumnMapping {
    pub fn get(&self, canonical: &str) -> Option<&str> {
        self.0.get(canonical).map(|s| s.as_str())
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.0.contains_key(canonical)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Ordered detection table: for each canonical field, an ordered list of
/// case-insensitive patterns tried against lower-cased raw header names.
#[derive(Debug, Clone)]
pub struct ColumnTable {
    fields: Vec<(String, Vec<Regex>)>,
}

impl ColumnTable {
    /// Build a table from (canonical field, patterns) pairs. Pattern order
    /// is significant.
    pub fn new(fields: &[(&str, &[&str])]) -> Result<Self, regex::Error> {
        let mut compiled = Vec::with_capacity(fields.len());
        for (name, patterns) in fields {
            let regexes = patterns
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<Vec<_>, _>>()?;
            compiled.push((name.to_string(), regexes));
        }
        Ok(Self { fields: compiled })
    }

    /// Detection table for trip/consumption datasets.
    pub fn consumption() -> Self {
        Self::new(&[
            (
                field::BATTERY_CAPACITY,
                &[
                    r"battery.*capacity",
                    r"capacity.*kwh",
                    r"battery.*kwh",
                    r"bat.*cap",
                    r"kwh",
                    r"capacity",
                ],
            ),
            (
                field::CURRENT_SOC,
                &[
                    r"soc",
                    r"state.*charge",
                    r"battery.*level",
                    r"charge.*level",
                    r"battery.*percent",
                    r"soc.*%",
                    r"current.*soc",
                ],
            ),
            (
                field::AVG_SPEED,
                &[
                    r"speed",
                    r"avg.*speed",
                    r"average.*speed",
                    r"velocity",
                    r"km.*h",
                    r"kmph",
                    r"speed.*kmh",
                ],
            ),
            (
                field::TEMPERATURE,
                &[r"temp", r"temperature", r"ambient.*temp", r"temp.*c", r"celsius"],
            ),
            (
                field::TERRAIN,
                &[r"terrain", r"road.*type", r"route.*type", r"driving.*condition"],
            ),
            (
                // "ac" must match as a word, or "capacity" and "achieved"
                // would satisfy it.
                field::AC_USAGE,
                &[r"^ac\b", r"\bac\b", r"air.*condition", r"hvac", r"ac.*usage", r"climate"],
            ),
            (
                field::DRIVING_STYLE,
                &[
                    r"driving.*style",
                    r"drive.*mode",
                    r"style",
                    r"mode",
                    r"driving.*behavior",
                ],
            ),
            (
                field::RANGE,
                &[
                    r"range",
                    r"distance",
                    r"range.*km",
                    r"actual.*range",
                    r"achieved.*range",
                    r"km.*range",
                ],
            ),
        ])
        .expect("builtin consumption patterns are valid")
    }

    /// Detection table for charging-station datasets.
    pub fn stations() -> Self {
        Self::new(&[
            (
                field::STATION_NAME,
                &[r"name", r"station.*name", r"title", r"location.*name"],
            ),
            (field::LATITUDE, &[r"lat", r"latitude", r"^lat$"]),
            (field::LONGITUDE, &[r"lon", r"lng", r"longitude", r"^lon$", r"^lng$"]),
            (field::CITY, &[r"city", r"town", r"location", r"area"]),
            (field::STATE, &[r"state", r"province", r"region"]),
        ])
        .expect("builtin stations patterns are valid")
    }

    pub fn for_kind(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Consumption => Self::consumption(),
            DatasetKind::Stations => Self::stations(),
        }
    }

    /// Resolve raw headers against this table. For each canonical field the
    /// first raw column matching any of its patterns wins; once mapped, the
    /// field is fixed and the raw column is not offered to later fields.
    /// A field with no match is absent from the result.
    pub fn map_columns(&self, headers: &[String]) -> ColumnMapping {
        let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

        let mut mapping = BTreeMap::new();
        let mut claimed: HashSet<&str> = HashSet::new();
        for (canonical, patterns) in &self.fields {
            'columns: for (raw, low) in headers.iter().zip(lowered.iter()) {
                if claimed.contains(raw.as_str()) {
                    continue;
                }
                for pattern in patterns {
                    if pattern.is_match(low) {
                        mapping.insert(canonical.clone(), raw.clone());
                        claimed.insert(raw.as_str());
                        break 'columns;
                    }
                }
            }
        }

        if mapping.is_empty() {
            tracing::warn!("column auto-detection matched nothing; data left unmapped");
        }

        ColumnMapping(mapping)
    }
}
