//! Dataset ingestion and cleaning.
//!
//! Raw CSVs arrive with arbitrary column names. The [`columns`] module maps
//! them onto the canonical schema, and [`clean`] turns a mapped table into a
//! validated [`CleanTable`] ready for feature engineering.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

pub mod clean;
pub mod columns;

/// Canonical column names all cleaned data conforms to.
pub mod field {
    pub const BATTERY_CAPACITY: &str = "Battery_Capacity_kWh";
    pub const CURRENT_SOC: &str = "Current_SoC_%";
    pub const AVG_SPEED: &str = "Avg_Speed_kmh";
    pub const TEMPERATURE: &str = "Temperature_C";
    pub const TERRAIN: &str = "Terrain";
    pub const AC_USAGE: &str = "AC_Usage";
    pub const DRIVING_STYLE: &str = "Driving_Style";
    pub const RANGE: &str = "Range_km";

    pub const STATION_NAME: &str = "Station_Name";
    pub const LATITUDE: &str = "Latitude";
    pub const LONGITUDE: &str = "Longitude";
    pub const CITY: &str = "City";
    pub const STATE: &str = "State";
    pub const STATION_ID: &str = "Station_ID";
    pub const HEALTH_SCORE: &str = "health_score";
    pub const IS_VERIFIED: &str = "is_verified";
    pub const SOURCE: &str = "source";
}

/// An unvalidated table straight out of a CSV file. Cells are kept as text
/// until the cleaner decides which columns are numeric.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Read a headed CSV file. Every record must have the same width as the
    /// header row; the `csv` crate enforces that for us.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("failed to open CSV {}", path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("failed to read CSV headers from {}", path.display()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.with_context(|| format!("malformed CSV record in {}", path.display()))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// All cells of one column, by raw header name.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }
}

/// A cleaned table on the canonical schema. Columns are typed; a canonical
/// field that was never mapped is simply absent (not zero-filled).
#[derive(Debug, Clone, Default)]
pub struct CleanTable {
    pub numeric: BTreeMap<String, Vec<f64>>,
    pub categorical: BTreeMap<String, Vec<String>>,
    pub n_rows: usize,
}

impl CleanTable {
    pub fn numeric_column(&self, name: &str) -> Option<&[f64]> {
        self.numeric.get(name).map(|v| v.as_slice())
    }

    pub fn categorical_column(&self, name: &str) -> Option<&[String]> {
        self.categorical.get(name).map(|v| v.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.numeric.contains_key(name) || self.categorical.contains_key(name)
    }

    /// Column names in a stable order, numeric first.
    pub fn column_names(&self) -> Vec<&str> {
        self.numeric
            .keys()
            .chain(self.categorical.keys())
            .map(|s| s.as_str())
            .collect()
    }

    /// Keep only the rows flagged `true` in `mask`.
    pub fn retain_rows(&mut self, mask: &[bool]) {
        debug_assert_eq!(mask.len(), self.n_rows);
        for col in self.numeric.values_mut() {
            let mut i = 0;
            col.retain(|_| {
                let keep = mask[i];
                i += 1;
                keep
            });
        }
        for col in self.categorical.values_mut() {
            let mut i = 0;
            col.retain(|_| {
                let keep = mask[i];
                i += 1;
                keep
            });
        }
        self.n_rows = mask.iter().filter(|&&k| k).count();
    }

    /// Write the table back out as CSV, canonical names as headers.
    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create CSV {}", path.display()))?;

        let names: Vec<&str> = self.column_names();
        writer.write_record(&names)?;
        for row in 0..self.n_rows {
            let mut record = Vec::with_capacity(names.len());
            for col in self.numeric.values() {
                record.push(format_cell(col[row]));
            }
            for col in self.categorical.values() {
                record.push(col[row].clone());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn format_cell(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}
