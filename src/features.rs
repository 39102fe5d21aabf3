//! Feature engineering and scaling.
//!
//! The feature vector layout is a contract between training and serving:
//! [`FeatureBuilder::fit_transform`] freezes the name list, the registry
//! persists it, and [`FeatureBuilder::from_names`] rebuilds the exact same
//! layout at load time. `transform` derives every value from the frozen
//! names, so a table with extra or missing columns still produces vectors
//! of the right width.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::dataset::{field, CleanTable};
use crate::error::PipelineError;

/// Reference speed for the speed-deviation feature (km/h).
pub const OPTIMAL_SPEED_KMH: f64 = 60.0;
/// Reference cabin-neutral temperature for the temperature-deviation feature.
pub const OPTIMAL_TEMPERATURE_C: f64 = 22.5;

const TERRAIN_PREFIX: &str = "terrain_";
const DRIVING_PREFIX: &str = "driving_";

/// Builds model-ready feature matrices from a [`CleanTable`].
///
/// Unfitted until `fit_transform` (or `from_names`) establishes the frozen
/// feature-name order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureBuilder {
    feature_names: Option<Vec<String>>,
}

impl FeatureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a fitted builder from a persisted name list.
    pub fn from_names(names: Vec<String>) -> Self {
        Self {
            feature_names: Some(names),
        }
    }

    pub fn feature_names(&self) -> Result<&[String], PipelineError> {
        self.feature_names
            .as_deref()
            .ok_or(PipelineError::NotFitted)
    }

    pub fn is_fitted(&self) -> bool {
        self.feature_names.is_some()
    }

    /// Fit on a training table and return `(features, target)`.
    ///
    /// The feature-name order is fixed here and never changes afterwards:
    /// base numerics, derived energy, one-hot terrain (sorted), AC flag,
    /// one-hot driving style (sorted), then the interaction terms.
    pub fn fit_transform(
        &mut self,
        table: &CleanTable,
    ) -> Result<(Vec<Vec<f64>>, Vec<f64>), PipelineError> {
        if table.n_rows == 0 {
            return Err(PipelineError::EmptyDataset(
                "cannot fit features on an empty table".to_string(),
            ));
        }
        let target = table
            .numeric_column(field::RANGE)
            .ok_or(PipelineError::MissingTarget)?
            .to_vec();

        let mut names = Vec::new();
        for base in [field::BATTERY_CAPACITY, field::CURRENT_SOC] {
            if table.has_column(base) {
                names.push(canonical_to_feature(base));
            }
        }
        if table.has_column(field::CURRENT_SOC) {
            names.push("current_soc_normalized".to_string());
        }
        for base in [field::AVG_SPEED, field::TEMPERATURE] {
            if table.has_column(base) {
                names.push(canonical_to_feature(base));
            }
        }
        if table.has_column(field::BATTERY_CAPACITY) && table.has_column(field::CURRENT_SOC) {
            names.push("available_energy_kwh".to_string());
        }
        for cat in sorted_categories(table, field::TERRAIN) {
            names.push(format!("{TERRAIN_PREFIX}{cat}"));
        }
        if table.has_column(field::AC_USAGE) {
            names.push("ac_on".to_string());
        }
        for cat in sorted_categories(table, field::DRIVING_STYLE) {
            names.push(format!("{DRIVING_PREFIX}{cat}"));
        }
        if table.has_column(field::AVG_SPEED) && table.has_column(field::TERRAIN) {
            names.push("speed_terrain_highway".to_string());
        }
        if table.has_column(field::TEMPERATURE) && table.has_column(field::AC_USAGE) {
            names.push("temp_ac_interaction".to_string());
        }
        if table.has_column(field::AVG_SPEED) {
            names.push("speed_deviation_from_optimal".to_string());
        }
        if table.has_column(field::TEMPERATURE) {
            names.push("temp_deviation_from_optimal".to_string());
        }

        self.feature_names = Some(names);
        let x = self.transform(table)?;
        Ok((x, target))
    }

    /// Materialize the frozen feature vector for every row of `table`.
    ///
    /// Columns absent from the table contribute zeros; columns the fit never
    /// saw are ignored. Fails with [`PipelineError::NotFitted`] before fit.
    pub fn transform(&self, table: &CleanTable) -> Result<Vec<Vec<f64>>, PipelineError> {
        let names = self.feature_names()?;
        let mut x = Vec::with_capacity(table.n_rows);
        for row in 0..table.n_rows {
            x.push(
                names
                    .iter()
                    .map(|name| feature_value(name, table, row))
                    .collect(),
            );
        }
        Ok(x)
    }
}

/// Compute one named feature for one row. Unknown names (from a stale
/// artifact, say) evaluate to zero rather than failing the whole request.
fn feature_value(name: &str, table: &CleanTable, row: usize) -> f64 {
    if let Some(cat) = name.strip_prefix(TERRAIN_PREFIX) {
        return one_hot(table, field::TERRAIN, row, cat);
    }
    if let Some(cat) = name.strip_prefix(DRIVING_PREFIX) {
        return one_hot(table, field::DRIVING_STYLE, row, cat);
    }

    match name {
        "battery_capacity_kwh" => numeric(table, field::BATTERY_CAPACITY, row),
        "current_soc_pct" => numeric(table, field::CURRENT_SOC, row),
        "current_soc_normalized" => numeric(table, field::CURRENT_SOC, row) / 100.0,
        "avg_speed_kmh" => numeric(table, field::AVG_SPEED, row),
        "temperature_c" => numeric(table, field::TEMPERATURE, row),
        "available_energy_kwh" => {
            numeric(table, field::BATTERY_CAPACITY, row) * numeric(table, field::CURRENT_SOC, row)
                / 100.0
        }
        "ac_on" => ac_on(table, row),
        "speed_terrain_highway" => {
            numeric(table, field::AVG_SPEED, row) * one_hot(table, field::TERRAIN, row, "Highway")
        }
        "temp_ac_interaction" => numeric(table, field::TEMPERATURE, row) * ac_on(table, row),
        "speed_deviation_from_optimal" => {
            (numeric(table, field::AVG_SPEED, row) - OPTIMAL_SPEED_KMH).abs()
        }
        "temp_deviation_from_optimal" => {
            (numeric(table, field::TEMPERATURE, row) - OPTIMAL_TEMPERATURE_C).abs()
        }
        _ => 0.0,
    }
}

fn numeric(table: &CleanTable, column: &str, row: usize) -> f64 {
    table
        .numeric_column(column)
        .map_or(0.0, |col| col[row])
}

fn one_hot(table: &CleanTable, column: &str, row: usize, category: &str) -> f64 {
    table
        .categorical_column(column)
        .map_or(0.0, |col| if col[row] == category { 1.0 } else { 0.0 })
}

fn ac_on(table: &CleanTable, row: usize) -> f64 {
    table.categorical_column(field::AC_USAGE).map_or(0.0, |col| {
        match col[row].to_lowercase().as_str() {
            "on" | "yes" | "1" | "true" => 1.0,
            _ => 0.0,
        }
    })
}

fn sorted_categories(table: &CleanTable, column: &str) -> Vec<String> {
    table
        .categorical_column(column)
        .map(|col| {
            col.iter()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
        .unwrap_or_default()
}

fn canonical_to_feature(canonical: &str) -> String {
    match canonical {
        field::BATTERY_CAPACITY => "battery_capacity_kwh",
        field::CURRENT_SOC => "current_soc_pct",
        field::AVG_SPEED => "avg_speed_kmh",
        field::TEMPERATURE => "temperature_c",
        other => other,
    }
    .to_string()
}

/// Per-feature standardization, fitted on the training split only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    fitted: Option<(Vec<f64>, Vec<f64>)>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &[Vec<f64>]) -> Result<(), PipelineError> {
        if x.is_empty() {
            return Err(PipelineError::EmptyDataset(
                "cannot fit scaler on zero rows".to_string(),
            ));
        }
        let n_features = x[0].len();
        let n = x.len() as f64;

        let mut means = vec![0.0; n_features];
        for row in x {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0; n_features];
        for row in x {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            // Constant features pass through unscaled.
            if *s < 1e-10 {
                *s = 0.0;
            }
        }

        self.fitted = Some((means, stds));
        Ok(())
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PipelineError> {
        let (means, stds) = self.fitted.as_ref().ok_or(PipelineError::ScalerNotFitted)?;
        Ok(x.iter()
            .map(|row| {
                row.iter()
                    .zip(means.iter().zip(stds.iter()))
                    .map(|(v, (m, s))| if *s == 0.0 { v - m } else { (v - m) / s })
                    .collect()
            })
            .collect())
    }

    pub fn fit_transform(&mut self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, PipelineError> {
        self.fit(x)?;
        self.transform(x)
    }
}
