//! Model artifact persistence.
//!
//! A training run leaves five files in the models directory: the selected
//! model (bincode), the fitted scaler, the frozen feature names, the full
//! benchmark report, and run metadata. [`load`] rebuilds a serving-ready
//! [`LoadedBundle`] from them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dataset::{field, CleanTable};
use crate::error::PipelineError;
use crate::features::{FeatureBuilder, StandardScaler};
use crate::training::ensemble::SelectedArtifact;
use crate::training::ModelReport;

pub const MODEL_FILE: &str = "model.bin";
pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURE_INFO_FILE: &str = "feature_info.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const METADATA_FILE: &str = "model_metadata.json";

/// The frozen feature layout plus the target it predicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub feature_names: Vec<String>,
    pub target_column: String,
}

/// Headline facts about a training run. The on-disk keys for accuracy and
/// the training time are `accuracy` and `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub best_model: String,
    pub model_type: String,
    pub test_r2: f64,
    #[serde(rename = "accuracy")]
    pub accuracy_pct: f64,
    pub n_features: usize,
    pub n_samples: usize,
    #[serde(rename = "timestamp")]
    pub trained_at: DateTime<Utc>,
}

/// Write a complete artifact set under `dir`, creating it if needed.
pub fn save(
    dir: impl AsRef<Path>,
    artifact: &SelectedArtifact,
    scaler: &StandardScaler,
    feature_names: &[String],
    reports: &[ModelReport],
    metadata: &RunMetadata,
) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create models dir {}", dir.display()))?;

    let model_bytes = bincode::serialize(artifact).context("failed to serialize model")?;
    fs::write(dir.join(MODEL_FILE), model_bytes)?;

    write_json(dir.join(SCALER_FILE), scaler)?;
    write_json(
        dir.join(FEATURE_INFO_FILE),
        &FeatureInfo {
            feature_names: feature_names.to_vec(),
            target_column: field::RANGE.to_string(),
        },
    )?;
    write_json(dir.join(METRICS_FILE), reports)?;
    write_json(dir.join(METADATA_FILE), metadata)?;

    info!(
        dir = %dir.display(),
        model = metadata.best_model,
        model_type = metadata.model_type,
        accuracy_pct = metadata.accuracy_pct,
        "model artifacts saved"
    );
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: PathBuf, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let json =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}

/// A serving-ready model: artifact, scaler and feature layout together.
#[derive(Debug)]
pub struct LoadedBundle {
    pub artifact: SelectedArtifact,
    pub scaler: StandardScaler,
    pub features: FeatureBuilder,
    pub feature_info: FeatureInfo,
    pub metadata: RunMetadata,
}

impl LoadedBundle {
    /// Run the full serving path: frozen features, scaling, prediction.
    pub fn predict(&self, table: &CleanTable) -> Result<Vec<f64>> {
        let x = self.features.transform(table)?;
        let x = self.scaler.transform(&x)?;
        self.artifact.predict(&x)
    }

    pub fn model_type(&self) -> &'static str {
        self.artifact.model_type()
    }
}

/// Load the artifact set from `dir`. A missing model file is reported with
/// every path that was checked, so startup failures are diagnosable.
pub fn load(dir: impl AsRef<Path>) -> Result<LoadedBundle> {
    let dir = dir.as_ref();
    let model_path = dir.join(MODEL_FILE);
    if !model_path.exists() {
        return Err(PipelineError::NoModelArtifact(vec![model_path]).into());
    }

    let model_bytes = fs::read(&model_path)
        .with_context(|| format!("failed to read {}", model_path.display()))?;
    let artifact: SelectedArtifact = bincode::deserialize(&model_bytes)
        .with_context(|| format!("failed to deserialize {}", model_path.display()))?;

    let scaler: StandardScaler = read_json(&dir.join(SCALER_FILE))?;
    let feature_info: FeatureInfo = read_json(&dir.join(FEATURE_INFO_FILE))?;
    let metadata: RunMetadata = read_json(&dir.join(METADATA_FILE))?;

    let features = FeatureBuilder::from_names(feature_info.feature_names.clone());

    info!(
        dir = %dir.display(),
        model = metadata.best_model,
        model_type = metadata.model_type,
        n_features = feature_info.feature_names.len(),
        "model artifacts loaded"
    );

    Ok(LoadedBundle {
        artifact,
        scaler,
        features,
        feature_info,
        metadata,
    })
}
