//! The end-to-end training pipeline.
//!
//! Raw CSVs in, serving artifacts out: clean, build features, benchmark
//! the candidate lineup, select the shipping model, persist everything.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::dataset::clean::{clean_consumption, clean_stations};
use crate::dataset::columns::ColumnTable;
use crate::dataset::RawTable;
use crate::features::FeatureBuilder;
use crate::registry::{self, RunMetadata};
use crate::training::ensemble::select_artifact;
use crate::training::Benchmark;

/// Run the full pipeline as configured. Returns the run metadata that was
/// persisted alongside the model.
pub fn run(cfg: &Config) -> Result<RunMetadata> {
    let raw = RawTable::from_csv_path(&cfg.data.consumption_csv)
        .with_context(|| format!("loading consumption data from {}", cfg.data.consumption_csv))?;
    info!(
        path = cfg.data.consumption_csv,
        rows = raw.n_rows(),
        "consumption data loaded"
    );

    let clean = clean_consumption(&raw, &ColumnTable::consumption(), &cfg.pipeline)?;
    clean
        .write_csv_path(Path::new(&cfg.data.processed_dir).join("ev_consumption_clean.csv"))
        .context("writing cleaned consumption data")?;

    // Stations are optional input; the range model trains without them.
    clean_station_data(cfg);

    let mut features = FeatureBuilder::new();
    let (x, y) = features.fit_transform(&clean)?;
    let feature_names = features.feature_names()?.to_vec();
    info!(
        n_samples = x.len(),
        n_features = feature_names.len(),
        "feature matrix built"
    );

    let outcome = Benchmark::new(&cfg.pipeline).run(&x, &y)?;
    for report in &outcome.reports {
        info!(
            model = report.name,
            test_r2 = format!("{:.4}", report.test_r2),
            cv = format!("{:.4}±{:.4}", report.cv_r2_mean, report.cv_r2_std),
            rmse = format!("{:.2}", report.rmse),
            "benchmark result"
        );
    }

    let selection = select_artifact(
        &outcome.reports,
        outcome.models,
        &outcome.x_test,
        &outcome.y_test,
        &cfg.pipeline,
    )?;
    info!(
        artifact = selection.artifact.describe(),
        accuracy_pct = format!("{:.2}", selection.accuracy_pct),
        "model selected"
    );

    let metadata = RunMetadata {
        best_model: selection.best_model,
        model_type: selection.artifact.model_type().to_string(),
        test_r2: selection.test_r2,
        accuracy_pct: selection.accuracy_pct,
        n_features: feature_names.len(),
        n_samples: outcome.n_samples,
        trained_at: Utc::now(),
    };

    registry::save(
        &cfg.data.models_dir,
        &selection.artifact,
        &outcome.scaler,
        &feature_names,
        &outcome.reports,
        &metadata,
    )?;

    Ok(metadata)
}

fn clean_station_data(cfg: &Config) {
    let path = Path::new(&cfg.data.stations_csv);
    if !path.exists() {
        info!(path = cfg.data.stations_csv, "no stations file; skipping");
        return;
    }
    let result = RawTable::from_csv_path(path)
        .and_then(|raw| Ok(clean_stations(&raw, &ColumnTable::stations(), &cfg.pipeline)?))
        .and_then(|clean| {
            clean.write_csv_path(Path::new(&cfg.data.processed_dir).join("ev_stations_clean.csv"))
        });
    if let Err(err) = result {
        warn!(%err, "stations cleaning failed; continuing without them");
    }
}
