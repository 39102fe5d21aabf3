//! End-to-end pipeline tests: messy raw CSVs in, loadable serving
//! artifacts out, with training-time and serving-time predictions agreeing.

use std::fmt::Write as _;
use std::path::Path;

use chargepilot::config::Config;
use chargepilot::pipeline;
use chargepilot::predictor::{PredictionInput, Predictor};
use chargepilot::registry;

/// Synthetic trip data under deliberately messy column names. Consumption
/// is linear in the trip conditions so the linear candidates fit it well.
fn write_raw_csv(path: &Path, n: usize) {
    let mut csv = String::from(
        "Battery Capacity (kWh),SOC (%),Average Speed km/h,Ambient Temperature,Road Type,AC usage,Drive Mode,Achieved Range km\n",
    );
    for i in 0..n {
        let cap = 30.0 + (i % 5) as f64 * 10.0;
        let soc = 10.0 + (i % 9) as f64 * 10.0;
        let speed = 40.0 + (i % 7) as f64 * 10.0;
        let temp = 5.0 + (i % 8) as f64 * 5.0;
        let terrain = ["city", "highway", "mixed"][i % 3];
        let ac = ["On", "Off"][i % 2];
        let style = ["eco", "moderate", "aggressive"][i % 3];
        let consumption = 0.12
            + 0.0008 * (speed - 60.0_f64).abs()
            + 0.0006 * (temp - 22.5_f64).abs()
            + if ac == "On" { 0.02 } else { 0.0 }
            + if terrain == "highway" { 0.015 } else { 0.0 };
        writeln!(
            csv,
            "{cap},{soc},{speed},{temp},{terrain},{ac},{style},{consumption:.5}"
        )
        .unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

fn configured(dir: &Path, csv: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.data.consumption_csv = csv.to_string_lossy().into_owned();
    cfg.data.stations_csv = dir.join("no_stations.csv").to_string_lossy().into_owned();
    cfg.data.processed_dir = dir.join("processed").to_string_lossy().into_owned();
    cfg.data.models_dir = dir.join("models").to_string_lossy().into_owned();
    cfg
}

#[test]
fn training_run_leaves_complete_artifact_set() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("trips.csv");
    write_raw_csv(&csv, 240);
    let cfg = configured(dir.path(), &csv);

    let metadata = pipeline::run(&cfg).unwrap();
    assert!(metadata.n_samples > 200);
    assert_eq!(metadata.n_features, 17);
    assert!(metadata.test_r2 > 0.9, "test_r2 = {}", metadata.test_r2);
    assert!(["single", "ensemble"].contains(&metadata.model_type.as_str()));

    let models_dir = Path::new(&cfg.data.models_dir);
    for file in [
        registry::MODEL_FILE,
        registry::SCALER_FILE,
        registry::FEATURE_INFO_FILE,
        registry::METRICS_FILE,
        registry::METADATA_FILE,
    ] {
        assert!(models_dir.join(file).exists(), "{file} missing");
    }
    assert!(Path::new(&cfg.data.processed_dir)
        .join("ev_consumption_clean.csv")
        .exists());
}

#[test]
fn loaded_bundle_serves_the_trained_model() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("trips.csv");
    write_raw_csv(&csv, 240);
    let cfg = configured(dir.path(), &csv);

    let metadata = pipeline::run(&cfg).unwrap();
    let bundle = registry::load(&cfg.data.models_dir).unwrap();
    assert_eq!(bundle.metadata.best_model, metadata.best_model);
    assert_eq!(bundle.feature_info.feature_names.len(), metadata.n_features);

    // In-distribution trips get plausible consumption back.
    let predictor = Predictor::new(bundle, cfg.prediction.clone());
    let input = PredictionInput::new(50.0, 80.0)
        .with_speed(60.0)
        .with_temperature(25.0)
        .with_terrain("Mixed")
        .with_ac_usage("Off")
        .with_driving_style("Moderate");
    let consumption = predictor.predict_consumption(&input).unwrap();
    assert!(consumption > 0.05 && consumption < 0.5, "{consumption}");
}

#[test]
fn retraining_overwrites_previous_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("trips.csv");
    write_raw_csv(&csv, 240);
    let cfg = configured(dir.path(), &csv);

    let first = pipeline::run(&cfg).unwrap();
    let second = pipeline::run(&cfg).unwrap();
    assert!(second.trained_at >= first.trained_at);

    // Same data and seed, same selection.
    assert_eq!(first.best_model, second.best_model);
    let bundle = registry::load(&cfg.data.models_dir).unwrap();
    assert_eq!(bundle.metadata.trained_at, second.trained_at);
}

#[test]
fn stations_input_is_cleaned_alongside() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("trips.csv");
    write_raw_csv(&csv, 240);

    let mut cfg = configured(dir.path(), &csv);
    let stations = dir.path().join("stations.csv");
    std::fs::write(
        &stations,
        "Station Name,lat,lng,City\nAlpha,12.9716,77.5946,Bengaluru\nAlpha dup,12.9716,77.5946,Bengaluru\nBeta,13.0827,80.2707,Chennai\n",
    )
    .unwrap();
    cfg.data.stations_csv = stations.to_string_lossy().into_owned();

    pipeline::run(&cfg).unwrap();

    let cleaned = Path::new(&cfg.data.processed_dir).join("ev_stations_clean.csv");
    let content = std::fs::read_to_string(cleaned).unwrap();
    // Duplicate coordinates collapse to one station; IDs are synthesized.
    assert_eq!(content.lines().count(), 3);
    assert!(content.contains("ST000000"));
    assert!(content.contains("ST000001"));
}
