//! Serving-side range prediction.
//!
//! Wraps a [`LoadedBundle`] with input validation, default trip conditions,
//! a safety buffer and confidence banding.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PredictionConfig;
use crate::dataset::{field, CleanTable};
use crate::error::PipelineError;
use crate::registry::LoadedBundle;

/// One trip to predict range for. Optional conditions fall back to typical
/// values when the caller omits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionInput {
    pub battery_capacity_kwh: f64,
    pub current_soc_pct: f64,
    #[serde(default = "default_speed")]
    pub avg_speed_kmh: f64,
    #[serde(default = "default_temperature")]
    pub temperature_c: f64,
    #[serde(default = "default_terrain")]
    pub terrain: String,
    #[serde(default = "default_ac_usage")]
    pub ac_usage: String,
    #[serde(default = "default_driving_style")]
    pub driving_style: String,
}

fn default_speed() -> f64 {
    60.0
}
fn default_temperature() -> f64 {
    25.0
}
fn default_terrain() -> String {
    "Mixed".to_string()
}
fn default_ac_usage() -> String {
    "Off".to_string()
}
fn default_driving_style() -> String {
    "Moderate".to_string()
}

impl PredictionInput {
    pub fn new(battery_capacity_kwh: f64, current_soc_pct: f64) -> Self {
        Self {
            battery_capacity_kwh,
            current_soc_pct,
            avg_speed_kmh: default_speed(),
            temperature_c: default_temperature(),
            terrain: default_terrain(),
            ac_usage: default_ac_usage(),
            driving_style: default_driving_style(),
        }
    }

    pub fn with_speed(mut self, kmh: f64) -> Self {
        self.avg_speed_kmh = kmh;
        self
    }

    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature_c = celsius;
        self
    }

    pub fn with_terrain(mut self, terrain: impl Into<String>) -> Self {
        self.terrain = terrain.into();
        self
    }

    pub fn with_ac_usage(mut self, ac: impl Into<String>) -> Self {
        self.ac_usage = ac.into();
        self
    }

    pub fn with_driving_style(mut self, style: impl Into<String>) -> Self {
        self.driving_style = style.into();
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.battery_capacity_kwh.is_finite() || self.battery_capacity_kwh <= 0.0 {
            return Err(PipelineError::InvalidInput(format!(
                "battery capacity must be positive, got {}",
                self.battery_capacity_kwh
            )));
        }
        if !self.current_soc_pct.is_finite()
            || !(0.0..=100.0).contains(&self.current_soc_pct)
        {
            return Err(PipelineError::InvalidInput(format!(
                "state of charge must be between 0 and 100, got {}",
                self.current_soc_pct
            )));
        }
        if !self.avg_speed_kmh.is_finite() || self.avg_speed_kmh < 0.0 {
            return Err(PipelineError::InvalidInput(format!(
                "average speed must be non-negative, got {}",
                self.avg_speed_kmh
            )));
        }
        if !self.temperature_c.is_finite() {
            return Err(PipelineError::InvalidInput(
                "temperature must be a finite number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn available_energy_kwh(&self) -> f64 {
        self.battery_capacity_kwh * self.current_soc_pct / 100.0
    }

    /// A single-row table on the canonical schema, ready for the frozen
    /// feature transform.
    pub fn to_table(&self) -> CleanTable {
        Self::batch_to_table(std::slice::from_ref(self))
    }

    pub fn batch_to_table(inputs: &[PredictionInput]) -> CleanTable {
        let mut numeric = BTreeMap::new();
        numeric.insert(
            field::BATTERY_CAPACITY.to_string(),
            inputs.iter().map(|i| i.battery_capacity_kwh).collect(),
        );
        numeric.insert(
            field::CURRENT_SOC.to_string(),
            inputs.iter().map(|i| i.current_soc_pct).collect(),
        );
        numeric.insert(
            field::AVG_SPEED.to_string(),
            inputs.iter().map(|i| i.avg_speed_kmh).collect(),
        );
        numeric.insert(
            field::TEMPERATURE.to_string(),
            inputs.iter().map(|i| i.temperature_c).collect(),
        );

        let mut categorical = BTreeMap::new();
        categorical.insert(
            field::TERRAIN.to_string(),
            inputs.iter().map(|i| i.terrain.clone()).collect(),
        );
        categorical.insert(
            field::AC_USAGE.to_string(),
            inputs.iter().map(|i| i.ac_usage.clone()).collect(),
        );
        categorical.insert(
            field::DRIVING_STYLE.to_string(),
            inputs.iter().map(|i| i.driving_style.clone()).collect(),
        );

        CleanTable {
            numeric,
            categorical,
            n_rows: inputs.len(),
        }
    }
}

/// A range prediction with its safety-buffered figure and the conditions it
/// was computed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangePrediction {
    pub predicted_range_km: f64,
    pub safe_range_km: f64,
    pub confidence: String,
    pub battery_capacity_kwh: f64,
    pub current_soc_pct: f64,
    pub available_energy_kwh: f64,
    pub soc_consumption_per_km: f64,
    pub conditions: PredictionConditions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConditions {
    pub avg_speed_kmh: f64,
    pub temperature_c: f64,
    pub terrain: String,
    pub ac_usage: String,
    pub driving_style: String,
}

/// Confidence band for a predicted range, by distance cutoffs.
pub fn confidence_band(predicted_range_km: f64, cfg: &PredictionConfig) -> &'static str {
    if predicted_range_km > cfg.high_confidence_km {
        "high"
    } else if predicted_range_km > cfg.medium_confidence_km {
        "medium"
    } else {
        "low"
    }
}

pub struct Predictor {
    bundle: LoadedBundle,
    cfg: PredictionConfig,
}

impl Predictor {
    pub fn new(bundle: LoadedBundle, cfg: PredictionConfig) -> Self {
        Self { bundle, cfg }
    }

    pub fn bundle(&self) -> &LoadedBundle {
        &self.bundle
    }

    /// Predict drivable range for one trip.
    pub fn predict(&self, input: &PredictionInput) -> Result<RangePrediction> {
        Ok(self
            .predict_batch(std::slice::from_ref(input))?
            .pop()
            .ok_or(PipelineError::NoUsableModel)?)
    }

    /// Predict range for a batch of trips in one model pass.
    pub fn predict_batch(&self, inputs: &[PredictionInput]) -> Result<Vec<RangePrediction>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        for input in inputs {
            input.validate()?;
        }

        let table = PredictionInput::batch_to_table(inputs);
        let raw = self.bundle.predict(&table)?;

        Ok(inputs
            .iter()
            .zip(raw)
            .map(|(input, predicted)| {
                let predicted = predicted.max(0.0);
                let safe = predicted * (1.0 - self.cfg.safety_buffer);
                let soc_per_km = if predicted > 0.0 {
                    input.current_soc_pct / predicted
                } else {
                    0.0
                };
                RangePrediction {
                    predicted_range_km: round2(predicted),
                    safe_range_km: round2(safe),
                    confidence: confidence_band(predicted, &self.cfg).to_string(),
                    battery_capacity_kwh: input.battery_capacity_kwh,
                    current_soc_pct: input.current_soc_pct,
                    available_energy_kwh: round2(input.available_energy_kwh()),
                    soc_consumption_per_km: round3(soc_per_km),
                    conditions: PredictionConditions {
                        avg_speed_kmh: input.avg_speed_kmh,
                        temperature_c: input.temperature_c,
                        terrain: input.terrain.clone(),
                        ac_usage: input.ac_usage.clone(),
                        driving_style: input.driving_style.clone(),
                    },
                }
            })
            .collect())
    }

    /// Predict energy consumption (kWh/km) for one trip. The model output
    /// is taken as a consumption rate here; a non-positive rate means the
    /// artifact cannot serve this request.
    pub fn predict_consumption(&self, input: &PredictionInput) -> Result<f64> {
        input.validate()?;
        let raw = self.bundle.predict(&input.to_table())?;
        let consumption = raw
            .first()
            .copied()
            .ok_or(PipelineError::NoUsableModel)?;
        if consumption <= 0.0 {
            return Err(PipelineError::InvalidModelOutput(consumption).into());
        }
        Ok(consumption)
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub(crate) fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::features::FeatureBuilder;
    use crate::registry;
    use crate::training::ensemble::select_artifact;
    use crate::training::Benchmark;
    use chrono::Utc;

    fn training_table(n: usize) -> CleanTable {
        // Range proportional to available energy, modulated by speed.
        let inputs: Vec<PredictionInput> = (0..n)
            .map(|i| {
                PredictionInput::new(30.0 + (i % 5) as f64 * 10.0, 10.0 + (i % 9) as f64 * 10.0)
                    .with_speed(40.0 + (i % 7) as f64 * 10.0)
                    .with_temperature(5.0 + (i % 8) as f64 * 5.0)
                    .with_terrain(["City", "Highway", "Mixed"][i % 3])
                    .with_ac_usage(["On", "Off"][i % 2])
                    .with_driving_style(["Eco", "Moderate", "Aggressive"][i % 3])
            })
            .collect();
        let mut table = PredictionInput::batch_to_table(&inputs);
        let range: Vec<f64> = inputs
            .iter()
            .map(|i| i.available_energy_kwh() * 6.0 - 0.2 * (i.avg_speed_kmh - 60.0))
            .collect();
        table.numeric.insert(field::RANGE.to_string(), range);
        table
    }

    fn fitted_predictor() -> Predictor {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig::default();
        let data = training_table(180);

        let mut fb = FeatureBuilder::new();
        let (x, y) = fb.fit_transform(&data).unwrap();
        let outcome = Benchmark::new(&cfg).run(&x, &y).unwrap();
        let selection = select_artifact(
            &outcome.reports,
            outcome.models,
            &outcome.x_test,
            &outcome.y_test,
            &cfg,
        )
        .unwrap();
        let metadata = registry::RunMetadata {
            best_model: selection.best_model.clone(),
            model_type: selection.artifact.model_type().to_string(),
            test_r2: selection.test_r2,
            accuracy_pct: selection.accuracy_pct,
            n_features: fb.feature_names().unwrap().len(),
            n_samples: outcome.n_samples,
            trained_at: Utc::now(),
        };
        registry::save(
            dir.path(),
            &selection.artifact,
            &outcome.scaler,
            fb.feature_names().unwrap(),
            &outcome.reports,
            &metadata,
        )
        .unwrap();

        let bundle = registry::load(dir.path()).unwrap();
        Predictor::new(bundle, PredictionConfig::default())
    }

    #[test]
    fn validation_rejects_bad_inputs() {
        assert!(PredictionInput::new(0.0, 50.0).validate().is_err());
        assert!(PredictionInput::new(-10.0, 50.0).validate().is_err());
        assert!(PredictionInput::new(50.0, 120.0).validate().is_err());
        assert!(PredictionInput::new(50.0, -1.0).validate().is_err());
        assert!(PredictionInput::new(50.0, 80.0).validate().is_ok());
        assert!(PredictionInput::new(50.0, 80.0)
            .with_speed(-5.0)
            .validate()
            .is_err());
    }

    #[test]
    fn available_energy_matches_soc_fraction() {
        let input = PredictionInput::new(50.0, 80.0);
        assert_eq!(input.available_energy_kwh(), 40.0);
    }

    #[test]
    fn confidence_bands_follow_cutoffs() {
        let cfg = PredictionConfig::default();
        assert_eq!(confidence_band(200.0, &cfg), "high");
        assert_eq!(confidence_band(100.0, &cfg), "medium");
        assert_eq!(confidence_band(30.0, &cfg), "low");
        assert_eq!(confidence_band(150.0, &cfg), "medium");
        assert_eq!(confidence_band(50.0, &cfg), "low");
    }

    #[test]
    fn prediction_applies_safety_buffer() {
        let predictor = fitted_predictor();
        let input = PredictionInput::new(50.0, 80.0).with_speed(60.0);
        let prediction = predictor.predict(&input).unwrap();

        assert!(prediction.predicted_range_km > 0.0);
        let expected_safe = round2(prediction.predicted_range_km * 0.85);
        assert!((prediction.safe_range_km - expected_safe).abs() < 0.02);
        assert_eq!(prediction.available_energy_kwh, 40.0);
        assert!(["high", "medium", "low"].contains(&prediction.confidence.as_str()));
    }

    #[test]
    fn batch_and_single_predictions_agree() {
        let predictor = fitted_predictor();
        let a = PredictionInput::new(50.0, 80.0);
        let b = PredictionInput::new(40.0, 30.0).with_terrain("City");

        let batch = predictor.predict_batch(&[a.clone(), b.clone()]).unwrap();
        let single_a = predictor.predict(&a).unwrap();
        let single_b = predictor.predict(&b).unwrap();

        assert_eq!(batch[0].predicted_range_km, single_a.predicted_range_km);
        assert_eq!(batch[1].predicted_range_km, single_b.predicted_range_km);
    }

    #[test]
    fn invalid_input_in_batch_fails_the_batch() {
        let predictor = fitted_predictor();
        let err = predictor
            .predict_batch(&[
                PredictionInput::new(50.0, 80.0),
                PredictionInput::new(50.0, 150.0),
            ])
            .unwrap_err();
        assert!(err.to_string().contains("state of charge"));
    }

    #[test]
    fn empty_batch_is_empty() {
        let predictor = fitted_predictor();
        assert!(predictor.predict_batch(&[]).unwrap().is_empty());
    }
}
