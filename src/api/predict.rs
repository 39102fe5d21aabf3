//! Range prediction endpoints.
//!
//! The model predicts energy consumption per kilometre; range falls out of
//! the battery's available energy divided by that rate, and the headline
//! figure carries the safety buffer.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    error::{ApiError, ApiJson},
    AppState,
};
use crate::config::PredictionConfig;
use crate::predictor::{confidence_band, round2, PredictionInput};

/// Range figures derived from available energy and a consumption rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeEstimate {
    pub max_range_km: f64,
    pub safe_range_km: f64,
}

/// Convert available energy and consumption into range. The safety buffer
/// is applied before rounding so the two figures stay consistent.
pub fn range_estimate(
    available_energy_kwh: f64,
    consumption_kwh_per_km: f64,
    cfg: &PredictionConfig,
) -> RangeEstimate {
    let max_range = available_energy_kwh / consumption_kwh_per_km;
    let safe_range = max_range * (1.0 - cfg.safety_buffer);
    RangeEstimate {
        max_range_km: round2(max_range),
        safe_range_km: round2(safe_range),
    }
}

/// AC usage arrives as a boolean from some clients and as "On"/"Off" text
/// from others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AcUsage {
    Flag(bool),
    Text(String),
}

impl Default for AcUsage {
    fn default() -> Self {
        AcUsage::Flag(false)
    }
}

impl AcUsage {
    pub fn as_label(&self) -> String {
        match self {
            AcUsage::Flag(true) => "On".to_string(),
            AcUsage::Flag(false) => "Off".to_string(),
            AcUsage::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRangeRequest {
    pub battery_percentage: f64,
    pub battery_capacity_kwh: f64,
    #[serde(default = "default_speed")]
    pub avg_speed_kmh: f64,
    #[serde(default = "default_temperature")]
    pub temperature_celsius: f64,
    #[serde(default)]
    pub ac_usage: AcUsage,
    #[serde(default = "default_terrain")]
    pub terrain: String,
    #[serde(default = "default_driving_mode")]
    pub driving_mode: String,
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
fn default_driving_mode() -> String {
    "Moderate".to_string()
}

impl PredictRangeRequest {
    pub fn into_input(self) -> PredictionInput {
        PredictionInput::new(self.battery_capacity_kwh, self.battery_percentage)
            .with_speed(self.avg_speed_kmh)
            .with_temperature(self.temperature_celsius)
            .with_terrain(self.terrain)
            .with_ac_usage(self.ac_usage.as_label())
            .with_driving_style(self.driving_mode)
    }
}

/// POST /api/predict-range
pub async fn predict_range(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PredictRangeRequest>,
) -> Result<Json<Value>, ApiError> {
    respond(&state, request.into_input())
}

/// Older clients post the same request under different field names, with
/// AC usage inferred from the ambient temperature.
#[derive(Debug, Deserialize)]
pub struct LegacyPredictRequest {
    pub battery_capacity: f64,
    #[serde(alias = "current_soc")]
    pub battery_percent: f64,
    #[serde(default = "default_speed", alias = "avg_speed")]
    pub speed: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_terrain")]
    pub terrain: String,
    #[serde(default = "default_driving_mode")]
    pub driving_style: String,
}

impl LegacyPredictRequest {
    pub fn into_input(self) -> PredictionInput {
        let ac_usage = if self.temperature > 30.0 { "On" } else { "Off" };
        PredictionInput::new(self.battery_capacity, self.battery_percent)
            .with_speed(self.speed)
            .with_temperature(self.temperature)
            .with_terrain(self.terrain)
            .with_ac_usage(ac_usage)
            .with_driving_style(self.driving_style)
    }
}

/// POST /predict (legacy)
pub async fn predict_legacy(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LegacyPredictRequest>,
) -> Result<Json<Value>, ApiError> {
    respond(&state, request.into_input())
}

fn respond(state: &AppState, input: PredictionInput) -> Result<Json<Value>, ApiError> {
    input.validate()?;
    let consumption = state.predictor.predict_consumption(&input)?;

    let available = input.available_energy_kwh();
    let estimate = range_estimate(available, consumption, &state.cfg.prediction);
    let confidence = confidence_band(estimate.max_range_km, &state.cfg.prediction);
    let metadata = &state.predictor.bundle().metadata;

    Ok(Json(json!({
        "success": true,
        "predicted_range_km": estimate.safe_range_km,
        "max_range_km": estimate.max_range_km,
        "consumption_kwh_per_100km": round2(consumption * 100.0),
        "available_energy_kwh": round2(available),
        "safety_buffer_percent": round2(state.cfg.prediction.safety_buffer * 100.0),
        "confidence": confidence,
        "model_accuracy": round2(metadata.accuracy_pct),
    })))
}
