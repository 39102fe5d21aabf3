//! Charging recommendation endpoints.
//!
//! Given a trip distance and the model's consumption rate, work out how
//! much charge the trip needs over what the battery holds, and what adding
//! it costs in time and money.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    error::{ApiError, ApiJson},
    AppState,
};
use crate::config::{ChargingConfig, PredictionConfig};
use crate::predictor::{round2, PredictionInput};

/// A complete charging recommendation for one trip.
#[derive(Debug, Clone, Serialize)]
pub struct ChargePlan {
    /// Whether the trip is reachable on the current charge.
    pub is_reachable: bool,
    /// SoC the trip requires, including the energy reserve.
    pub required_battery_pct: f64,
    /// SoC to add on top of the current charge.
    pub charge_needed_pct: f64,
    pub energy_needed_kwh: f64,
    pub energy_to_add_kwh: f64,
    pub estimated_charging_time_minutes: f64,
    pub estimated_cost_inr: f64,
}

/// Compute the charging plan from unrounded physics, rounding only the
/// reported figures. The reserve fraction widens the energy requirement;
/// charging above the taper point uses the slower part of the curve.
pub fn charge_plan(
    trip_distance_km: f64,
    consumption_kwh_per_km: f64,
    battery_capacity_kwh: f64,
    current_soc_pct: f64,
    charger_power_kw: f64,
    prediction: &PredictionConfig,
    charging: &ChargingConfig,
) -> ChargePlan {
    let energy_needed =
        trip_distance_km * consumption_kwh_per_km / (1.0 - prediction.safety_buffer);
    let required_pct = (energy_needed / battery_capacity_kwh * 100.0).min(100.0);
    let charge_needed = (required_pct - current_soc_pct).max(0.0);

    let energy_to_add = charge_needed / 100.0 * battery_capacity_kwh;
    let power_fraction = if required_pct > charging.taper_above_soc_pct {
        charging.tapered_power_fraction
    } else {
        charging.nominal_power_fraction
    };
    let charging_minutes = if energy_to_add > 0.0 {
        energy_to_add / (charger_power_kw * power_fraction) * 60.0
    } else {
        0.0
    };

    ChargePlan {
        is_reachable: charge_needed == 0.0,
        required_battery_pct: round1(required_pct),
        charge_needed_pct: round1(charge_needed),
        energy_needed_kwh: round2(energy_needed),
        energy_to_add_kwh: round2(energy_to_add),
        estimated_charging_time_minutes: round1(charging_minutes),
        estimated_cost_inr: round2(energy_to_add * charging.price_per_kwh_inr),
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendChargeRequest {
    pub distance_to_destination_km: f64,
    pub battery_capacity_kwh: f64,
    pub current_battery_pct: f64,
    pub charger_power_kw: Option<f64>,
}

/// POST /api/recommend-charge
pub async fn recommend_charge(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RecommendChargeRequest>,
) -> Result<Json<Value>, ApiError> {
    respond(
        &state,
        request.battery_capacity_kwh,
        request.current_battery_pct,
        request.distance_to_destination_km,
        request.charger_power_kw,
    )
}

/// Legacy request shape for POST /recommend-charging.
#[derive(Debug, Deserialize)]
pub struct LegacyChargeRequest {
    pub battery_capacity: f64,
    pub current_soc: f64,
    #[serde(alias = "trip_distance")]
    pub distance_remaining: f64,
    pub charger_power: Option<f64>,
}

/// POST /recommend-charging (legacy)
pub async fn recommend_charge_legacy(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LegacyChargeRequest>,
) -> Result<Json<Value>, ApiError> {
    respond(
        &state,
        request.battery_capacity,
        request.current_soc,
        request.distance_remaining,
        request.charger_power,
    )
}

fn respond(
    state: &AppState,
    battery_capacity_kwh: f64,
    current_battery_pct: f64,
    distance_km: f64,
    charger_power_kw: Option<f64>,
) -> Result<Json<Value>, ApiError> {
    let input = PredictionInput::new(battery_capacity_kwh, current_battery_pct);
    input.validate()?;
    if !distance_km.is_finite() || distance_km <= 0.0 {
        return Err(ApiError::InvalidRequest(format!(
            "trip distance must be positive, got {distance_km}"
        )));
    }
    let charger_power_kw =
        charger_power_kw.unwrap_or(state.cfg.charging.default_charger_power_kw);
    if !charger_power_kw.is_finite() || charger_power_kw <= 0.0 {
        return Err(ApiError::InvalidRequest(format!(
            "charger power must be positive, got {charger_power_kw}"
        )));
    }

    let consumption = state.predictor.predict_consumption(&input)?;
    let plan = charge_plan(
        distance_km,
        consumption,
        battery_capacity_kwh,
        current_battery_pct,
        charger_power_kw,
        &state.cfg.prediction,
        &state.cfg.charging,
    );
    let metadata = &state.predictor.bundle().metadata;

    Ok(Json(json!({
        "success": true,
        "is_reachable": plan.is_reachable,
        "current_battery_pct": current_battery_pct,
        "required_battery_pct": plan.required_battery_pct,
        "charge_needed_pct": plan.charge_needed_pct,
        "estimated_charging_time_minutes": plan.estimated_charging_time_minutes,
        "energy_needed_kwh": plan.energy_needed_kwh,
        "energy_to_add_kwh": plan.energy_to_add_kwh,
        "estimated_cost_inr": plan.estimated_cost_inr,
        "model_accuracy": round2(metadata.accuracy_pct),
    })))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> (PredictionConfig, ChargingConfig) {
        (PredictionConfig::default(), ChargingConfig::default())
    }

    #[test]
    fn trip_beyond_current_charge_is_unreachable() {
        // 100 km at 0.15 kWh/km on a 50 kWh pack at 20%: the trip needs
        // 17.65 kWh with the reserve, i.e. 35.3% SoC, so 15.3% must be added.
        let (prediction, charging) = configs();
        let plan = charge_plan(100.0, 0.15, 50.0, 20.0, 50.0, &prediction, &charging);

        assert!(!plan.is_reachable);
        assert_eq!(plan.energy_needed_kwh, 17.65);
        assert_eq!(plan.required_battery_pct, 35.3);
        assert_eq!(plan.charge_needed_pct, 15.3);
        assert_eq!(plan.energy_to_add_kwh, 7.65);
        assert_eq!(plan.estimated_cost_inr, 152.94);
        // 7.647 kWh at 50 kW * 0.85 nominal fraction is about 10.8 minutes.
        assert_eq!(plan.estimated_charging_time_minutes, 10.8);
    }

    #[test]
    fn legacy_field_names_deserialize() {
        // The original clients post distance_remaining.
        let request: LegacyChargeRequest = serde_json::from_value(json!({
            "battery_capacity": 50.0,
            "current_soc": 20.0,
            "distance_remaining": 100.0,
        }))
        .unwrap();
        assert_eq!(request.distance_remaining, 100.0);

        // trip_distance is kept as an alias.
        let request: LegacyChargeRequest = serde_json::from_value(json!({
            "battery_capacity": 50.0,
            "current_soc": 20.0,
            "trip_distance": 80.0,
        }))
        .unwrap();
        assert_eq!(request.distance_remaining, 80.0);
    }

    #[test]
    fn sufficient_charge_is_reachable_without_charging() {
        let (prediction, charging) = configs();
        let plan = charge_plan(50.0, 0.15, 50.0, 80.0, 50.0, &prediction, &charging);

        assert!(plan.is_reachable);
        assert_eq!(plan.charge_needed_pct, 0.0);
        assert_eq!(plan.energy_to_add_kwh, 0.0);
        assert_eq!(plan.estimated_charging_time_minutes, 0.0);
        assert_eq!(plan.estimated_cost_inr, 0.0);
    }

    #[test]
    fn required_soc_is_capped_at_full() {
        let (prediction, charging) = configs();
        // 1000 km needs far more than the pack holds.
        let plan = charge_plan(1000.0, 0.2, 40.0, 10.0, 50.0, &prediction, &charging);
        assert_eq!(plan.required_battery_pct, 100.0);
        assert_eq!(plan.charge_needed_pct, 90.0);
    }

    #[test]
    fn charging_above_taper_point_is_slower() {
        let (prediction, charging) = configs();
        // Requires ~88% SoC, past the 80% taper point.
        let tapered = charge_plan(250.0, 0.15, 50.0, 10.0, 50.0, &prediction, &charging);
        assert!(tapered.required_battery_pct > charging.taper_above_soc_pct);

        // Same charger below the taper point moves energy faster.
        let nominal = charge_plan(100.0, 0.15, 50.0, 0.0, 50.0, &prediction, &charging);
        let tapered_rate =
            tapered.energy_to_add_kwh / tapered.estimated_charging_time_minutes;
        let nominal_rate =
            nominal.energy_to_add_kwh / nominal.estimated_charging_time_minutes;
        assert!(tapered_rate < nominal_rate);
    }

    #[test]
    fn cost_scales_with_energy_added() {
        let (prediction, charging) = configs();
        let plan = charge_plan(200.0, 0.15, 50.0, 0.0, 50.0, &prediction, &charging);
        assert!((plan.estimated_cost_inr
            - round2(plan.energy_to_add_kwh * charging.price_per_kwh_inr))
        .abs()
            < 0.2);
    }
}
