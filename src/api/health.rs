use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use super::AppState;
use crate::predictor::round2;

/// Liveness probe. Reports the serving artifact's headline figures.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let bundle = state.predictor.bundle();
    let metadata = &bundle.metadata;
    Json(json!({
        "status": "healthy",
        "model_loaded": true,
        "model_type": metadata.model_type,
        "accuracy": round2(metadata.accuracy_pct),
        "features": metadata.n_features,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Everything a client needs to know about the serving artifact.
pub async fn model_info(State(state): State<AppState>) -> Json<Value> {
    let bundle = state.predictor.bundle();
    let metadata = &bundle.metadata;
    Json(json!({
        "success": true,
        "model_type": metadata.model_type,
        "best_model": metadata.best_model,
        "accuracy_percent": round2(metadata.accuracy_pct),
        "r2_score": metadata.test_r2,
        "n_features": metadata.n_features,
        "n_samples": metadata.n_samples,
        "trained_at": metadata.trained_at.to_rfc3339(),
        "feature_names": bundle.feature_info.feature_names,
        "target": bundle.feature_info.target_column,
    }))
}
