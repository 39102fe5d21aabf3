pub mod charge;
pub mod error;
pub mod health;
pub mod predict;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::Config;
use crate::predictor::Predictor;

/// Shared handler state: the loaded model plus the service configuration.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub predictor: Arc<Predictor>,
}

pub fn router(state: AppState, cfg: &Config) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health))
        .route("/api/model-info", get(health::model_info))
        .route("/api/predict-range", post(predict::predict_range))
        .route("/api/recommend-charge", post(charge::recommend_charge))
        // Older clients still post to the unversioned paths.
        .route("/predict", post(predict::predict_legacy))
        .route("/recommend-charging", post(charge::recommend_charge_legacy))
        .with_state(state);

    if cfg.server.enable_cors {
        use tower_http::cors::{Any, CorsLayer};
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]);
        router = router.layer(cors);
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    cfg.server.request_timeout_secs,
                ))),
        )
        .layer(TraceLayer::new_for_http())
}
