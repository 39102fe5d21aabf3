use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use chargepilot::api::{self, AppState};
use chargepilot::config::Config;
use chargepilot::predictor::Predictor;
use chargepilot::registry;
use chargepilot::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load().context("failed to load configuration")?;

    let bundle = registry::load(&cfg.data.models_dir)
        .context("no serving model; run chargepilot-train first")?;
    info!(
        model = bundle.metadata.best_model,
        model_type = bundle.metadata.model_type,
        accuracy_pct = format!("{:.2}", bundle.metadata.accuracy_pct),
        "serving model loaded"
    );

    let predictor = Predictor::new(bundle, cfg.prediction.clone());
    let state = AppState {
        cfg: Arc::new(cfg.clone()),
        predictor: Arc::new(predictor),
    };
    let app = api::router(state, &cfg);

    let addr = cfg.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    Ok(())
}
