use anyhow::{Context, Result};
use tracing::info;

use chargepilot::config::Config;
use chargepilot::pipeline;
use chargepilot::telemetry;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load().context("failed to load configuration")?;
    let metadata = pipeline::run(&cfg)?;

    info!(
        model = metadata.best_model,
        model_type = metadata.model_type,
        accuracy_pct = format!("{:.2}", metadata.accuracy_pct),
        n_samples = metadata.n_samples,
        "training run complete"
    );
    Ok(())
}
