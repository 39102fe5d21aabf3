use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub pipeline: PipelineConfig,
    pub prediction: PredictionConfig,
    pub charging: ChargingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            enable_cors: true,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub consumption_csv: String,
    pub stations_csv: String,
    pub processed_dir: String,
    pub models_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            consumption_csv: "data/raw/ev_consumption.csv".to_string(),
            stations_csv: "data/raw/ev_stations.csv".to_string(),
            processed_dir: "data/processed".to_string(),
            models_dir: "models".to_string(),
        }
    }
}

/// Policy knobs for cleaning, training and model selection.
///
/// The defaults match the values the pipeline has always shipped with, but
/// every threshold is tunable here rather than baked into the stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hold-out fraction for the train/test split.
    pub test_size: f64,
    /// Seed for the shuffled split and tree ensembles.
    pub seed: u64,
    pub cv_folds: usize,
    /// Target outlier clip bounds, as quantiles of `Range_km`.
    pub outlier_lower_quantile: f64,
    pub outlier_upper_quantile: f64,
    pub soc_min_pct: f64,
    pub soc_max_pct: f64,
    pub temperature_min_c: f64,
    pub temperature_max_c: f64,
    /// Ensembling kicks in when best accuracy (test R^2 * 100) is below this.
    pub ensemble_trigger_accuracy_pct: f64,
    pub ensemble_top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            cv_folds: 5,
            outlier_lower_quantile: 0.01,
            outlier_upper_quantile: 0.99,
            soc_min_pct: 0.0,
            soc_max_pct: 100.0,
            temperature_min_c: -20.0,
            temperature_max_c: 60.0,
            ensemble_trigger_accuracy_pct: 98.0,
            ensemble_top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Fractional reserve subtracted from the raw predicted range.
    pub safety_buffer: f64,
    /// Confidence band cutoffs on predicted range (km).
    pub high_confidence_km: f64,
    pub medium_confidence_km: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            safety_buffer: 0.15,
            high_confidence_km: 150.0,
            medium_confidence_km: 50.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChargingConfig {
    pub default_charger_power_kw: f64,
    pub price_per_kwh_inr: f64,
    /// Above this target SoC the charging curve tapers.
    pub taper_above_soc_pct: f64,
    /// Effective charger power fraction above / below the taper point.
    pub tapered_power_fraction: f64,
    pub nominal_power_fraction: f64,
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            default_charger_power_kw: 50.0,
            price_per_kwh_inr: 20.0,
            taper_above_soc_pct: 80.0,
            tapered_power_fraction: 0.6,
            nominal_power_fraction: 0.85,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("CHARGEPILOT__").split("__"));
        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.pipeline.test_size, 0.2);
        assert_eq!(cfg.pipeline.seed, 42);
        assert_eq!(cfg.pipeline.ensemble_trigger_accuracy_pct, 98.0);
        assert_eq!(cfg.prediction.safety_buffer, 0.15);
        assert_eq!(cfg.charging.default_charger_power_kw, 50.0);
    }

    #[test]
    fn socket_addr_parses() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 5001);
    }
}
