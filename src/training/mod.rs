//! Model training and benchmarking.
//!
//! [`Benchmark::run`] takes a feature matrix and target, holds out a seeded
//! test split, standardizes on the training split only, fits every
//! candidate in the lineup, and scores each on identical data so the
//! reports are directly comparable.

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::features::StandardScaler;

pub mod candidates;
pub mod ensemble;

pub use candidates::{CandidateKind, Regressor};

/// Core regression error metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
    pub r2: f64,
}

/// Compute MAE/RMSE/MAPE/R^2 for a prediction vector. MAPE skips targets
/// too close to zero to divide by.
pub fn validation_metrics(predictions: &[f64], actuals: &[f64]) -> Result<ValidationMetrics> {
    if predictions.len() != actuals.len() || actuals.is_empty() {
        anyhow::bail!(
            "metric input mismatch: {} predictions vs {} actuals",
            predictions.len(),
            actuals.len()
        );
    }
    let n = actuals.len() as f64;

    let mae = predictions
        .iter()
        .zip(actuals)
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / n;

    let mse = predictions
        .iter()
        .zip(actuals)
        .map(|(p, a)| (p - a) * (p - a))
        .sum::<f64>()
        / n;

    let mut mape_terms = 0usize;
    let mape_sum: f64 = predictions
        .iter()
        .zip(actuals)
        .filter(|(_, a)| a.abs() > 1e-10)
        .map(|(p, a)| {
            mape_terms += 1;
            ((p - a) / a).abs()
        })
        .sum();
    let mape = if mape_terms > 0 {
        mape_sum / mape_terms as f64 * 100.0
    } else {
        0.0
    };

    Ok(ValidationMetrics {
        mae,
        rmse: mse.sqrt(),
        mape,
        r2: r2_score(predictions, actuals),
    })
}

/// Coefficient of determination. A constant target yields 0.0 rather than a
/// division by zero.
pub fn r2_score(predictions: &[f64], actuals: &[f64]) -> f64 {
    let n = actuals.len() as f64;
    let mean = actuals.iter().sum::<f64>() / n;
    let ss_tot: f64 = actuals.iter().map(|a| (a - mean) * (a - mean)).sum();
    if ss_tot < 1e-10 {
        return 0.0;
    }
    let ss_res: f64 = predictions
        .iter()
        .zip(actuals)
        .map(|(p, a)| (a - p) * (a - p))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Seeded shuffled train/test split over row indices.
pub fn train_test_split(
    x: &[Vec<f64>],
    y: &[f64],
    test_size: f64,
    seed: u64,
) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
    let mut indices: Vec<usize> = (0..x.len()).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((x.len() as f64) * test_size).round() as usize;
    let n_test = n_test.clamp(1, x.len().saturating_sub(1).max(1));
    let (test_idx, train_idx) = indices.split_at(n_test);

    let pick_x = |idx: &[usize]| idx.iter().map(|&i| x[i].clone()).collect::<Vec<_>>();
    let pick_y = |idx: &[usize]| idx.iter().map(|&i| y[i]).collect::<Vec<_>>();

    (pick_x(train_idx), pick_x(test_idx), pick_y(train_idx), pick_y(test_idx))
}

/// Per-candidate benchmark results, serialized into the metrics artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub name: String,
    pub train_r2: f64,
    pub test_r2: f64,
    pub cv_r2_mean: f64,
    pub cv_r2_std: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
    pub training_time_s: f64,
    pub inference_ms: f64,
    /// Headline accuracy figure: test R^2 expressed as a percentage.
    pub accuracy_pct: f64,
}

/// Everything a benchmark run produces: ranked reports, the fitted models
/// keyed by name, the fitted scaler, and the scaled test split for model
/// selection.
pub struct BenchmarkOutcome {
    pub reports: Vec<ModelReport>,
    pub models: HashMap<String, Regressor>,
    pub scaler: StandardScaler,
    pub x_test: Vec<Vec<f64>>,
    pub y_test: Vec<f64>,
    pub n_samples: usize,
}

pub struct Benchmark<'a> {
    cfg: &'a PipelineConfig,
}

impl<'a> Benchmark<'a> {
    pub fn new(cfg: &'a PipelineConfig) -> Self {
        Self { cfg }
    }

    /// Fit and score the full candidate lineup. Candidates that fail to fit
    /// are logged and excluded; only all of them failing is an error.
    pub fn run(&self, x: &[Vec<f64>], y: &[f64]) -> Result<BenchmarkOutcome> {
        if x.is_empty() || x.len() != y.len() {
            return Err(PipelineError::EmptyDataset(format!(
                "benchmark needs matching non-empty features and target, got {} x {}",
                x.len(),
                y.len()
            ))
            .into());
        }

        let (x_train, x_test, y_train, y_test) =
            train_test_split(x, y, self.cfg.test_size, self.cfg.seed);

        let mut scaler = StandardScaler::new();
        let x_train = scaler.fit_transform(&x_train)?;
        let x_test = scaler.transform(&x_test)?;

        let train_matrix = candidates::to_matrix(&x_train)?;
        let test_matrix = candidates::to_matrix(&x_test)?;

        let mut reports = Vec::new();
        let mut models = HashMap::new();

        for kind in CandidateKind::ALL {
            let started = Instant::now();
            let model = match kind.fit(&train_matrix, &y_train, self.cfg.seed) {
                Ok(m) => m,
                Err(err) => {
                    warn!(model = kind.name(), %err, "candidate failed to fit; excluded");
                    continue;
                }
            };
            let training_time_s = started.elapsed().as_secs_f64();

            let train_preds = model.predict(&train_matrix)?;
            let test_preds = model.predict(&test_matrix)?;
            let metrics = validation_metrics(&test_preds, &y_test)?;

            let (cv_r2_mean, cv_r2_std) = self.cross_validate(kind, &x_train, &y_train)?;
            let inference_ms = time_inference(&model, &x_test)?;

            let report = ModelReport {
                name: kind.name().to_string(),
                train_r2: r2_score(&train_preds, &y_train),
                test_r2: metrics.r2,
                cv_r2_mean,
                cv_r2_std,
                rmse: metrics.rmse,
                mae: metrics.mae,
                mape: metrics.mape,
                training_time_s,
                inference_ms,
                accuracy_pct: metrics.r2 * 100.0,
            };
            info!(
                model = report.name,
                test_r2 = report.test_r2,
                cv_r2_mean = report.cv_r2_mean,
                rmse = report.rmse,
                "candidate benchmarked"
            );
            reports.push(report);
            models.insert(kind.name().to_string(), model);
        }

        if reports.is_empty() {
            return Err(PipelineError::NoUsableModel.into());
        }

        // Best test R^2 first.
        reports.sort_by(|a, b| b.test_r2.total_cmp(&a.test_r2));

        Ok(BenchmarkOutcome {
            reports,
            models,
            scaler,
            x_test,
            y_test,
            n_samples: x.len(),
        })
    }

    /// K-fold CV with contiguous folds over the (already scaled) training
    /// split. Returns (mean, std) of the per-fold test R^2.
    fn cross_validate(
        &self,
        kind: CandidateKind,
        x_train: &[Vec<f64>],
        y_train: &[f64],
    ) -> Result<(f64, f64)> {
        let folds = self.cfg.cv_folds.max(2);
        if x_train.len() < folds * 2 {
            // Too little data to cross-validate meaningfully.
            return Ok((0.0, 0.0));
        }

        let fold_size = x_train.len() / folds;
        let mut scores = Vec::with_capacity(folds);
        for fold in 0..folds {
            let start = fold * fold_size;
            let end = if fold == folds - 1 {
                x_train.len()
            } else {
                start + fold_size
            };

            let mut fit_x = Vec::with_capacity(x_train.len() - (end - start));
            let mut fit_y = Vec::with_capacity(fit_x.capacity());
            for i in (0..x_train.len()).filter(|i| *i < start || *i >= end) {
                fit_x.push(x_train[i].clone());
                fit_y.push(y_train[i]);
            }

            let model = match kind.fit(&candidates::to_matrix(&fit_x)?, &fit_y, self.cfg.seed) {
                Ok(m) => m,
                Err(err) => {
                    warn!(model = kind.name(), fold, %err, "CV fold fit failed; scored 0");
                    scores.push(0.0);
                    continue;
                }
            };
            let preds = model.predict_rows(&x_train[start..end])?;
            scores.push(r2_score(&preds, &y_train[start..end]));
        }

        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let var = scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
        Ok((mean, var.sqrt()))
    }
}

/// Average single-row latency over at most 100 test rows.
fn time_inference(model: &Regressor, x_test: &[Vec<f64>]) -> Result<f64> {
    let sample = &x_test[..x_test.len().min(100)];
    if sample.is_empty() {
        return Ok(0.0);
    }
    let started = Instant::now();
    for row in sample {
        model.predict_rows(std::slice::from_ref(row))?;
    }
    Ok(started.elapsed().as_secs_f64() * 1000.0 / sample.len() as f64)
}
