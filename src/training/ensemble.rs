//! R^2-weighted ensembling and final model selection.
//!
//! When the best single model misses the accuracy bar, the top candidates
//! are blended with weights proportional to their test R^2. The blend only
//! replaces the single model if it strictly improves test R^2.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use super::{candidates, r2_score, ModelReport, Regressor};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// One weighted member of an ensemble.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnsembleMember {
    pub name: String,
    pub weight: f64,
    pub model: Regressor,
}

/// A fixed-weight blend of fitted regressors. Weights sum to 1.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnsembleBundle {
    pub members: Vec<EnsembleMember>,
}

impl EnsembleBundle {
    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let matrix = candidates::to_matrix(x)?;
        let mut blended = vec![0.0; x.len()];
        for member in &self.members {
            let preds = member.model.predict(&matrix)?;
            for (b, p) in blended.iter_mut().zip(preds) {
                *b += member.weight * p;
            }
        }
        Ok(blended)
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }
}

/// The artifact the pipeline ships: either the single best model or an
/// ensemble that beat it.
#[derive(Debug, Serialize, Deserialize)]
pub enum SelectedArtifact {
    Single { name: String, model: Regressor },
    Ensemble(EnsembleBundle),
}

impl SelectedArtifact {
    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        match self {
            SelectedArtifact::Single { model, .. } => model.predict_rows(x),
            SelectedArtifact::Ensemble(bundle) => bundle.predict(x),
        }
    }

    pub fn model_type(&self) -> &'static str {
        match self {
            SelectedArtifact::Single { .. } => "single",
            SelectedArtifact::Ensemble(_) => "ensemble",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SelectedArtifact::Single { name, .. } => name.clone(),
            SelectedArtifact::Ensemble(bundle) => {
                format!("ensemble({})", bundle.member_names().join("+"))
            }
        }
    }
}

/// Outcome of model selection, fed to the registry.
pub struct Selection {
    pub artifact: SelectedArtifact,
    /// Name of the best single model, whether or not it was promoted.
    pub best_model: String,
    pub test_r2: f64,
    pub accuracy_pct: f64,
}

/// Normalize test-R^2 scores into ensemble weights. Scores are clamped at
/// zero first; a member with no positive score gets no weight.
pub fn normalized_weights(scores: &[f64]) -> Vec<f64> {
    let clamped: Vec<f64> = scores.iter().map(|s| s.max(0.0)).collect();
    let total: f64 = clamped.iter().sum();
    if total <= 0.0 {
        return vec![0.0; scores.len()];
    }
    clamped.into_iter().map(|s| s / total).collect()
}

/// Pick the shipping artifact from a ranked benchmark.
///
/// The ensemble path triggers only when the best single accuracy is below
/// the configured bar, and the blend is promoted only when it strictly
/// beats the best single test R^2.
pub fn select_artifact(
    reports: &[ModelReport],
    mut models: HashMap<String, Regressor>,
    x_test: &[Vec<f64>],
    y_test: &[f64],
    cfg: &PipelineConfig,
) -> Result<Selection> {
    let best = reports.first().ok_or(PipelineError::NoUsableModel)?;
    let best_name = best.name.clone();
    let best_r2 = best.test_r2;

    let single = |models: &mut HashMap<String, Regressor>| -> Result<Selection> {
        let model = models
            .remove(&best_name)
            .ok_or(PipelineError::NoUsableModel)?;
        Ok(Selection {
            artifact: SelectedArtifact::Single {
                name: best_name.clone(),
                model,
            },
            best_model: best_name.clone(),
            test_r2: best_r2,
            accuracy_pct: best_r2 * 100.0,
        })
    };

    if best.accuracy_pct >= cfg.ensemble_trigger_accuracy_pct {
        info!(
            model = best.name,
            accuracy_pct = best.accuracy_pct,
            "best model meets the accuracy bar; shipping it alone"
        );
        return single(&mut models);
    }

    let top: Vec<&ModelReport> = reports.iter().take(cfg.ensemble_top_k).collect();
    if top.len() < 2 {
        return single(&mut models);
    }
    let scores: Vec<f64> = top.iter().map(|r| r.test_r2).collect();
    let weights = normalized_weights(&scores);
    if weights.iter().sum::<f64>() <= 0.0 {
        return single(&mut models);
    }

    // Score the blend on the held-out split before deciding to keep it.
    // Models stay in the map until the blend wins; they are only borrowed
    // here.
    let matrix = candidates::to_matrix(x_test)?;
    let mut blended = vec![0.0; x_test.len()];
    for (report, weight) in top.iter().zip(&weights) {
        let model = models
            .get(&report.name)
            .ok_or(PipelineError::NoUsableModel)?;
        let preds = model.predict(&matrix)?;
        for (b, p) in blended.iter_mut().zip(preds) {
            *b += weight * p;
        }
    }
    let ensemble_r2 = r2_score(&blended, y_test);

    if ensemble_r2 > best_r2 {
        info!(
            members = ?top.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            ensemble_r2,
            best_r2,
            "ensemble beats the best single model; shipping the blend"
        );
        let mut members = Vec::with_capacity(top.len());
        for (report, weight) in top.iter().zip(weights) {
            let model = models
                .remove(&report.name)
                .ok_or(PipelineError::NoUsableModel)?;
            members.push(EnsembleMember {
                name: report.name.clone(),
                weight,
                model,
            });
        }
        return Ok(Selection {
            artifact: SelectedArtifact::Ensemble(EnsembleBundle { members }),
            best_model: best_name,
            test_r2: ensemble_r2,
            accuracy_pct: ensemble_r2 * 100.0,
        });
    }

    info!(
        ensemble_r2,
        best_r2, "ensemble did not improve on the best single model"
    );
    single(&mut models)
}
