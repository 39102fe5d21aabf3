//! Pipeline error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the offline pipeline stages and by bundle loading.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("target column 'Range_km' not found after column mapping")]
    MissingTarget,

    #[error("missing essential station columns: {0:?}")]
    MissingEssentialFields(Vec<String>),

    #[error("feature builder used before fit; no feature ordering exists")]
    NotFitted,

    #[error("scaler used before fit")]
    ScalerNotFitted,

    #[error("no trained model survived the benchmark")]
    NoUsableModel,

    #[error("no compatible model artifact found; searched: {0:?}")]
    NoModelArtifact(Vec<PathBuf>),

    #[error("model produced invalid consumption: {0} kWh/km (must be > 0)")]
    InvalidModelOutput(f64),

    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    #[error("invalid prediction input: {0}")]
    InvalidInput(String),
}
