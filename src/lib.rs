//! EV range prediction and charging recommendation service.
//!
//! The offline side ([`pipeline`]) cleans raw trip data, benchmarks a
//! lineup of regressors and persists the winning artifact; the online side
//! ([`api`]) serves range predictions and charging plans from it.

pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod predictor;
pub mod registry;
pub mod telemetry;
pub mod training;
