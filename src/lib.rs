//! EV battery usage, lifespan, degradation and charging-recommendation
//! prediction.
//!
//! Offline, [`pipeline::run_training`] prepares a raw CSV dataset, fits the
//! four random-forest predictors and persists them with the feature codec.
//! Online, [`service::PredictionService`] loads those artifacts once and
//! serves predictions over HTTP.

pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod train;
pub mod types;

pub use error::{Error, Result};

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
