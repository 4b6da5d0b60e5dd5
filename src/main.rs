use anyhow::Context;
use ev_battery_predictor::config::ServeConfig;
use ev_battery_predictor::features::{FeatureRecord, FEATURE_COLUMNS, FEATURE_COUNT};
use ev_battery_predictor::service::{self, PredictionService};
use ev_battery_predictor::store::ModelStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ev_battery_predictor::init_tracing();

    let cfg = ServeConfig::from_env();
    let store = ModelStore::new(&cfg.model_dir);
    let svc = PredictionService::load(&store)
        .with_context(|| format!("failed to load models from {}", cfg.model_dir.display()))?;

    // Warmup so the first request doesn't pay for lazy setup
    svc.predict_record(&FeatureRecord::from_values([0.0; FEATURE_COUNT]))
        .context("warmup prediction failed")?;
    tracing::info!("warmup forward ok");
    tracing::info!("loaded models; feat_list[{}]: {:?}", FEATURE_COUNT, FEATURE_COLUMNS);

    let app = service::router(Arc::new(svc));

    let addr = cfg.socket_addr();
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
