use anyhow::Context;
use ev_battery_predictor::config::TrainConfig;
use ev_battery_predictor::metrics::Evaluation;
use ev_battery_predictor::pipeline;

fn main() -> anyhow::Result<()> {
    ev_battery_predictor::init_tracing();

    let cfg = TrainConfig::from_env().context("invalid training configuration")?;
    tracing::info!(?cfg, "starting training run");

    let report = pipeline::run_training(&cfg)
        .with_context(|| format!("training from {} failed", cfg.raw_dataset.display()))?;

    for t in &report.targets {
        match t.evaluation {
            Some(Evaluation::Regression { mae, mse, r2 }) => println!(
                "{}: MAE: {:.4}, MSE: {:.4}, R²: {:.4} (train={}, test={})",
                t.target, mae, mse, r2, t.train_rows, t.test_rows
            ),
            Some(Evaluation::Classification { accuracy }) => println!(
                "{}: accuracy: {:.4} (train={}, test={})",
                t.target, accuracy, t.train_rows, t.test_rows
            ),
            None => println!("{}: not evaluated (empty held-out set)", t.target),
        }
    }
    Ok(())
}
