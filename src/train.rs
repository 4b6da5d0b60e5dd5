//! Offline fitting of the four predictors.

use crate::dataset::TrainingTable;
use crate::error::{Result, TrainingDataError};
use crate::features::FeatureRecord;
use crate::metrics::Evaluation;
use crate::model::{ForestParams, Predictor, Target, TrainedModel};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Row indices of one train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Seeded shuffle split: `round(n * test_fraction)` rows are held out.
///
/// The same `(n, test_fraction, seed)` always yields the same partition.
pub fn train_test_split(
    n_samples: usize,
    test_fraction: f64,
    seed: u64,
) -> std::result::Result<Split, TrainingDataError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(TrainingDataError::InvalidSplit(test_fraction));
    }
    let n_test = (n_samples as f64 * test_fraction).round() as usize;
    let n_train = n_samples - n_test;

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test = indices.split_off(n_train);
    Ok(Split {
        train: indices,
        test,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainerOptions {
    pub test_fraction: f64,
    pub seed: u64,
    pub n_trees: u16,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            n_trees: 300,
        }
    }
}

/// The four fitted predictors, one per target.
#[derive(Debug)]
pub struct TrainedModels {
    pub usage: TrainedModel,
    pub lifespan: TrainedModel,
    pub degradation: TrainedModel,
    pub recommendation: TrainedModel,
}

impl TrainedModels {
    pub fn get(&self, target: Target) -> &TrainedModel {
        match target {
            Target::Usage => &self.usage,
            Target::Lifespan => &self.lifespan,
            Target::Degradation => &self.degradation,
            Target::Recommendation => &self.recommendation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: Target,
    pub train_rows: usize,
    pub test_rows: usize,
    /// `None` when the held-out partition was empty.
    pub evaluation: Option<Evaluation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub rows: usize,
    pub seed: u64,
    pub test_fraction: f64,
    pub n_trees: u16,
    pub targets: Vec<TargetReport>,
}

pub struct Trainer {
    options: TrainerOptions,
}

impl Trainer {
    pub fn new(options: TrainerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }

    /// Partition for `target`. Every target is split with the configured
    /// seed, so partitions are reproducible run to run.
    pub fn split(&self, n_samples: usize, target: Target) -> Result<Split> {
        let split = train_test_split(n_samples, self.options.test_fraction, self.options.seed)?;
        if split.train.is_empty() {
            return Err(TrainingDataError::InsufficientData {
                target: target.column().to_string(),
            }
            .into());
        }
        Ok(split)
    }

    pub fn train(&self, table: &TrainingTable) -> Result<(TrainedModels, TrainingReport)> {
        if table.is_empty() {
            return Err(TrainingDataError::EmptyDataset.into());
        }
        let features = table.features();
        let forest = ForestParams {
            n_trees: self.options.n_trees,
            seed: self.options.seed,
        };

        let mut reports = Vec::with_capacity(Target::ALL.len());
        let mut fit = |target: Target| -> Result<TrainedModel> {
            let (model, report) = self.fit_target(table, &features, target, forest)?;
            reports.push(report);
            Ok(model)
        };
        let models = TrainedModels {
            usage: fit(Target::Usage)?,
            lifespan: fit(Target::Lifespan)?,
            degradation: fit(Target::Degradation)?,
            recommendation: fit(Target::Recommendation)?,
        };

        let report = TrainingReport {
            rows: table.len(),
            seed: self.options.seed,
            test_fraction: self.options.test_fraction,
            n_trees: self.options.n_trees,
            targets: reports,
        };
        Ok((models, report))
    }

    fn fit_target(
        &self,
        table: &TrainingTable,
        features: &[FeatureRecord],
        target: Target,
        forest: ForestParams,
    ) -> Result<(TrainedModel, TargetReport)> {
        let split = self.split(table.len(), target)?;
        let y = table.target_values(target);
        let pick_x = |idx: &[usize]| idx.iter().map(|&i| features[i]).collect::<Vec<_>>();
        let pick_y = |idx: &[usize]| idx.iter().map(|&i| y[i]).collect::<Vec<_>>();

        let (x_train, x_test) = (pick_x(&split.train), pick_x(&split.test));
        let y_test = pick_y(&split.test);

        tracing::info!(
            column = target.column(),
            train = split.train.len(),
            test = split.test.len(),
            "fitting model"
        );
        let model = if target.is_classification() {
            let labels = table.labels();
            let y_train: Vec<u32> = split.train.iter().map(|&i| labels[i]).collect();
            TrainedModel::fit_classifier(target, &x_train, &y_train, forest)?
        } else {
            TrainedModel::fit_regressor(target, &x_train, &pick_y(&split.train), forest)?
        };

        let evaluation = if x_test.is_empty() {
            tracing::warn!(
                column = target.column(),
                "held-out partition is empty; skipping evaluation"
            );
            None
        } else {
            let y_pred = model.predict_batch(&x_test)?;
            let eval = if target.is_classification() {
                Evaluation::classification(&y_test, &y_pred)
            } else {
                Evaluation::regression(&y_test, &y_pred)
            };
            match eval {
                Evaluation::Regression { mae, mse, r2 } => tracing::info!(
                    "{} evaluation: MAE: {:.4}, MSE: {:.4}, R²: {:.4}",
                    target,
                    mae,
                    mse,
                    r2
                ),
                Evaluation::Classification { accuracy } => {
                    tracing::info!("{} accuracy: {:.4}", target, accuracy)
                }
            }
            Some(eval)
        };

        let report = TargetReport {
            target,
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            evaluation,
        };
        Ok((model, report))
    }
}
