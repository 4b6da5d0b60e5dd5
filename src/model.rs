use crate::error::{PredictError, TrainingDataError};
use crate::features::FeatureRecord;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;

type Regressor = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type Classifier = RandomForestClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// One of the four independently trained outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    Usage,
    Lifespan,
    Degradation,
    Recommendation,
}

impl Target {
    pub const ALL: [Target; 4] = [
        Target::Usage,
        Target::Lifespan,
        Target::Degradation,
        Target::Recommendation,
    ];

    /// Column holding this target in the training data.
    pub fn column(self) -> &'static str {
        match self {
            Target::Usage => "Energy_kWh",
            Target::Lifespan => "Battery_Health_percent",
            Target::Degradation => "Estimated_Range_km",
            Target::Recommendation => "Recommended_Action",
        }
    }

    /// Name of the persisted artifact for this target's model.
    pub fn artifact_name(self) -> &'static str {
        match self {
            Target::Usage => "battery_usage_model",
            Target::Lifespan => "battery_lifespan_model",
            Target::Degradation => "battery_degradation_model",
            Target::Recommendation => "charging_recommendation_model",
        }
    }

    pub fn is_classification(self) -> bool {
        matches!(self, Target::Recommendation)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// The single capability the service needs from a fitted model.
pub trait Predictor: Send + Sync {
    fn predict(&self, record: &FeatureRecord) -> Result<f64, PredictError>;

    /// Batch form used for evaluation; defaults to row-by-row prediction.
    fn predict_batch(&self, records: &[FeatureRecord]) -> Result<Vec<f64>, PredictError> {
        records.iter().map(|r| self.predict(r)).collect()
    }
}

/// Forest hyper-parameters shared by all four models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestParams {
    pub n_trees: u16,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 300,
            seed: 42,
        }
    }
}

/// A fitted random forest. Immutable once trained or loaded.
#[derive(Serialize, Deserialize)]
pub enum TrainedModel {
    Regressor(Regressor),
    Classifier(Classifier),
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainedModel::Regressor(_) => f.write_str("TrainedModel::Regressor"),
            TrainedModel::Classifier(_) => f.write_str("TrainedModel::Classifier"),
        }
    }
}

fn to_matrix(records: &[FeatureRecord]) -> DenseMatrix<f64> {
    let rows: Vec<Vec<f64>> = records.iter().map(|r| r.values().to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows)
}

impl TrainedModel {
    pub fn fit_regressor(
        target: Target,
        x: &[FeatureRecord],
        y: &[f64],
        params: ForestParams,
    ) -> Result<Self, TrainingDataError> {
        if x.is_empty() {
            return Err(TrainingDataError::InsufficientData {
                target: target.column().to_string(),
            });
        }
        let parameters = RandomForestRegressorParameters::default()
            .with_n_trees(params.n_trees.into())
            .with_seed(params.seed);
        let model = Regressor::fit(&to_matrix(x), &y.to_vec(), parameters).map_err(|e| {
            TrainingDataError::Fit {
                target: target.column().to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(TrainedModel::Regressor(model))
    }

    pub fn fit_classifier(
        target: Target,
        x: &[FeatureRecord],
        y: &[u32],
        params: ForestParams,
    ) -> Result<Self, TrainingDataError> {
        if x.is_empty() {
            return Err(TrainingDataError::InsufficientData {
                target: target.column().to_string(),
            });
        }
        let labels: Vec<i32> = y.iter().map(|&c| c as i32).collect();
        let parameters = RandomForestClassifierParameters::default()
            .with_n_trees(params.n_trees.into())
            .with_seed(params.seed);
        let model = Classifier::fit(&to_matrix(x), &labels, parameters).map_err(|e| {
            TrainingDataError::Fit {
                target: target.column().to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(TrainedModel::Classifier(model))
    }

    pub fn is_classifier(&self) -> bool {
        matches!(self, TrainedModel::Classifier(_))
    }
}

impl Predictor for TrainedModel {
    fn predict(&self, record: &FeatureRecord) -> Result<f64, PredictError> {
        let out = self.predict_batch(std::slice::from_ref(record))?;
        out.first()
            .copied()
            .ok_or_else(|| PredictError("model returned no output".to_string()))
    }

    fn predict_batch(&self, records: &[FeatureRecord]) -> Result<Vec<f64>, PredictError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let x = to_matrix(records);
        let out = match self {
            TrainedModel::Regressor(m) => m.predict(&x).map_err(|e| PredictError(e.to_string()))?,
            TrainedModel::Classifier(m) => m
                .predict(&x)
                .map_err(|e| PredictError(e.to_string()))?
                .into_iter()
                .map(f64::from)
                .collect(),
        };
        if out.len() != records.len() {
            return Err(PredictError(format!(
                "output length mismatch: got {}, expected {}",
                out.len(),
                records.len()
            )));
        }
        Ok(out)
    }
}
