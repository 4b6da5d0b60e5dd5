use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Problems with the shape or content of a raw or processed table.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("unexpected column '{0}'")]
    UnexpectedColumn(String),

    #[error("row {row}: malformed value {value:?} in column '{column}'")]
    MalformedValue {
        row: usize,
        column: String,
        value: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum EncodingError {
    #[error("unknown category {value:?} for feature '{feature}'")]
    UnknownCategory { feature: String, value: String },

    #[error("unknown code {code} for feature '{feature}'")]
    UnknownCode { feature: String, code: f64 },

    #[error("feature '{0}' has no encoding table")]
    NotCategorical(String),

    #[error("feature '{0}' has no scaling range")]
    NotNumeric(String),

    #[error("feature '{0}' expects a category label")]
    ExpectedCategory(String),

    #[error("feature '{feature}' expects a number, got {value:?}")]
    ExpectedNumber { feature: String, value: String },
}

/// A prediction request that cannot be turned into a feature record.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required feature '{0}'")]
    MissingFeature(String),

    #[error("invalid value for feature '{key}': {reason}")]
    InvalidFeatureValue { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("model '{name}' not found at {path}")]
    ModelNotFound { name: String, path: String },

    #[error("artifact '{name}' is corrupt: {reason}")]
    CorruptArtifact { name: String, reason: String },

    #[error("failed to encode artifact '{name}': {reason}")]
    Encode { name: String, reason: String },

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TrainingDataError {
    #[error("dataset has no rows")]
    EmptyDataset,

    #[error("training partition for '{target}' is empty")]
    InsufficientData { target: String },

    #[error("column '{column}' has no observed values to impute from")]
    NoObservedValues { column: String },

    #[error("invalid split fraction {0}; must be strictly between 0 and 1")]
    InvalidSplit(f64),

    #[error("failed to fit '{target}': {reason}")]
    Fit { target: String, reason: String },
}

#[derive(Debug, Error)]
#[error("prediction failed: {0}")]
pub struct PredictError(pub String);

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    TrainingData(#[from] TrainingDataError),

    #[error(transparent)]
    Predict(#[from] PredictError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
