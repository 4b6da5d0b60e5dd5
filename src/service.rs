//! Online prediction: request validation, the four predictors, and the HTTP
//! surface around them.

use crate::error::{Error, PersistenceError, PredictError, ValidationError};
use crate::features::{
    is_categorical, FeatureCodec, FeatureRecord, RawRecord, RawValue, FEATURE_COLUMNS,
    FEATURE_COUNT,
};
use crate::model::{Predictor, Target};
use crate::store::ModelStore;
use crate::train::TrainedModels;
use crate::types::{PredictRequest, PredictionResult, REQUEST_ALIASES};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub const HEALTH_MESSAGE: &str = "EV Battery Health Prediction API is Running!";

/// Loaded once at startup and shared read-only by every request.
pub struct PredictionService {
    codec: FeatureCodec,
    usage: Box<dyn Predictor>,
    lifespan: Box<dyn Predictor>,
    degradation: Box<dyn Predictor>,
    recommendation: Box<dyn Predictor>,
}

impl PredictionService {
    pub fn new(
        codec: FeatureCodec,
        usage: Box<dyn Predictor>,
        lifespan: Box<dyn Predictor>,
        degradation: Box<dyn Predictor>,
        recommendation: Box<dyn Predictor>,
    ) -> Self {
        Self {
            codec,
            usage,
            lifespan,
            degradation,
            recommendation,
        }
    }

    pub fn from_models(codec: FeatureCodec, models: TrainedModels) -> Self {
        Self::new(
            codec,
            Box::new(models.usage),
            Box::new(models.lifespan),
            Box::new(models.degradation),
            Box::new(models.recommendation),
        )
    }

    /// Loads the codec and all four models; any failure aborts startup.
    pub fn load(store: &ModelStore) -> Result<Self, PersistenceError> {
        let codec = store.load_codec()?;
        let load = |target: Target| -> Result<Box<dyn Predictor>, PersistenceError> {
            let model = store.load_model(target)?;
            tracing::info!(artifact = target.artifact_name(), "model loaded");
            Ok(Box::new(model))
        };
        Ok(Self::new(
            codec,
            load(Target::Usage)?,
            load(Target::Lifespan)?,
            load(Target::Degradation)?,
            load(Target::Recommendation)?,
        ))
    }

    pub fn codec(&self) -> &FeatureCodec {
        &self.codec
    }

    /// Checks presence of every feature and coerces values, preserving
    /// canonical order. Categorical values are left for the codec.
    pub fn validate(&self, request: &PredictRequest) -> Result<RawRecord, ValidationError> {
        let mut values: Vec<RawValue> = Vec::with_capacity(FEATURE_COUNT);
        for feature in FEATURE_COLUMNS {
            let value = lookup(request, feature)
                .ok_or_else(|| ValidationError::MissingFeature(feature.to_string()))?;
            values.push(coerce(feature, value)?);
        }
        let values: [RawValue; FEATURE_COUNT] = values.try_into().map_err(|_| {
            ValidationError::InvalidFeatureValue {
                key: "<request>".to_string(),
                reason: "wrong feature count".to_string(),
            }
        })?;
        Ok(RawRecord::new(values))
    }

    pub fn predict(&self, request: &PredictRequest) -> Result<PredictionResult, Error> {
        let raw = self.validate(request)?;
        let record = self.codec.encode(&raw)?;
        Ok(self.predict_record(&record)?)
    }

    /// Runs all four predictors against the same encoded record.
    pub fn predict_record(&self, record: &FeatureRecord) -> Result<PredictionResult, PredictError> {
        let usage = self.usage.predict(record)?;
        let lifespan = self.lifespan.predict(record)?;
        let degradation = self.degradation.predict(record)?;
        let recommendation = self.recommendation.predict(record)?;
        Ok(PredictionResult::from_raw(
            usage,
            lifespan,
            degradation,
            recommendation,
        ))
    }
}

fn lookup<'a>(request: &'a PredictRequest, feature: &str) -> Option<&'a Value> {
    request.get(feature).or_else(|| {
        REQUEST_ALIASES
            .iter()
            .find(|(_, canonical)| *canonical == feature)
            .and_then(|(alias, _)| request.get(*alias))
    })
}

fn invalid(key: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidFeatureValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn coerce(feature: &str, value: &Value) -> Result<RawValue, ValidationError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(RawValue::Number)
            .ok_or_else(|| invalid(feature, format!("{n} is not a finite number"))),
        Value::String(s) if is_categorical(feature) => Ok(RawValue::Text(s.clone())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(RawValue::Number)
            .ok_or_else(|| invalid(feature, format!("could not convert string to float: {s:?}"))),
        Value::Null => Err(invalid(feature, "value is null")),
        Value::Bool(_) => Err(invalid(feature, "booleans are not accepted")),
        Value::Array(_) | Value::Object(_) => Err(invalid(feature, "expected a scalar value")),
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::Encoding(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
}

pub fn router(service: Arc<PredictionService>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/predict", post(predict))
        .with_state(AppState { service })
}

// ---------- Handlers ----------

pub async fn home() -> &'static str {
    HEALTH_MESSAGE
}

type ErrorResponse = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: String) -> ErrorResponse {
    (status, Json(json!({ "error": message })))
}

pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>, ErrorResponse> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!("rejected request body: {}", rejection.body_text());
        error_response(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;
    let body = Value::Object(request.clone());
    tracing::debug!("received input: {}", body);

    // Off the async workers; a panicking predictor only fails this request.
    let service = Arc::clone(&state.service);
    let outcome = tokio::task::spawn_blocking(move || service.predict(&request))
        .await
        .map_err(|e| {
            tracing::error!("prediction task failed: {e}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "prediction task failed".to_string(),
            )
        })?;

    match outcome {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            let status = status_for(&e);
            tracing::warn!(status = status.as_u16(), "prediction request failed: {e}");
            Err(error_response(status, e.to_string()))
        }
    }
}
