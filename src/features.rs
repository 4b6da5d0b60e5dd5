//! Canonical feature schema and the encode/normalize transforms shared by
//! training and serving.
//!
//! A [`FeatureCodec`] is fitted once over the training corpus, persisted next
//! to the models, and reused unchanged by the prediction service. Serving
//! never fits.

use crate::error::{EncodingError, Error, TrainingDataError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const FEATURE_COUNT: usize = 17;

/// Authoritative model input order.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "Trip_Distance_km",
    "Trip_Duration_min",
    "Average_Speed_kmph",
    "Acceleration_Pattern",
    "Braking_Pattern",
    "Energy_Consumption_kWh_per_km",
    "Idle_Time_min",
    "Voltage_V",
    "Current_A",
    "Charge_Cycles",
    "Depth_of_Discharge_percent",
    "Temperature_C",
    "Charging_Power_kW",
    "Charging_Duration_min",
    "Charging Type",
    "Charging Station Location",
    "Battery_Charge_Efficiency_percent",
];

/// Features that arrive as strings and are mapped to integer codes.
pub const CATEGORICAL_FEATURES: [&str; 4] = [
    "Acceleration_Pattern",
    "Braking_Pattern",
    "Charging Type",
    "Charging Station Location",
];

/// Classification label, encoded with the same discipline as the features.
pub const LABEL_COLUMN: &str = "Recommended_Action";

/// Output of normalizing a feature whose training range collapsed to a point.
pub const CONSTANT_FEATURE_VALUE: f64 = 0.0;

pub fn is_categorical(feature: &str) -> bool {
    CATEGORICAL_FEATURES.contains(&feature)
}

pub fn feature_index(feature: &str) -> Option<usize> {
    FEATURE_COLUMNS.iter().position(|f| *f == feature)
}

/// A feature value before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

/// Unencoded record with one value per feature, in canonical order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    values: Vec<RawValue>,
}

impl RawRecord {
    pub fn new(values: [RawValue; FEATURE_COUNT]) -> Self {
        Self {
            values: values.into(),
        }
    }

    pub fn get(&self, feature: &str) -> Option<&RawValue> {
        feature_index(feature).map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &RawValue)> {
        FEATURE_COLUMNS.iter().copied().zip(self.values.iter())
    }
}

/// Fully numeric model input, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRecord {
    values: [f64; FEATURE_COUNT],
}

impl FeatureRecord {
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        feature_index(feature).map(|i| self.values[i])
    }
}

/// Category list for one column; a category's code is its index.
///
/// Categories are kept sorted, so codes are assigned in lexicographic order
/// of the distinct observed values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCodes {
    categories: Vec<String>,
}

impl CategoryCodes {
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        Self {
            categories: distinct.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn code(&self, category: &str) -> Option<u32> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()
            .map(|i| i as u32)
    }

    pub fn category(&self, code: u32) -> Option<&str> {
        self.categories.get(code as usize).map(String::as_str)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Categorical column name -> category codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingTable {
    columns: BTreeMap<String, CategoryCodes>,
}

impl EncodingTable {
    pub fn fit_column<'a, I>(&mut self, column: &str, values: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.columns
            .insert(column.to_string(), CategoryCodes::fit(values));
    }

    pub fn column(&self, column: &str) -> Option<&CategoryCodes> {
        self.columns.get(column)
    }

    fn codes(&self, column: &str) -> Result<&CategoryCodes, EncodingError> {
        self.columns
            .get(column)
            .ok_or_else(|| EncodingError::NotCategorical(column.to_string()))
    }

    pub fn encode(&self, column: &str, category: &str) -> Result<u32, EncodingError> {
        self.codes(column)?
            .code(category)
            .ok_or_else(|| EncodingError::UnknownCategory {
                feature: column.to_string(),
                value: category.to_string(),
            })
    }

    pub fn decode(&self, column: &str, code: u32) -> Result<&str, EncodingError> {
        self.codes(column)?
            .category(code)
            .ok_or_else(|| EncodingError::UnknownCode {
                feature: column.to_string(),
                code: f64::from(code),
            })
    }

    /// Accepts an already-encoded value if it is an integral, assigned code.
    pub fn check_code(&self, column: &str, code: f64) -> Result<u32, EncodingError> {
        let codes = self.codes(column)?;
        let valid = code.is_finite() && code.fract() == 0.0 && code >= 0.0;
        if valid && (code as usize) < codes.len() {
            Ok(code as u32)
        } else {
            Err(EncodingError::UnknownCode {
                feature: column.to_string(),
                code,
            })
        }
    }
}

/// Observed training range of one numeric feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    /// `(value - min) / (max - min)` without clipping; a constant feature maps
    /// to [`CONSTANT_FEATURE_VALUE`].
    pub fn normalize(&self, value: f64) -> f64 {
        if self.max > self.min {
            (value - self.min) / (self.max - self.min)
        } else {
            CONSTANT_FEATURE_VALUE
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalingParameters {
    ranges: BTreeMap<String, MinMax>,
}

impl ScalingParameters {
    pub fn range(&self, feature: &str) -> Option<MinMax> {
        self.ranges.get(feature).copied()
    }

    pub fn normalize(&self, feature: &str, value: f64) -> Option<f64> {
        self.ranges.get(feature).map(|r| r.normalize(value))
    }
}

/// The persisted transform applied identically at training and inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCodec {
    encodings: EncodingTable,
    scaling: ScalingParameters,
}

impl FeatureCodec {
    /// Builds encoding tables and scaling ranges from the training corpus.
    ///
    /// `labels` are the raw `Recommended_Action` values; their codes become
    /// the classifier's class ids.
    pub fn fit(corpus: &[RawRecord], labels: &[&str]) -> Result<Self, Error> {
        if corpus.is_empty() {
            return Err(TrainingDataError::EmptyDataset.into());
        }

        let mut encodings = EncodingTable::default();
        let mut ranges = BTreeMap::new();

        for (idx, feature) in FEATURE_COLUMNS.iter().enumerate() {
            if is_categorical(feature) {
                let mut values = Vec::with_capacity(corpus.len());
                for record in corpus {
                    match &record.values[idx] {
                        RawValue::Text(s) => values.push(s.as_str()),
                        RawValue::Number(_) => {
                            return Err(EncodingError::ExpectedCategory(feature.to_string()).into())
                        }
                    }
                }
                encodings.fit_column(feature, values);
            } else {
                let mut min = f64::INFINITY;
                let mut max = f64::NEG_INFINITY;
                for record in corpus {
                    let v = match record.values[idx] {
                        RawValue::Number(v) if v.is_finite() => v,
                        RawValue::Number(v) => {
                            return Err(EncodingError::ExpectedNumber {
                                feature: feature.to_string(),
                                value: v.to_string(),
                            }
                            .into())
                        }
                        RawValue::Text(ref s) => {
                            return Err(EncodingError::ExpectedNumber {
                                feature: feature.to_string(),
                                value: s.clone(),
                            }
                            .into())
                        }
                    };
                    min = min.min(v);
                    max = max.max(v);
                }
                ranges.insert(feature.to_string(), MinMax { min, max });
            }
        }

        encodings.fit_column(LABEL_COLUMN, labels.iter().copied());

        Ok(Self {
            encodings,
            scaling: ScalingParameters { ranges },
        })
    }

    /// Deterministic pure transform of a raw record into model input.
    pub fn encode(&self, raw: &RawRecord) -> Result<FeatureRecord, EncodingError> {
        let mut values = [0.0; FEATURE_COUNT];
        for (idx, (feature, value)) in raw.iter().enumerate() {
            values[idx] = if is_categorical(feature) {
                let code = match value {
                    RawValue::Text(s) => self.encodings.encode(feature, s)?,
                    RawValue::Number(n) => self.encodings.check_code(feature, *n)?,
                };
                f64::from(code)
            } else {
                let v = match value {
                    RawValue::Number(v) => *v,
                    RawValue::Text(s) => {
                        return Err(EncodingError::ExpectedNumber {
                            feature: feature.to_string(),
                            value: s.clone(),
                        })
                    }
                };
                self.scaling
                    .normalize(feature, v)
                    .ok_or_else(|| EncodingError::NotNumeric(feature.to_string()))?
            };
        }
        Ok(FeatureRecord::from_values(values))
    }

    pub fn encode_label(&self, label: &str) -> Result<u32, EncodingError> {
        self.encodings.encode(LABEL_COLUMN, label)
    }

    pub fn decode_label(&self, class_id: u32) -> Result<&str, EncodingError> {
        self.encodings.decode(LABEL_COLUMN, class_id)
    }

    pub fn encodings(&self) -> &EncodingTable {
        &self.encodings
    }

    pub fn scaling(&self) -> &ScalingParameters {
        &self.scaling
    }
}
