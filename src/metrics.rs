//! Evaluation metrics reported after training.

use serde::{Deserialize, Serialize};

/// Mean absolute error. Returns 0 for empty input.
pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len(), "vectors must have same length");
    if y_true.is_empty() {
        return 0.0;
    }
    let sum: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    sum / y_true.len() as f64
}

/// Mean squared error. Returns 0 for empty input.
pub fn mse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len(), "vectors must have same length");
    if y_true.is_empty() {
        return 0.0;
    }
    let sum: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    sum / y_true.len() as f64
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// A constant `y_true` has no variance to explain; that case returns 0.
pub fn r_squared(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len(), "vectors must have same length");
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Fraction of exact class matches.
pub fn accuracy(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len(), "vectors must have same length");
    if y_true.is_empty() {
        return 0.0;
    }
    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    hits as f64 / y_true.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evaluation {
    Regression { mae: f64, mse: f64, r2: f64 },
    Classification { accuracy: f64 },
}

impl Evaluation {
    pub fn regression(y_true: &[f64], y_pred: &[f64]) -> Self {
        Evaluation::Regression {
            mae: mae(y_true, y_pred),
            mse: mse(y_true, y_pred),
            r2: r_squared(y_true, y_pred),
        }
    }

    pub fn classification(y_true: &[f64], y_pred: &[f64]) -> Self {
        Evaluation::Classification {
            accuracy: accuracy(y_true, y_pred),
        }
    }
}
