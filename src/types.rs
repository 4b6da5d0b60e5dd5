use serde::{Deserialize, Serialize};

// ---------- Request/Response types ----------

/// Flat request: one top-level key per feature. Extra keys are ignored.
pub type PredictRequest = serde_json::Map<String, serde_json::Value>;

/// Request keys sent by older clients, mapped to canonical feature names.
/// The canonical key wins when both are present.
pub const REQUEST_ALIASES: [(&str, &str); 2] = crate::dataset::COLUMN_ALIASES;

pub const USAGE_DECIMALS: i32 = 4;
pub const LIFESPAN_DECIMALS: i32 = 2;
pub const DEGRADATION_DECIMALS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "Predicted Battery Usage (kWh)")]
    pub usage_kwh: f64,
    #[serde(rename = "Predicted Battery Lifespan (%)")]
    pub lifespan_percent: f64,
    #[serde(rename = "Predicted Battery Degradation (km)")]
    pub degradation_km: f64,
    #[serde(rename = "Optimal Charging Recommendation")]
    pub recommendation: i64,
}

impl PredictionResult {
    /// Rounds raw model outputs to the response precision.
    pub fn from_raw(usage: f64, lifespan: f64, degradation: f64, recommendation: f64) -> Self {
        Self {
            usage_kwh: round_to(usage, USAGE_DECIMALS),
            lifespan_percent: round_to(lifespan, LIFESPAN_DECIMALS),
            degradation_km: round_to(degradation, DEGRADATION_DECIMALS),
            recommendation: recommendation.round() as i64,
        }
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(1.234_567, 4), 1.2346);
        assert_eq!(round_to(87.456, 2), 87.46);
        assert_eq!(round_to(-3.004, 2), -3.0);
    }

    #[test]
    fn test_wire_keys() {
        let result = PredictionResult::from_raw(2.345_678_9, 91.234, 301.009, 2.0);
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["Predicted Battery Usage (kWh)"], 2.3457);
        assert_eq!(json["Predicted Battery Lifespan (%)"], 91.23);
        assert_eq!(json["Predicted Battery Degradation (km)"], 301.01);
        assert_eq!(json["Optimal Charging Recommendation"], 2);
        assert!(json["Optimal Charging Recommendation"].is_i64());
    }
}
