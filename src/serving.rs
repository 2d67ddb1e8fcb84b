//! Prediction request/response contract shared by every serving front-end

use crate::artifact::{ArtifactHandle, ModelArtifact};
use crate::error::ChurnError;
use crate::features::ChurnFeatures;
use crate::model::Prediction;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Liveness message returned by health checks
pub const LIVENESS_MESSAGE: &str = "Churn Prediction API is running";

/// Risk band derived from the churn probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Band a probability; both bounds are exclusive
    pub fn from_probability(probability: f64, thresholds: &RiskThresholds) -> Self {
        if probability > thresholds.high {
            RiskLevel::High
        } else if probability > thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Probability cut-offs for the risk bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high: 0.7,
            medium: 0.4,
        }
    }
}

/// Raw prediction request, exactly the three RFM fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictionRequest {
    pub recency_days: i64,
    pub frequency: i64,
    pub monetary: f64,
}

impl PredictionRequest {
    /// Parse a JSON request body
    pub fn from_json(body: &str) -> crate::Result<Self> {
        serde_json::from_str(body).map_err(|e| ChurnError::Shape(e.to_string()))
    }

    pub fn validate(&self) -> crate::Result<ChurnFeatures> {
        ChurnFeatures::new(self.recency_days, self.frequency, self.monetary)
    }
}

/// Prediction response body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub churn_prediction: u8,
    /// Rounded to three decimals
    pub churn_probability: f64,
    pub risk_level: RiskLevel,
}

impl PredictionResponse {
    pub fn new(prediction: Prediction, thresholds: &RiskThresholds) -> Self {
        Self {
            churn_prediction: prediction.label,
            churn_probability: (prediction.probability * 1000.0).round() / 1000.0,
            risk_level: RiskLevel::from_probability(prediction.probability, thresholds),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    message: &'static str,
}

/// Validate a request and score it against the artifact
pub fn predict(artifact: &ModelArtifact, request: &PredictionRequest) -> crate::Result<Prediction> {
    let features = request.validate()?;
    Ok(artifact.predict(&features))
}

/// Line-oriented front-end over a shared artifact
///
/// Each request is scored against the snapshot taken when it arrives, so a
/// concurrent swap never mixes two artifacts within one response.
#[derive(Debug, Clone)]
pub struct Predictor {
    handle: ArtifactHandle,
    thresholds: RiskThresholds,
}

impl Predictor {
    pub fn new(handle: ArtifactHandle, thresholds: RiskThresholds) -> Self {
        Self { handle, thresholds }
    }

    pub fn handle(&self) -> &ArtifactHandle {
        &self.handle
    }

    pub fn respond(&self, request: &PredictionRequest) -> crate::Result<PredictionResponse> {
        let artifact = self.handle.snapshot();
        let prediction = predict(&artifact, request)?;
        Ok(PredictionResponse::new(prediction, &self.thresholds))
    }

    /// Answer one input line with one JSON line
    ///
    /// `health` yields the liveness message; anything else is parsed as a
    /// prediction request. Failures become `{"error": ...}` responses.
    pub fn handle_line(&self, line: &str) -> String {
        let line = line.trim();
        if line == "health" {
            return json_line(&HealthResponse {
                message: LIVENESS_MESSAGE,
            });
        }

        match PredictionRequest::from_json(line).and_then(|request| self.respond(&request)) {
            Ok(response) => {
                debug!(
                    churn_prediction = response.churn_prediction,
                    churn_probability = response.churn_probability,
                    "Request scored"
                );
                json_line(&response)
            }
            Err(e) => {
                if e.is_request_error() {
                    warn!(error = %e, "Rejected prediction request");
                } else {
                    error!(error = %e, "Prediction failed");
                }
                json_line(&ErrorResponse {
                    error: e.to_string(),
                })
            }
        }
    }
}

fn json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!("{{\"error\":\"failed to encode response: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{ChurnRule, FeatureMap};
    use crate::model::{ChurnModel, LinearClassifier};
    use crate::scaler::{ScaleParams, StandardScaler};
    use chrono::NaiveDate;

    fn artifact() -> ModelArtifact {
        let model = ChurnModel {
            scaler: StandardScaler {
                params: FeatureMap {
                    recency_days: ScaleParams { mean: 60.0, std_dev: 30.0 },
                    frequency: ScaleParams { mean: 3.0, std_dev: 1.5 },
                    monetary: ScaleParams { mean: 250.0, std_dev: 120.0 },
                },
            },
            classifier: LinearClassifier {
                weights: FeatureMap {
                    recency_days: 3.0,
                    frequency: -0.5,
                    monetary: -0.5,
                },
                bias: 0.0,
            },
        };
        ModelArtifact::new(
            model,
            "v1",
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            ChurnRule::default(),
        )
    }

    fn predictor() -> Predictor {
        Predictor::new(ArtifactHandle::new(artifact()), RiskThresholds::default())
    }

    #[test]
    fn test_risk_bands() {
        let thresholds = RiskThresholds::default();
        assert_eq!(RiskLevel::from_probability(0.71, &thresholds), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.7, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.41, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.4, &thresholds), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.05, &thresholds), RiskLevel::Low);
    }

    #[test]
    fn test_request_shape_errors() {
        for body in [
            r#"{"recency_days": 10, "frequency": 3}"#,
            r#"{"recency_days": 10, "frequency": 3, "monetary": "lots"}"#,
            r#"{"recency_days": 10, "frequency": 2.5, "monetary": 10.0}"#,
            r#"{"recency_days": 10, "frequency": 3, "monetary": 10.0, "tenure": 4}"#,
            "not json",
        ] {
            assert!(
                matches!(PredictionRequest::from_json(body), Err(ChurnError::Shape(_))),
                "accepted {body}"
            );
        }

        let negative = PredictionRequest::from_json(
            r#"{"recency_days": 10, "frequency": 3, "monetary": -1}"#,
        )
        .unwrap();
        assert!(matches!(
            predict(&artifact(), &negative),
            Err(ChurnError::Shape(_))
        ));
    }

    #[test]
    fn test_predict_is_deterministic() {
        let request = PredictionRequest {
            recency_days: 75,
            frequency: 2,
            monetary: 140.0,
        };
        let first = predict(&artifact(), &request).unwrap();
        let second = predict(&artifact(), &request).unwrap();
        assert_eq!(first.probability.to_bits(), second.probability.to_bits());
        assert_eq!(first.label, second.label);
    }

    #[test]
    fn test_response_rounding_and_wire_shape() {
        let response = PredictionResponse::new(
            Prediction {
                label: 1,
                probability: 0.87654,
            },
            &RiskThresholds::default(),
        );
        assert_eq!(response.churn_probability, 0.877);

        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["churn_prediction"], 1);
        assert_eq!(json["risk_level"], "High");
    }

    #[test]
    fn test_handle_line() {
        let predictor = predictor();

        let health = predictor.handle_line("health");
        assert!(health.contains(LIVENESS_MESSAGE));

        let ok = predictor.handle_line(r#"{"recency_days": 120, "frequency": 1, "monetary": 15.0}"#);
        let response: PredictionResponse = serde_json::from_str(&ok).unwrap();
        assert_eq!(response.churn_prediction, 1);

        let rejected = predictor.handle_line(r#"{"recency_days": 120}"#);
        assert!(rejected.contains("error"));

        // A rejected request leaves the shared artifact usable
        let again = predictor.handle_line(r#"{"recency_days": 5, "frequency": 6, "monetary": 900}"#);
        let response: PredictionResponse = serde_json::from_str(&again).unwrap();
        assert_eq!(response.churn_prediction, 0);
        assert_eq!(response.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_malformed_requests_are_request_errors() {
        let predictor = predictor();
        for body in [
            r#"{"recency_days": 120}"#,
            r#"{"recency_days": 1, "frequency": 1, "monetary": -3.0}"#,
            r#"{"recency_days": 1, "frequency": 1, "monetary": 3.0, "tenure": 7}"#,
        ] {
            let err = PredictionRequest::from_json(body)
                .and_then(|request| predictor.respond(&request))
                .unwrap_err();
            assert!(err.is_request_error(), "{body}: {err}");
        }
    }
}
