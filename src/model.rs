//! Standardize-then-logistic churn classifier

use crate::error::ChurnError;
use crate::features::{ChurnFeatures, Feature, FeatureMap, RfmRecord};
use crate::metrics::EvaluationReport;
use crate::scaler::StandardScaler;
use crate::split::stratified_split;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Probability at or above which a customer is predicted to churn
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Hyperparameters of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Fraction of each class held out for evaluation
    pub test_size: f64,
    /// Seed of the stratified split
    pub seed: u64,
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Stop once the objective improves by less than this between iterations
    pub tolerance: f64,
    /// Inverse L2 regularization strength (larger means weaker penalty)
    pub inverse_regularization: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            test_size: 0.3,
            seed: 42,
            learning_rate: 0.5,
            max_iter: 10_000,
            tolerance: 1e-10,
            inverse_regularization: 1.0,
        }
    }
}

/// Numerically stable logistic function
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let exp_z = z.exp();
        exp_z / (1.0 + exp_z)
    }
}

/// Balanced class weights: `n_samples / (2 * n_class)` per sample
pub fn balanced_sample_weights(labels: &[u8]) -> Array1<f64> {
    let n = labels.len() as f64;
    let positives = labels.iter().filter(|&&label| label == 1).count() as f64;
    let negatives = n - positives;
    labels
        .iter()
        .map(|&label| {
            let class_count = if label == 1 { positives } else { negatives };
            n / (2.0 * class_count)
        })
        .collect()
}

/// Output of a weighted logistic regression fit
#[derive(Debug, Clone)]
pub struct LogisticFit {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    pub iterations: usize,
    pub final_loss: f64,
}

/// Sample-weighted, L2-regularized logistic regression fitted by full-batch gradient descent
///
/// Minimizes `sum(w_i * logloss_i) / sum(w_i) + ||beta||^2 / (2 * C * sum(w_i))`,
/// the per-weight form of `C * sum(w_i * logloss_i) + ||beta||^2 / 2`. The
/// intercept is not penalized.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    learning_rate: f64,
    max_iter: usize,
    tolerance: f64,
    inverse_regularization: f64,
}

impl LogisticRegression {
    pub fn new(params: &TrainingParams) -> Self {
        Self {
            learning_rate: params.learning_rate,
            max_iter: params.max_iter,
            tolerance: params.tolerance,
            inverse_regularization: params.inverse_regularization,
        }
    }

    fn objective(
        &self,
        y: &Array1<f64>,
        probabilities: &Array1<f64>,
        sample_weight: &Array1<f64>,
        coefficients: &Array1<f64>,
        total_weight: f64,
    ) -> f64 {
        let eps = 1e-15;
        let data_loss = y
            .iter()
            .zip(probabilities.iter())
            .zip(sample_weight.iter())
            .map(|((&target, &p), &weight)| {
                let p = p.clamp(eps, 1.0 - eps);
                -weight * (target * p.ln() + (1.0 - target) * (1.0 - p).ln())
            })
            .sum::<f64>()
            / total_weight;
        let penalty =
            coefficients.dot(coefficients) / (2.0 * self.inverse_regularization * total_weight);
        data_loss + penalty
    }

    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, sample_weight: &Array1<f64>) -> LogisticFit {
        let total_weight = sample_weight.sum();
        let l2 = 1.0 / (self.inverse_regularization * total_weight);

        let mut coefficients = Array1::<f64>::zeros(x.ncols());
        let mut intercept = 0.0;
        let mut previous_loss = f64::INFINITY;
        let mut final_loss = f64::INFINITY;
        let mut iterations = 0;

        for iter in 0..self.max_iter {
            let probabilities = (x.dot(&coefficients) + intercept).mapv(sigmoid);
            let loss = self.objective(y, &probabilities, sample_weight, &coefficients, total_weight);
            iterations = iter + 1;
            final_loss = loss;
            if (previous_loss - loss).abs() < self.tolerance {
                debug!(iteration = iter, loss, "Logistic regression converged");
                break;
            }
            previous_loss = loss;

            let weighted_errors = (&probabilities - y) * sample_weight;
            let grad_coefficients = x.t().dot(&weighted_errors) / total_weight + &coefficients * l2;
            let grad_intercept = weighted_errors.sum() / total_weight;

            coefficients = &coefficients - &(grad_coefficients * self.learning_rate);
            intercept -= self.learning_rate * grad_intercept;
        }

        LogisticFit {
            coefficients,
            intercept,
            iterations,
            final_loss,
        }
    }
}

/// Fitted linear weights, one coefficient per named feature plus a bias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearClassifier {
    pub weights: FeatureMap<f64>,
    pub bias: f64,
}

impl LinearClassifier {
    pub fn score(&self, scaled: &FeatureMap<f64>) -> f64 {
        self.bias
            + Feature::ALL
                .iter()
                .map(|&feature| self.weights.get(feature) * scaled.get(feature))
                .sum::<f64>()
    }
}

/// Churn estimate for one customer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// 1 when the customer is predicted to churn
    pub label: u8,
    /// Estimated churn probability in `[0, 1]`
    pub probability: f64,
}

/// Fitted scaler and classifier applied as one pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnModel {
    pub scaler: StandardScaler,
    pub classifier: LinearClassifier,
}

impl ChurnModel {
    pub fn predict(&self, features: &ChurnFeatures) -> Prediction {
        self.predict_row(&features.to_feature_map())
    }

    pub(crate) fn predict_row(&self, raw: &FeatureMap<f64>) -> Prediction {
        let scaled = self.scaler.transform(raw);
        let probability = sigmoid(self.classifier.score(&scaled));
        Prediction {
            label: u8::from(probability >= DECISION_THRESHOLD),
            probability,
        }
    }
}

/// Pack rows into a matrix in canonical feature order
fn to_matrix(rows: &[FeatureMap<f64>]) -> Array2<f64> {
    let mut matrix = Array2::<f64>::zeros((rows.len(), Feature::ALL.len()));
    for (mut target, row) in matrix.outer_iter_mut().zip(rows) {
        for (column, value) in row.to_row().into_iter().enumerate() {
            target[column] = value;
        }
    }
    matrix
}

/// Train the pipeline on labeled records and evaluate it on the held-out partition
pub fn fit(
    records: &[RfmRecord],
    params: &TrainingParams,
) -> crate::Result<(ChurnModel, Option<EvaluationReport>)> {
    if records.is_empty() {
        return Err(ChurnError::EmptyInput("no RFM records to train on".to_string()));
    }

    let labels: Vec<u8> = records.iter().map(|r| r.churn_label).collect();
    let split = stratified_split(&labels, params.test_size, params.seed);

    let train_labels: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
    let positives = train_labels.iter().filter(|&&label| label == 1).count();
    if positives == 0 || positives == train_labels.len() {
        let label = train_labels.first().copied().unwrap_or(0);
        return Err(ChurnError::InsufficientClasses {
            label,
            count: train_labels.len(),
        });
    }

    info!(
        train = split.train.len(),
        held_out = split.held_out.len(),
        churn_in_train = positives,
        seed = params.seed,
        "Stratified split"
    );

    let train_rows: Vec<FeatureMap<f64>> =
        split.train.iter().map(|&i| records[i].features()).collect();
    let scaler = StandardScaler::fit(&train_rows);
    let scaled_rows: Vec<FeatureMap<f64>> =
        train_rows.iter().map(|row| scaler.transform(row)).collect();

    let x = to_matrix(&scaled_rows);
    let y: Array1<f64> = train_labels.iter().map(|&label| f64::from(label)).collect();
    let sample_weight = balanced_sample_weights(&train_labels);

    let fitted = LogisticRegression::new(params).fit(&x, &y, &sample_weight);
    info!(
        iterations = fitted.iterations,
        loss = fitted.final_loss,
        "Fitted logistic regression"
    );

    let weights = FeatureMap::from_fn(|feature| {
        let column = Feature::ALL
            .iter()
            .position(|&f| f == feature)
            .unwrap_or_default();
        fitted.coefficients[column]
    });
    let model = ChurnModel {
        scaler,
        classifier: LinearClassifier {
            weights,
            bias: fitted.intercept,
        },
    };

    let evaluation = if split.held_out.is_empty() {
        None
    } else {
        let truth: Vec<u8> = split.held_out.iter().map(|&i| labels[i]).collect();
        let predicted: Vec<u8> = split
            .held_out
            .iter()
            .map(|&i| model.predict_row(&records[i].features()).label)
            .collect();
        Some(EvaluationReport::new(&truth, &predicted, &model.classifier.weights))
    };

    Ok((model, evaluation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(id: usize, recency_days: i64, frequency: i64, monetary: f64) -> RfmRecord {
        RfmRecord {
            customer_id: id.to_string(),
            recency_days,
            frequency,
            monetary,
            churn_label: u8::from(recency_days > 60),
        }
    }

    fn records() -> Vec<RfmRecord> {
        (0..60)
            .map(|i| {
                let recency = (i as i64 * 5) % 150;
                let churned = recency > 60;
                let frequency = if churned { 1 + (i as i64 % 2) } else { 3 + (i as i64 % 4) };
                let monetary = if churned { 20.0 + i as f64 } else { 300.0 + 10.0 * i as f64 };
                record(i, recency, frequency, monetary)
            })
            .collect()
    }

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert_relative_eq!(sigmoid(2.0) + sigmoid(-2.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_balanced_weights() {
        let weights = balanced_sample_weights(&[0, 0, 0, 1]);
        assert_relative_eq!(weights[0], 4.0 / 6.0);
        assert_relative_eq!(weights[3], 2.0);
        // Each class carries half of the total weight
        assert_relative_eq!(weights.sum(), 4.0);
    }

    #[test]
    fn test_fit_learns_recency_direction() {
        let (model, evaluation) = fit(&records(), &TrainingParams::default()).unwrap();

        assert!(model.classifier.weights.recency_days > 0.0);

        let loyal = ChurnFeatures::new(10, 3, 500.0).unwrap();
        let lapsed = ChurnFeatures::new(90, 1, 20.0).unwrap();
        assert_eq!(model.predict(&loyal).label, 0);
        assert_eq!(model.predict(&lapsed).label, 1);

        let evaluation = evaluation.unwrap();
        assert_eq!(evaluation.held_out_size, 18);
        assert!(evaluation.accuracy > 0.8);
    }

    #[test]
    fn test_fit_is_reproducible() {
        let (first, _) = fit(&records(), &TrainingParams::default()).unwrap();
        let (second, _) = fit(&records(), &TrainingParams::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let records: Vec<RfmRecord> = (0..10).map(|i| record(i, 5, 2, 50.0)).collect();
        let err = fit(&records, &TrainingParams::default()).unwrap_err();
        assert!(matches!(
            err,
            ChurnError::InsufficientClasses { label: 0, .. }
        ));
    }

    #[test]
    fn test_logistic_regression_weighted_fit() {
        let x = Array2::from_shape_vec((4, 1), vec![-2.0, -1.0, 1.0, 2.0]).unwrap();
        let y = Array1::from(vec![0.0, 0.0, 1.0, 1.0]);
        let weights = Array1::from(vec![1.0, 1.0, 1.0, 1.0]);
        let fit = LogisticRegression::new(&TrainingParams::default()).fit(&x, &y, &weights);

        assert!(fit.coefficients[0] > 0.0);
        assert_relative_eq!(fit.intercept, 0.0, epsilon = 1e-6);
        assert!(fit.final_loss.is_finite());
    }
}
