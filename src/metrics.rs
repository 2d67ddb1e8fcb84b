//! Held-out evaluation of a fitted churn model

use crate::features::{Feature, FeatureMap};
use serde::Serialize;
use std::fmt;

/// Confusion matrix for the churn label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionMatrix {
    /// Churners predicted to churn
    pub tp: usize,
    /// Retained customers predicted to stay
    pub tn: usize,
    /// Retained customers predicted to churn
    pub fp: usize,
    /// Churners predicted to stay
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(truth: &[u8], predicted: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (&actual, &guess) in truth.iter().zip(predicted) {
            match (actual == 1, guess == 1) {
                (true, true) => matrix.tp += 1,
                (false, false) => matrix.tn += 1,
                (false, true) => matrix.fp += 1,
                (true, false) => matrix.fn_ += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "              Predicted 0  Predicted 1")?;
        writeln!(f, "Actual 0      {:>11}  {:>11}", self.tn, self.fp)?;
        write!(f, "Actual 1      {:>11}  {:>11}", self.fn_, self.tp)
    }
}

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassReport {
    pub label: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ClassReport {
    fn new(label: u8, true_hits: usize, predicted: usize, support: usize) -> Self {
        let precision = ratio(true_hits, predicted);
        let recall = ratio(true_hits, support);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            label,
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Metrics computed on the held-out partition of a training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub held_out_size: usize,
    pub accuracy: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub classes: [ClassReport; 2],
    /// Fitted coefficients, largest first
    pub coefficients: Vec<(Feature, f64)>,
}

impl EvaluationReport {
    pub fn new(truth: &[u8], predicted: &[u8], weights: &FeatureMap<f64>) -> Self {
        let cm = ConfusionMatrix::from_labels(truth, predicted);
        let retained = ClassReport::new(0, cm.tn, cm.tn + cm.fn_, cm.tn + cm.fp);
        let churned = ClassReport::new(1, cm.tp, cm.tp + cm.fp, cm.tp + cm.fn_);

        let mut coefficients: Vec<(Feature, f64)> =
            weights.iter().map(|(feature, &w)| (feature, w)).collect();
        coefficients.sort_by(|a, b| b.1.total_cmp(&a.1));

        Self {
            held_out_size: cm.total(),
            accuracy: ratio(cm.tp + cm.tn, cm.total()),
            confusion_matrix: cm,
            classes: [retained, churned],
            coefficients,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Held-out customers: {}", self.held_out_size)?;
        writeln!(f, "Accuracy: {:.3}\n", self.accuracy)?;
        writeln!(f, "{}\n", self.confusion_matrix)?;
        writeln!(f, "Class  Precision  Recall     F1  Support")?;
        for class in &self.classes {
            writeln!(
                f,
                "{:>5}  {:>9.3}  {:>6.3}  {:>5.3}  {:>7}",
                class.label, class.precision, class.recall, class.f1, class.support
            )?;
        }
        writeln!(f, "\nFeature coefficients:")?;
        for (feature, coefficient) in &self.coefficients {
            writeln!(f, "  {:<14} {:>8.4}", feature.name(), coefficient)?;
        }
        Ok(())
    }
}
