//! Per-feature standardization keyed by feature name

use crate::features::{Feature, FeatureMap};
use serde::{Deserialize, Serialize};

/// Mean and standard deviation learned for one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub mean: f64,
    pub std_dev: f64,
}

impl ScaleParams {
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }
}

/// Zero-mean, unit-variance scaler fitted on the training partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub params: FeatureMap<ScaleParams>,
}

impl StandardScaler {
    /// Fit population mean and standard deviation per feature
    ///
    /// A feature with zero spread keeps a unit divisor so it scales to zero
    /// instead of dividing by zero.
    pub fn fit(rows: &[FeatureMap<f64>]) -> Self {
        let n = rows.len().max(1) as f64;
        let params = FeatureMap::from_fn(|feature: Feature| {
            let mean = rows.iter().map(|row| *row.get(feature)).sum::<f64>() / n;
            let variance = rows
                .iter()
                .map(|row| (*row.get(feature) - mean).powi(2))
                .sum::<f64>()
                / n;
            let std_dev = variance.sqrt();
            ScaleParams {
                mean,
                std_dev: if std_dev > f64::EPSILON { std_dev } else { 1.0 },
            }
        });
        Self { params }
    }

    pub fn transform(&self, row: &FeatureMap<f64>) -> FeatureMap<f64> {
        row.map(|feature, value| self.params.get(feature).apply(*value))
    }
}
