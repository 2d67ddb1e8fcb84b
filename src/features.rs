//! Named RFM features, churn labeling rule and derived per-customer records
//!
//! Features are always addressed by name. Matrices built for training use
//! [`Feature::ALL`] as the single column order and are converted back into
//! [`FeatureMap`]s before anything leaves the fitting code.

use crate::error::ChurnError;
use serde::{Deserialize, Serialize};

/// Default number of days without a transaction after which a customer counts as churned
pub const DEFAULT_CHURN_THRESHOLD_DAYS: i64 = 60;

/// The three RFM features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    RecencyDays,
    Frequency,
    Monetary,
}

impl Feature {
    /// Canonical feature order used when packing rows into a matrix
    pub const ALL: [Feature; 3] = [Feature::RecencyDays, Feature::Frequency, Feature::Monetary];

    pub fn name(self) -> &'static str {
        match self {
            Feature::RecencyDays => "recency_days",
            Feature::Frequency => "frequency",
            Feature::Monetary => "monetary",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per feature, stored in named fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureMap<T> {
    pub recency_days: T,
    pub frequency: T,
    pub monetary: T,
}

impl<T> FeatureMap<T> {
    /// Build a map by evaluating `f` once per feature
    pub fn from_fn(mut f: impl FnMut(Feature) -> T) -> Self {
        Self {
            recency_days: f(Feature::RecencyDays),
            frequency: f(Feature::Frequency),
            monetary: f(Feature::Monetary),
        }
    }

    pub fn get(&self, feature: Feature) -> &T {
        match feature {
            Feature::RecencyDays => &self.recency_days,
            Feature::Frequency => &self.frequency,
            Feature::Monetary => &self.monetary,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Feature, &T) -> U) -> FeatureMap<U> {
        FeatureMap::from_fn(|feature| f(feature, self.get(feature)))
    }

    /// Iterate `(feature, value)` pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Feature, &T)> + '_ {
        Feature::ALL.into_iter().map(move |feature| (feature, self.get(feature)))
    }
}

impl FeatureMap<f64> {
    /// Pack values in canonical order
    pub fn to_row(&self) -> [f64; 3] {
        Feature::ALL.map(|feature| *self.get(feature))
    }
}

/// Validated raw RFM triple fed into the classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChurnFeatures {
    recency_days: i64,
    frequency: i64,
    monetary: f64,
}

impl ChurnFeatures {
    /// Validate a raw triple; frequency and monetary must be non-negative and finite
    pub fn new(recency_days: i64, frequency: i64, monetary: f64) -> Result<Self, ChurnError> {
        if frequency < 0 {
            return Err(ChurnError::Shape(format!(
                "frequency must be non-negative, got {frequency}"
            )));
        }
        if !monetary.is_finite() {
            return Err(ChurnError::Shape(format!("monetary must be finite, got {monetary}")));
        }
        if monetary < 0.0 {
            return Err(ChurnError::Shape(format!(
                "monetary must be non-negative, got {monetary}"
            )));
        }
        Ok(Self {
            recency_days,
            frequency,
            monetary,
        })
    }

    pub fn to_feature_map(&self) -> FeatureMap<f64> {
        FeatureMap {
            recency_days: self.recency_days as f64,
            frequency: self.frequency as f64,
            monetary: self.monetary,
        }
    }
}

/// Recency-based churn definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnRule {
    /// Customers inactive for strictly more than this many days are labeled churned
    pub threshold_days: i64,
}

impl ChurnRule {
    pub fn new(threshold_days: i64) -> Self {
        Self { threshold_days }
    }

    pub fn label(&self, recency_days: i64) -> u8 {
        u8::from(recency_days > self.threshold_days)
    }
}

impl Default for ChurnRule {
    fn default() -> Self {
        Self::new(DEFAULT_CHURN_THRESHOLD_DAYS)
    }
}

/// Per-customer RFM summary with its historical churn label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmRecord {
    pub customer_id: String,
    pub recency_days: i64,
    pub frequency: i64,
    pub monetary: f64,
    pub churn_label: u8,
}

impl RfmRecord {
    pub fn features(&self) -> FeatureMap<f64> {
        FeatureMap {
            recency_days: self.recency_days as f64,
            frequency: self.frequency as f64,
            monetary: self.monetary,
        }
    }
}
