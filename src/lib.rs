//! churnforge: customer churn scoring from transaction history
//!
//! Transactions and customers are joined into one Recency/Frequency/Monetary
//! record per customer, labeled by a recency rule, and used to train a
//! standardize-then-logistic classifier. The fitted pipeline is persisted as a
//! versioned artifact and served through [`serving::predict`].

pub mod analysis;
pub mod artifact;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod scaler;
pub mod serving;
pub mod split;
pub mod training;

// Re-export public items for easier access
pub use artifact::{ArtifactHandle, ModelArtifact};
pub use cli::Args;
pub use config::AppConfig;
pub use data::{build_rfm, load_table};
pub use error::ChurnError;
pub use features::{ChurnFeatures, ChurnRule, Feature, FeatureMap, RfmRecord};
pub use model::{fit, ChurnModel, Prediction, TrainingParams};
pub use serving::{predict, PredictionRequest, PredictionResponse, Predictor, RiskLevel, RiskThresholds};
pub use training::{train, train_and_save, TrainingOutcome, TrainingPlan};

/// Result type of the core library
pub type Result<T> = std::result::Result<T, ChurnError>;

/// Result type at the application boundary (CLI, configuration)
pub type AppResult<T> = anyhow::Result<T>;
