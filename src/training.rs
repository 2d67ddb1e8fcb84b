//! End-to-end training run: features, fit, artifact

use crate::artifact::ModelArtifact;
use crate::data::build_rfm;
use crate::features::ChurnRule;
use crate::metrics::EvaluationReport;
use crate::model::{fit, TrainingParams};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::path::Path;
use tracing::info;

/// Everything a training run depends on besides the data
#[derive(Debug, Clone)]
pub struct TrainingPlan {
    pub reference_date: NaiveDate,
    pub churn_rule: ChurnRule,
    pub params: TrainingParams,
    pub model_version: String,
}

/// Result of a successful training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    /// Customers that produced an RFM record
    pub customers: usize,
    /// Customers labeled churned
    pub churned: usize,
    /// Held-out metrics, absent when the held-out partition is empty
    pub evaluation: Option<EvaluationReport>,
}

/// Derive features, fit the classifier and bundle the artifact
///
/// Nothing is written; a failure at any stage yields no artifact.
pub fn train(
    customers: &DataFrame,
    transactions: &DataFrame,
    plan: &TrainingPlan,
) -> crate::Result<TrainingOutcome> {
    let records = build_rfm(customers, transactions, plan.reference_date, plan.churn_rule)?;
    let churned = records.iter().filter(|r| r.churn_label == 1).count();

    let (model, evaluation) = fit(&records, &plan.params)?;
    let artifact = ModelArtifact::new(
        model,
        &plan.model_version,
        plan.reference_date,
        plan.churn_rule,
    );

    if let Some(report) = &evaluation {
        info!(
            accuracy = report.accuracy,
            held_out = report.held_out_size,
            "Held-out evaluation"
        );
    }

    Ok(TrainingOutcome {
        artifact,
        customers: records.len(),
        churned,
        evaluation,
    })
}

/// Train and persist the artifact at `path` only if training succeeds
pub fn train_and_save<P: AsRef<Path>>(
    customers: &DataFrame,
    transactions: &DataFrame,
    plan: &TrainingPlan,
    path: P,
) -> crate::Result<TrainingOutcome> {
    let outcome = train(customers, transactions, plan)?;
    outcome.artifact.save(path)?;
    Ok(outcome)
}
