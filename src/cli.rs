//! Command-line interface definitions and argument parsing

use crate::serving::PredictionRequest;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Customer churn scoring from RFM features
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build RFM features, train the classifier and write the artifact
    Train {
        /// Customers CSV (customer_id, name, signup_date), defaults to the configured one
        #[arg(long)]
        customers: Option<PathBuf>,

        /// Transactions CSV (transaction_id, customer_id, transaction_date, amount, payment_method)
        #[arg(long)]
        transactions: Option<PathBuf>,

        /// Reference date for recency, overrides the configured one
        #[arg(long)]
        reference_date: Option<NaiveDate>,

        /// Churn threshold in days, overrides the configured one
        #[arg(long)]
        churn_threshold_days: Option<i64>,

        /// Artifact output path, defaults to the configured versioned location
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score one customer
    Predict {
        /// Artifact to load, defaults to the configured versioned location
        #[arg(short, long)]
        artifact: Option<PathBuf>,

        /// JSON request: {"recency_days": 90, "frequency": 1, "monetary": 20.0}
        #[arg(long, conflicts_with = "rfm")]
        json: Option<String>,

        /// Comma-separated recency,frequency,monetary, e.g. "90,1,20.0"
        #[arg(long)]
        rfm: Option<String>,
    },

    /// Answer newline-delimited JSON requests from stdin
    Serve {
        /// Artifact to load, defaults to the configured versioned location
        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },

    /// Print revenue per customer and per payment method
    Analyze {
        #[arg(long)]
        customers: Option<PathBuf>,

        #[arg(long)]
        transactions: Option<PathBuf>,
    },

    /// Print the liveness message
    Health,
}

/// Parse a prediction request from `recency,frequency,monetary`
pub fn parse_rfm_values(raw: &str) -> crate::AppResult<PredictionRequest> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 3 {
        anyhow::bail!("RFM values must be in format 'recency,frequency,monetary'");
    }

    let recency_days: i64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid recency value: {}", parts[0]))?;
    let frequency: i64 = parts[1]
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid frequency value: {}", parts[1]))?;
    let monetary: f64 = parts[2]
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid monetary value: {}", parts[2]))?;

    Ok(PredictionRequest {
        recency_days,
        frequency,
        monetary,
    })
}

impl Command {
    /// Prediction request carried by `predict`, from `--json` or `--rfm`
    pub fn prediction_request(&self) -> crate::AppResult<Option<PredictionRequest>> {
        match self {
            Command::Predict { json: Some(body), .. } => Ok(Some(PredictionRequest::from_json(body)?)),
            Command::Predict { rfm: Some(raw), .. } => Ok(Some(parse_rfm_values(raw)?)),
            Command::Predict { .. } => anyhow::bail!("predict needs either --json or --rfm"),
            _ => Ok(None),
        }
    }
}
