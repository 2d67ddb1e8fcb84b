//! churnforge: train, score and analyze customer churn from the command line

use anyhow::{Context, Result};
use churnforge::cli::{Args, Command};
use churnforge::serving::LIVENESS_MESSAGE;
use churnforge::{
    analysis, load_table, train_and_save, AppConfig, ArtifactHandle, ModelArtifact,
    PredictionResponse, Predictor, TrainingPlan,
};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_or_default(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.env_filter(args.verbose))
        .with_writer(std::io::stderr)
        .init();

    match &args.command {
        Command::Train {
            customers,
            transactions,
            reference_date,
            churn_threshold_days,
            output,
        } => {
            let mut config = config.clone();
            if let Some(date) = reference_date {
                config.features.reference_date = *date;
            }
            if let Some(days) = churn_threshold_days {
                config.features.churn_threshold_days = *days;
            }
            let customers = customers.clone().unwrap_or_else(|| config.customers_file());
            let transactions = transactions.clone().unwrap_or_else(|| config.transactions_file());
            let output = output.clone().unwrap_or_else(|| config.artifact_file());
            run_training(&config, &customers, &transactions, &output)
        }
        Command::Predict { artifact, .. } => {
            let request = args
                .command
                .prediction_request()?
                .context("missing prediction request")?;
            let predictor = load_predictor(&config, artifact.as_deref())?;
            let response = predictor.respond(&request)?;
            print_response(&response)
        }
        Command::Serve { artifact } => run_serve(&config, artifact.as_deref()),
        Command::Analyze {
            customers,
            transactions,
        } => {
            let customers = customers.clone().unwrap_or_else(|| config.customers_file());
            let transactions = transactions.clone().unwrap_or_else(|| config.transactions_file());
            run_analysis(&customers, &transactions)
        }
        Command::Health => {
            println!("{}", serde_json::json!({ "message": LIVENESS_MESSAGE }));
            Ok(())
        }
    }
}

fn load_predictor(config: &AppConfig, artifact: Option<&Path>) -> Result<Predictor> {
    let path: PathBuf = artifact.map_or_else(|| config.artifact_file(), Path::to_path_buf);
    let artifact = ModelArtifact::load(&path)
        .with_context(|| format!("Failed to load artifact from {}", path.display()))?;
    Ok(Predictor::new(ArtifactHandle::new(artifact), config.risk))
}

fn print_response(response: &PredictionResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

/// Run the full training pipeline and report held-out metrics
fn run_training(config: &AppConfig, customers: &Path, transactions: &Path, output: &Path) -> Result<()> {
    println!("=== Churn Model Training ===\n");
    let start_time = Instant::now();

    let customers_df = load_table(customers)
        .with_context(|| format!("Failed to read customers from {}", customers.display()))?;
    let transactions_df = load_table(transactions)
        .with_context(|| format!("Failed to read transactions from {}", transactions.display()))?;
    println!(
        "✓ Data loaded: {} customers, {} transactions",
        customers_df.height(),
        transactions_df.height()
    );

    let plan = TrainingPlan {
        reference_date: config.features.reference_date,
        churn_rule: config.churn_rule(),
        params: config.training.clone(),
        model_version: config.artifact.version.clone(),
    };
    info!(
        reference_date = %plan.reference_date,
        threshold_days = plan.churn_rule.threshold_days,
        "Training churn model"
    );

    let outcome = train_and_save(&customers_df, &transactions_df, &plan, output)?;

    println!(
        "✓ RFM features: {} customers ({} churned, threshold {} days)",
        outcome.customers, outcome.churned, plan.churn_rule.threshold_days
    );
    println!("✓ Model trained and saved to {}", output.display());

    match &outcome.evaluation {
        Some(report) => println!("\n=== Held-out Evaluation ===\n{report}"),
        None => println!("\nHeld-out partition is empty; no evaluation available"),
    }

    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// Score newline-delimited JSON requests until stdin closes
fn run_serve(config: &AppConfig, artifact: Option<&Path>) -> Result<()> {
    let predictor = load_predictor(config, artifact)?;
    info!(
        version = %predictor.handle().snapshot().model_version,
        "Serving predictions on stdin"
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read request line")?;
        if line.trim().is_empty() {
            continue;
        }
        writeln!(out, "{}", predictor.handle_line(&line))?;
        out.flush()?;
    }
    Ok(())
}

fn run_analysis(customers: &Path, transactions: &Path) -> Result<()> {
    let customers_df = load_table(customers)
        .with_context(|| format!("Failed to read customers from {}", customers.display()))?;
    let transactions_df = load_table(transactions)
        .with_context(|| format!("Failed to read transactions from {}", transactions.display()))?;

    let report = analysis::business_report(&customers_df, &transactions_df)?;
    println!("{report}");
    Ok(())
}
