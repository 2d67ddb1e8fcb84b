//! Configuration for training and serving

use crate::artifact::{artifact_path, resolve_path};
use crate::features::{ChurnRule, DEFAULT_CHURN_THRESHOLD_DAYS};
use crate::model::TrainingParams;
use crate::serving::RiskThresholds;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Configuration file loaded when no `--config` is given, relative to the crate root
pub const DEFAULT_CONFIG_PATH: &str = "config/churn.toml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub features: FeatureConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub training: TrainingParams,
    #[serde(default)]
    pub risk: RiskThresholds,
    pub artifact: ArtifactConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub anchor: PathBuf,
}

/// Churn definition and recency reference point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Date recency is measured against (never the wall clock)
    pub reference_date: NaiveDate,
    /// Inactivity in days above which a customer is labeled churned
    #[serde(default = "default_churn_threshold_days")]
    pub churn_threshold_days: i64,
}

fn default_churn_threshold_days() -> i64 {
    DEFAULT_CHURN_THRESHOLD_DAYS
}

/// Default training and analysis inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub customers: PathBuf,
    pub transactions: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            customers: PathBuf::from("data/customers.csv"),
            transactions: PathBuf::from("data/transactions.csv"),
        }
    }
}

/// Where artifacts are written and read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Artifact directory; relative paths resolve against the config anchor
    pub dir: PathBuf,
    /// Model version embedded in the file name
    pub version: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Subscriber filter: a non-empty `RUST_LOG` wins over the configured level
    pub fn env_filter(&self, verbose: bool) -> EnvFilter {
        let level = if verbose { "debug" } else { self.level.as_str() };
        build_env_filter(std::env::var("RUST_LOG").ok().as_deref(), level)
    }
}

/// Use `rust_log` directives when present and valid, else `churnforge=<level>`
pub fn build_env_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(format!("churnforge={level}")))
}

fn environment() -> Environment {
    Environment::with_prefix("CHURN")
        .separator("__")
        .try_parsing(true)
}

/// Anchor used when no config file is involved
pub fn default_anchor() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

impl AppConfig {
    /// Load configuration from a TOML file, with `CHURN__SECTION__KEY` environment overrides
    ///
    /// Relative paths inside the file resolve against the file's directory.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(environment())
            .build()
            .context("Failed to build configuration")?;

        let mut app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        let absolute = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve config path {}", path.display()))?;
        app.anchor = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(default_anchor);
        Ok(app)
    }

    /// Built-in defaults with `CHURN__SECTION__KEY` environment overrides applied
    pub fn from_environment() -> Result<Self> {
        let defaults =
            Config::try_from(&Self::default()).context("Failed to encode default configuration")?;
        let config = Config::builder()
            .add_source(defaults)
            .add_source(environment())
            .build()
            .context("Failed to build configuration")?;

        let mut app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.anchor = default_anchor();
        Ok(app)
    }

    /// Load from `path` when given, otherwise from the bundled config file,
    /// otherwise from built-in defaults; environment overrides apply in every case
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let bundled = default_anchor().join(DEFAULT_CONFIG_PATH);
                if bundled.is_file() {
                    Self::load_from_path(bundled)
                } else {
                    Self::from_environment()
                }
            }
        }
    }

    pub fn churn_rule(&self) -> ChurnRule {
        ChurnRule::new(self.features.churn_threshold_days)
    }

    pub fn customers_file(&self) -> PathBuf {
        resolve_path(&self.anchor, &self.data.customers)
    }

    pub fn transactions_file(&self) -> PathBuf {
        resolve_path(&self.anchor, &self.data.transactions)
    }

    pub fn artifact_dir(&self) -> PathBuf {
        resolve_path(&self.anchor, &self.artifact.dir)
    }

    /// Versioned artifact file for the configured model version
    pub fn artifact_file(&self) -> PathBuf {
        artifact_path(&self.artifact_dir(), &self.artifact.version)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig {
                reference_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap_or_default(),
                churn_threshold_days: DEFAULT_CHURN_THRESHOLD_DAYS,
            },
            data: DataConfig::default(),
            training: TrainingParams::default(),
            risk: RiskThresholds::default(),
            artifact: ArtifactConfig {
                dir: PathBuf::from("artifacts"),
                version: "v1".to_string(),
            },
            logging: LoggingConfig::default(),
            anchor: default_anchor(),
        }
    }
}
