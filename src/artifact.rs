//! Versioned model artifact, its on-disk layout and the shared serving handle

use crate::error::ChurnError;
use crate::features::{ChurnFeatures, ChurnRule};
use crate::model::{ChurnModel, Prediction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Layout version of the serialized artifact
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// File stem of persisted artifacts; the model version is appended
pub const ARTIFACT_STEM: &str = "churn_model";

/// Fitted pipeline plus the provenance needed to reproduce it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub model_version: String,
    /// Reference date the recency features were measured against
    pub trained_on: NaiveDate,
    pub churn_rule: ChurnRule,
    #[serde(flatten)]
    pub model: ChurnModel,
}

impl ModelArtifact {
    pub fn new(
        model: ChurnModel,
        model_version: &str,
        trained_on: NaiveDate,
        churn_rule: ChurnRule,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            model_version: model_version.to_string(),
            trained_on,
            churn_rule,
            model,
        }
    }

    pub fn predict(&self, features: &ChurnFeatures) -> Prediction {
        self.model.predict(features)
    }

    /// Write the artifact as JSON, replacing any previous file atomically
    ///
    /// The document is written to a temporary sibling and renamed into place,
    /// so readers see either the old artifact or the complete new one.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let encoded = serde_json::to_vec_pretty(self)?;
        let write_result = fs::File::create(&tmp_path).and_then(|mut file| {
            file.write_all(&encoded)?;
            file.sync_all()
        });
        if let Err(e) = write_result.and_then(|_| fs::rename(&tmp_path, path)) {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!(path = %tmp_path.display(), error = %cleanup, "Failed to remove partial artifact");
            }
            return Err(e.into());
        }

        info!(path = %path.display(), version = %self.model_version, "Artifact saved");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ChurnError::UnsupportedArtifact {
                found: artifact.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }

        info!(
            path = %path.display(),
            version = %artifact.model_version,
            trained_on = %artifact.trained_on,
            "Artifact loaded"
        );
        Ok(artifact)
    }
}

/// Resolve `path` against `anchor` unless it is already absolute
pub fn resolve_path(anchor: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        anchor.join(path)
    }
}

/// Well-known artifact location: `<dir>/churn_model_<version>.json`
pub fn artifact_path(dir: &Path, model_version: &str) -> PathBuf {
    dir.join(format!("{ARTIFACT_STEM}_{model_version}.json"))
}

/// Shared, read-only reference to the artifact in use
///
/// Readers take an `Arc` snapshot and keep using it for the whole request;
/// [`ArtifactHandle::swap`] publishes a replacement without touching the
/// artifact other readers hold.
#[derive(Debug, Clone)]
pub struct ArtifactHandle {
    current: Arc<RwLock<Arc<ModelArtifact>>>,
}

impl ArtifactHandle {
    pub fn new(artifact: ModelArtifact) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(artifact))),
        }
    }

    pub fn snapshot(&self) -> Arc<ModelArtifact> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Replace the artifact, returning the one previously in use
    pub fn swap(&self, artifact: ModelArtifact) -> Arc<ModelArtifact> {
        let replacement = Arc::new(artifact);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        info!(
            from = %guard.model_version,
            to = %replacement.model_version,
            "Swapping model artifact"
        );
        std::mem::replace(&mut *guard, replacement)
    }
}
