//! Model artifact directories.
//!
//! ```text
//! <models root>/<snapshot id>/
//!   model.json      fitted model, written by the classifier
//!   artifact.json   ArtifactManifest
//! ```

use super::{Classifier, ClassifierKind};
use crate::dataset::io::{is_valid_directory, is_valid_file};
use crate::dataset::processing::{LabelEncoding, NormalisationState};
use crate::dataset::snapshot::write_once;
use crate::error::{PipelineError, Result, ResultExt as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ARTIFACT_FILE: &str = "artifact.json";

/// Everything needed to score new data with a stored model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactManifest {
    pub kind: ClassifierKind,
    pub created_at: DateTime<Utc>,
    pub label_column: String,
    /// Training feature columns, in matrix order.
    pub feature_columns: Vec<String>,
    pub label_encoding: Option<LabelEncoding>,
    pub normalisation: Option<NormalisationState>,
    /// Id of the snapshot the model was trained on.
    pub snapshot: Option<String>,
}

impl ArtifactManifest {
    pub fn new(kind: ClassifierKind, label_column: &str, feature_columns: Vec<String>) -> Self {
        Self {
            kind,
            created_at: Utc::now(),
            label_column: label_column.to_owned(),
            feature_columns,
            label_encoding: None,
            normalisation: None,
            snapshot: None,
        }
    }
}

/// Persists a fitted model and its manifest into `directory`.
///
/// # Errors
///
/// [`PipelineError::Io`] with kind `AlreadyExists` if `directory` already has
/// entries, [`PipelineError::Config`] if the manifest names another classifier.
/// Nothing is left in `directory` when a write fails.
pub fn save_artifact<C: Classifier>(
    classifier: &C,
    model: &C::Model,
    manifest: &ArtifactManifest,
    directory: &Path,
) -> Result<PathBuf> {
    if manifest.kind != classifier.kind() {
        return Err(PipelineError::Config(format!(
            "manifest is for {}, classifier is {}",
            manifest.kind,
            classifier.kind()
        )));
    }
    let json = serde_json::to_string_pretty(manifest)
        .context("Failed to serialize artifact manifest")?;
    write_once(directory, || {
        classifier.save(model, directory)?;
        std::fs::write(directory.join(ARTIFACT_FILE), &json)
            .context("Failed to write artifact manifest")
    })?;

    tracing::info!(
        directory = %directory.display(),
        kind = %manifest.kind,
        "Persisted model artifact"
    );
    Ok(directory.to_path_buf())
}

/// Reads `artifact.json` from a model directory.
///
/// # Errors
///
/// [`PipelineError::NotFound`] if the directory or manifest is missing,
/// [`PipelineError::Schema`] if the manifest cannot be parsed.
pub fn read_artifact_manifest(directory: &Path) -> Result<ArtifactManifest> {
    if !is_valid_directory(directory) {
        return Err(PipelineError::NotFound(format!(
            "model directory {}",
            directory.display()
        )));
    }
    let path = directory.join(ARTIFACT_FILE);
    if !is_valid_file(&path) {
        return Err(PipelineError::NotFound(format!(
            "artifact manifest {}",
            path.display()
        )));
    }
    let json = std::fs::read_to_string(&path).context("Failed to read artifact manifest")?;
    serde_json::from_str(&json)
        .map_err(|e| PipelineError::Schema(format!("malformed {}: {e}", path.display())))
}

/// Loads a model and its manifest.
///
/// # Errors
///
/// [`PipelineError::NotFound`] if anything is missing, [`PipelineError::Config`]
/// if the artifact was written by a different kind of classifier.
pub fn load_artifact<C: Classifier>(
    classifier: &C,
    directory: &Path,
) -> Result<(C::Model, ArtifactManifest)> {
    let manifest = read_artifact_manifest(directory)?;
    if manifest.kind != classifier.kind() {
        return Err(PipelineError::Config(format!(
            "{} holds a {} model, expected {}",
            directory.display(),
            manifest.kind,
            classifier.kind()
        )));
    }
    let model = classifier.load(directory)?;
    tracing::info!(
        directory = %directory.display(),
        kind = %manifest.kind,
        "Loaded model artifact"
    );
    Ok((model, manifest))
}
