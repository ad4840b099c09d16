//! Storage for train/test split snapshots.
//!
//! A snapshot directory holds exactly two tables plus a manifest:
//!
//! ```text
//! <features root>/<snapshot id>/
//!   train.csv       features + label column
//!   test.csv        features + label column
//!   snapshot.json   SnapshotManifest
//! ```
//!
//! Snapshot directories are write-once: persisting into a directory that already
//! has entries fails and leaves those entries alone.

use super::io::{is_empty_directory, is_valid_directory, is_valid_file, load_table, save_table};
use super::processing::{LabelEncoding, NormalisationState, require_column};
use super::split::{SplitDataset, combine_label, separate_label};
use crate::error::{PipelineError, Result, ResultExt as _};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const TRAIN_FILE: &str = "train.csv";
pub const TEST_FILE: &str = "test.csv";
pub const MANIFEST_FILE: &str = "snapshot.json";

/// How the persisted split was produced. Everything here is optional so a split
/// built by hand can still be persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotProvenance {
    pub seed: Option<u64>,
    pub shuffle: Option<bool>,
    pub test_rate: Option<f64>,
    pub label_encoding: Option<LabelEncoding>,
    pub normalisation: Option<NormalisationState>,
}

/// Metadata stored next to the two partition tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotManifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub label_column: String,
    pub feature_columns: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    #[serde(flatten)]
    pub provenance: SnapshotProvenance,
}

impl SnapshotManifest {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize snapshot manifest")
    }

    /// # Errors
    ///
    /// [`PipelineError::Schema`] if `json` is not a snapshot manifest.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::Schema(format!("malformed snapshot manifest: {e}")))
    }
}

/// Creates `directory` if needed and refuses to write into it if it has entries.
/// Returns whether the directory was created here.
pub(crate) fn prepare_empty_directory(directory: &Path) -> Result<bool> {
    if directory.exists() {
        if !is_valid_directory(directory) {
            return Err(PipelineError::already_populated(directory));
        }
        if !is_empty_directory(directory)? {
            return Err(PipelineError::already_populated(directory));
        }
        Ok(false)
    } else {
        std::fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;
        Ok(true)
    }
}

/// Runs `write` against an empty `directory`. If it fails, whatever it wrote is
/// discarded so the same directory can be written again.
pub(crate) fn write_once<T>(directory: &Path, write: impl FnOnce() -> Result<T>) -> Result<T> {
    let created = prepare_empty_directory(directory)?;
    write().inspect_err(|err| {
        if let Err(cleanup) = discard_partial(directory, created) {
            tracing::warn!(
                "Could not clean up {} after failed write ({err}): {cleanup}",
                directory.display()
            );
        }
    })
}

fn discard_partial(directory: &Path, created: bool) -> std::io::Result<()> {
    if created {
        return std::fs::remove_dir_all(directory);
    }
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Writes the train and test partitions (label column re-attached) and the
/// manifest into `directory`.
///
/// # Errors
///
/// [`PipelineError::Io`] with kind `AlreadyExists` if `directory` exists and is
/// not empty; [`PipelineError::Schema`] if a label and its data disagree in length.
/// A failed write leaves no partial snapshot behind.
pub fn persist_snapshot(
    split: &SplitDataset,
    label_column: &str,
    directory: &Path,
    provenance: SnapshotProvenance,
) -> Result<PathBuf> {
    let train_label = split.train_label.clone().with_name(label_column.into());
    let test_label = split.test_label.clone().with_name(label_column.into());
    let mut train = combine_label(&split.train_data, &train_label)?;
    let mut test = combine_label(&split.test_data, &test_label)?;

    let manifest = SnapshotManifest {
        id: directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        created_at: Utc::now(),
        label_column: label_column.to_owned(),
        feature_columns: split.feature_columns(),
        train_rows: split.train_rows(),
        test_rows: split.test_rows(),
        provenance,
    };

    write_once(directory, || {
        save_table(&mut train, &directory.join(TRAIN_FILE))?;
        save_table(&mut test, &directory.join(TEST_FILE))?;
        std::fs::write(directory.join(MANIFEST_FILE), manifest.to_json()?)
            .context("Failed to write snapshot manifest")
    })?;

    tracing::info!(
        directory = %directory.display(),
        train_rows = manifest.train_rows,
        test_rows = manifest.test_rows,
        "Persisted dataset snapshot"
    );

    Ok(directory.to_path_buf())
}

/// Reads a snapshot back into its four aligned structures.
///
/// Feature columns are restored as `Float64` and an integer label column as
/// `UInt32`, the types the data processor produces.
///
/// # Errors
///
/// [`PipelineError::NotFound`] if the directory or either table is missing,
/// [`PipelineError::Schema`] if `label_column` is absent from either table.
pub fn load_snapshot(directory: &Path, label_column: &str) -> Result<SplitDataset> {
    if !is_valid_directory(directory) {
        return Err(PipelineError::NotFound(format!(
            "snapshot directory {}",
            directory.display()
        )));
    }
    let train_path = directory.join(TRAIN_FILE);
    let test_path = directory.join(TEST_FILE);
    for path in [&train_path, &test_path] {
        if !is_valid_file(path) {
            return Err(PipelineError::NotFound(format!(
                "snapshot artifact {}",
                path.display()
            )));
        }
    }

    let train = load_table(&train_path)?;
    let test = load_table(&test_path)?;
    require_column(&train, label_column).context(TRAIN_FILE)?;
    require_column(&test, label_column).context(TEST_FILE)?;

    let train = restore_types(train, label_column)?;
    let test = restore_types(test, label_column)?;
    let (train_data, train_label) = separate_label(&train, label_column)?;
    let (test_data, test_label) = separate_label(&test, label_column)?;

    if train_data.get_column_names() != test_data.get_column_names() {
        return Err(PipelineError::Schema(format!(
            "train and test partitions in {} have different columns",
            directory.display()
        )));
    }

    Ok(SplitDataset {
        train_data,
        test_data,
        train_label,
        test_label,
    })
}

fn restore_types(mut df: DataFrame, label_column: &str) -> Result<DataFrame> {
    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for name in names {
        let series = df.column(&name)?.as_materialized_series();
        let target = if name == label_column {
            if series.dtype().is_integer() {
                DataType::UInt32
            } else {
                continue;
            }
        } else if series.dtype().is_primitive_numeric() {
            DataType::Float64
        } else {
            continue;
        };
        let restored = series.strict_cast(&target)?;
        df.with_column(restored)?;
    }
    Ok(df)
}

/// Reads `snapshot.json` from a snapshot directory.
pub fn read_manifest(directory: &Path) -> Result<SnapshotManifest> {
    let path = directory.join(MANIFEST_FILE);
    if !is_valid_file(&path) {
        return Err(PipelineError::NotFound(format!(
            "snapshot manifest {}",
            path.display()
        )));
    }
    let json = std::fs::read_to_string(&path).context("Failed to read snapshot manifest")?;
    SnapshotManifest::from_json(&json)
}

/// Snapshot directories under `root` (those holding both tables), oldest first.
pub fn list_snapshots(root: &Path) -> Result<Vec<PathBuf>> {
    let names = super::io::folder_names(root)?;
    Ok(names
        .into_iter()
        .map(|n| root.join(n))
        .filter(|dir| is_valid_file(&dir.join(TRAIN_FILE)) && is_valid_file(&dir.join(TEST_FILE)))
        .collect())
}
