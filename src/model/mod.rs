//! Classifiers and the glue between feature tables and model matrices.
//!
//! A [`Classifier`] is a stateless description of a learning algorithm; the
//! fitted state is its associated `Model` type, which is what gets persisted
//! under a model artifact directory (see [`store`]).

pub mod logistic;
pub mod naive_bayes;
pub mod store;

pub use logistic::LogisticClassifier;
pub use naive_bayes::NaiveBayesClassifier;
pub use store::{ArtifactManifest, load_artifact, read_artifact_manifest, save_artifact};

use crate::dataset::processing::LabelEncoding;
use crate::error::{PipelineError, Result, ResultExt as _};
use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// File holding the serialised fitted model inside an artifact directory.
pub const MODEL_FILE: &str = "model.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    NaiveBayes,
    LogisticRegression,
}

impl ClassifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NaiveBayes => "naive_bayes",
            Self::LogisticRegression => "logistic_regression",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-sample class probabilities; column `j` is class code `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities(Array2<f64>);

impl Probabilities {
    pub fn new(values: Array2<f64>) -> Self {
        Self(values)
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.0
    }

    pub fn n_samples(&self) -> usize {
        self.0.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.0.ncols()
    }

    /// Most probable class code per sample. Ties resolve to the lowest code.
    pub fn argmax(&self) -> Vec<u32> {
        self.0.rows().into_iter().map(argmax_row).collect()
    }
}

fn argmax_row(row: ArrayView1<'_, f64>) -> u32 {
    let mut best = 0usize;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &p) in row.iter().enumerate() {
        if p > best_value {
            best = i;
            best_value = p;
        }
    }
    u32::try_from(best).unwrap_or(u32::MAX)
}

/// A learning algorithm: fits a model from features and integer-coded labels
/// and scores new samples with it.
pub trait Classifier {
    type Model;

    fn kind(&self) -> ClassifierKind;

    /// Fits a model. `label` holds class codes aligned with the rows of `data`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Schema`] for non-numeric features or a label that is not
    /// integer coded, [`PipelineError::Model`] if fitting fails.
    fn train(&self, data: &DataFrame, label: &Series) -> Result<Self::Model>;

    /// Writes the fitted model into `directory`, which must already exist.
    fn save(&self, model: &Self::Model, directory: &Path) -> Result<()>;

    fn load(&self, directory: &Path) -> Result<Self::Model>;

    fn predict_proba(&self, model: &Self::Model, data: &DataFrame) -> Result<Probabilities>;

    fn predict(&self, model: &Self::Model, data: &DataFrame) -> Result<Vec<u32>> {
        Ok(self.predict_proba(model, data)?.argmax())
    }

    /// Fraction of rows whose predicted class equals the label, in `[0, 1]`.
    fn test(&self, model: &Self::Model, data: &DataFrame, label: &Series) -> Result<f64> {
        let expected = to_codes(label)?;
        if expected.is_empty() {
            return Err(PipelineError::Schema(
                "cannot compute accuracy on an empty test set".to_owned(),
            ));
        }
        let predicted = self.predict(model, data)?;
        if predicted.len() != expected.len() {
            return Err(PipelineError::Schema(format!(
                "{} predictions for {} labels",
                predicted.len(),
                expected.len()
            )));
        }
        let correct = predicted
            .iter()
            .zip(&expected)
            .filter(|(p, e)| p == e)
            .count();
        Ok(correct as f64 / expected.len() as f64)
    }
}

/// Converts every column of `data` to `f64` and stacks them into a row-major
/// matrix.
///
/// # Errors
///
/// [`PipelineError::Schema`] if a column is not numeric or has nulls.
pub fn to_matrix(data: &DataFrame) -> Result<Array2<f64>> {
    let mut columns = Vec::with_capacity(data.width());
    for column in data.get_columns() {
        let series = column.as_materialized_series();
        if !series.dtype().is_primitive_numeric() {
            return Err(PipelineError::Schema(format!(
                "feature column '{}' is {}, expected numeric",
                series.name(),
                series.dtype()
            )));
        }
        if series.null_count() > 0 {
            return Err(PipelineError::Schema(format!(
                "feature column '{}' contains missing values",
                series.name()
            )));
        }
        columns.push(Column::from(series.cast(&DataType::Float64)?));
    }
    let matrix = DataFrame::new(columns)?
        .to_ndarray::<Float64Type>(IndexOrder::C)
        .context("Failed to build feature matrix")?;
    Ok(matrix)
}

/// Reads an integer-coded label column.
///
/// # Errors
///
/// [`PipelineError::Schema`] if the column is not integer typed or has nulls.
pub fn to_codes(label: &Series) -> Result<Vec<u32>> {
    if !label.dtype().is_integer() {
        return Err(PipelineError::Schema(format!(
            "label column '{}' is {}, expected encoded class codes",
            label.name(),
            label.dtype()
        )));
    }
    let codes = label.strict_cast(&DataType::UInt32).map_err(|e| {
        PipelineError::Schema(format!(
            "label column '{}' has out of range codes: {e}",
            label.name()
        ))
    })?;
    codes
        .u32()?
        .into_iter()
        .map(|c| {
            c.ok_or_else(|| {
                PipelineError::Schema(format!("label column '{}' contains nulls", label.name()))
            })
        })
        .collect()
}

pub(crate) fn write_model_file<T: Serialize>(model: &T, directory: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(model)
        .map_err(|e| PipelineError::Model(format!("Failed to serialise model: {e}")))?;
    std::fs::write(directory.join(MODEL_FILE), json)?;
    Ok(())
}

pub(crate) fn read_model_file<T: DeserializeOwned>(directory: &Path) -> Result<T> {
    let path = directory.join(MODEL_FILE);
    if !path.is_file() {
        return Err(PipelineError::NotFound(format!(
            "model file {} does not exist",
            path.display()
        )));
    }
    let json = std::fs::read_to_string(&path)?;
    serde_json::from_str(&json)
        .map_err(|e| PipelineError::Model(format!("{} is not a valid model: {e}", path.display())))
}

/// Prediction for one input row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplePrediction {
    pub code: u32,
    /// Class name from the label encoding, or the code when none is stored.
    pub class: String,
    pub probabilities: Vec<f64>,
}

/// Scores an unprocessed feature table with a persisted model.
///
/// The stored normalisation (if any) is applied first, then the training
/// feature columns are selected in training order. Extra columns such as a
/// label are ignored.
///
/// # Errors
///
/// [`PipelineError::Schema`] if a training feature column is missing.
pub fn predict_samples<C: Classifier>(
    classifier: &C,
    model: &C::Model,
    manifest: &ArtifactManifest,
    table: &DataFrame,
) -> Result<Vec<SamplePrediction>> {
    let scaled = match &manifest.normalisation {
        Some(state) => state.apply(table)?,
        None => table.clone(),
    };
    for name in &manifest.feature_columns {
        if scaled.column(name).is_err() {
            return Err(PipelineError::Schema(format!(
                "input is missing feature column '{name}'"
            )));
        }
    }
    let features = scaled.select(manifest.feature_columns.iter().map(String::as_str))?;

    let probabilities = classifier.predict_proba(model, &features)?;
    let codes = probabilities.argmax();
    let predictions = probabilities
        .as_array()
        .rows()
        .into_iter()
        .zip(codes)
        .map(|(row, code)| SamplePrediction {
            code,
            class: class_name(manifest.label_encoding.as_ref(), code),
            probabilities: row.to_vec(),
        })
        .collect();
    Ok(predictions)
}

fn class_name(encoding: Option<&LabelEncoding>, code: u32) -> String {
    encoding
        .and_then(|e| e.name_of(code))
        .map_or_else(|| code.to_string(), str::to_owned)
}

/// Tabulates predictions: a `prediction` column and one `probability_<class>`
/// column per class.
///
/// # Errors
///
/// Propagates polars construction errors.
pub fn predictions_to_frame(
    predictions: &[SamplePrediction],
    encoding: Option<&LabelEncoding>,
) -> Result<DataFrame> {
    let n_classes = predictions
        .iter()
        .map(|p| p.probabilities.len())
        .max()
        .unwrap_or(0);

    let mut columns = vec![Column::new(
        "prediction".into(),
        predictions
            .iter()
            .map(|p| p.class.as_str())
            .collect::<Vec<_>>(),
    )];
    for j in 0..n_classes {
        let code = u32::try_from(j).unwrap_or(u32::MAX);
        let name = format!("probability_{}", class_name(encoding, code));
        let values: Vec<f64> = predictions
            .iter()
            .map(|p| p.probabilities.get(j).copied().unwrap_or(0.0))
            .collect();
        columns.push(Column::new(name.into(), values));
    }
    Ok(DataFrame::new(columns)?)
}
