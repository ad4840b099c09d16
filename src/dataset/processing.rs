//! Feature normalisation and label encoding.
//!
//! Both operations are side-effect free: they take a table by reference and
//! return a new one. The `*_with_*` variants also hand back the fitted
//! parameters so they can be stored next to a snapshot or model and applied to
//! unseen data later.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NormalisationMethod {
    /// `(x - mean) / std`, sample standard deviation
    #[default]
    ZScore,
    /// `(x - min) / (max - min)`
    MinMax,
}

impl NormalisationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ZScore => "z_score",
            Self::MinMax => "min_max",
        }
    }
}

/// How a single feature column is rescaled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaling {
    /// `(x - offset) / scale`
    Affine { offset: f64, scale: f64 },
    /// Zero variance (or too few values): values are left as they are.
    Passthrough,
}

impl Scaling {
    fn apply(self, value: f64) -> f64 {
        match self {
            Self::Affine { offset, scale } => (value - offset) / scale,
            Self::Passthrough => value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnScaling {
    pub column: String,
    pub scaling: Scaling,
}

/// Per-column scaling parameters fit from one table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalisationState {
    pub method: NormalisationMethod,
    pub label_column: String,
    pub columns: Vec<ColumnScaling>,
}

impl NormalisationState {
    /// Fits scaling parameters for every non-label column of `df`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Schema`] if the label column is missing or a feature
    /// column is not numeric.
    pub fn fit(df: &DataFrame, label_column: &str, method: NormalisationMethod) -> Result<Self> {
        require_column(df, label_column)?;

        let mut columns = Vec::new();
        for name in feature_columns(df, label_column) {
            let values = numeric_values(df, &name)?;
            let scaling = fit_scaling(&values, method);
            columns.push(ColumnScaling {
                column: name,
                scaling,
            });
        }

        Ok(Self {
            method,
            label_column: label_column.to_owned(),
            columns,
        })
    }

    /// Applies the stored parameters to `df`. Columns that were not part of the
    /// fit (including the label column) are returned untouched.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Schema`] if a fitted column is absent or not numeric.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut out = df.clone();
        for ColumnScaling { column, scaling } in &self.columns {
            let values = numeric_values(df, column)?;
            let scaled: Vec<Option<f64>> = values
                .iter()
                .map(|v| v.map(|x| scaling.apply(x)))
                .collect();
            out.with_column(Series::new(column.as_str().into(), scaled))?;
        }
        Ok(out)
    }

    pub fn scaling_of(&self, column: &str) -> Option<Scaling> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.scaling)
    }
}

fn fit_scaling(values: &[Option<f64>], method: NormalisationMethod) -> Scaling {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.len() < 2 {
        return Scaling::Passthrough;
    }

    let (offset, scale) = match method {
        NormalisationMethod::MinMax => {
            let min = present.iter().copied().fold(f64::INFINITY, f64::min);
            let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min, max - min)
        }
        NormalisationMethod::ZScore => {
            let n = present.len() as f64;
            let mean = present.iter().sum::<f64>() / n;
            let var = present.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            (mean, var.sqrt())
        }
    };

    if !offset.is_finite() || !scale.is_finite() || scale == 0.0 {
        Scaling::Passthrough
    } else {
        Scaling::Affine { offset, scale }
    }
}

/// Bijective label → code mapping; the code of a class is its index in `classes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelEncoding {
    classes: Vec<String>,
}

impl LabelEncoding {
    /// Builds the mapping in first-occurrence order.
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = Vec::new();
        let mut seen: HashSet<&'a str> = HashSet::new();
        for label in labels {
            if seen.insert(label) {
                classes.push(label.to_owned());
            }
        }
        Self { classes }
    }

    /// Rebuilds a mapping from an ordered class list.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Schema`] if a class name repeats.
    pub fn from_classes(classes: Vec<String>) -> Result<Self> {
        let mut sorted = classes.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != classes.len() {
            return Err(PipelineError::Schema(
                "label encoding contains duplicate classes".to_owned(),
            ));
        }
        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn code_of(&self, label: &str) -> Option<u32> {
        self.classes
            .iter()
            .position(|c| c == label)
            .and_then(|i| u32::try_from(i).ok())
    }

    pub fn name_of(&self, code: u32) -> Option<&str> {
        self.classes.get(code as usize).map(String::as_str)
    }

    /// Maps a label series to its `UInt32` codes.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Schema`] on nulls or on labels the mapping does not know.
    pub fn encode(&self, labels: &Series) -> Result<Series> {
        let lookup: HashMap<&str, u32> = self
            .classes
            .iter()
            .zip(0u32..)
            .map(|(c, i)| (c.as_str(), i))
            .collect();

        let strings = label_strings(labels)?;
        let codes = strings
            .iter()
            .map(|s| {
                lookup.get(s.as_str()).copied().ok_or_else(|| {
                    PipelineError::Schema(format!(
                        "label '{s}' in column '{}' is not part of the encoding",
                        labels.name()
                    ))
                })
            })
            .collect::<Result<Vec<u32>>>()?;

        Ok(Series::new(labels.name().clone(), codes))
    }
}

/// Fails with [`PipelineError::Schema`] unless `df` has a column called `name`.
pub fn require_column(df: &DataFrame, name: &str) -> Result<()> {
    if df.get_column_names().iter().any(|c| c.as_str() == name) {
        Ok(())
    } else {
        Err(PipelineError::Schema(format!(
            "column '{name}' not found in table with columns {:?}",
            df.get_column_names()
        )))
    }
}

/// All column names except the label column, in table order.
pub fn feature_columns(df: &DataFrame, label_column: &str) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .filter(|s| s != label_column)
        .collect()
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    require_column(df, name)?;
    let series = df.column(name)?.as_materialized_series();
    if !series.dtype().is_primitive_numeric() {
        return Err(PipelineError::Schema(format!(
            "feature column '{name}' is not numeric ({})",
            series.dtype()
        )));
    }
    let floats = series.cast(&DataType::Float64)?;
    Ok(floats.f64()?.iter().collect())
}

fn label_strings(labels: &Series) -> Result<Vec<String>> {
    let as_text = labels.cast(&DataType::String)?;
    as_text
        .str()?
        .iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(str::to_owned).ok_or_else(|| {
                PipelineError::Schema(format!(
                    "label column '{}' has a null value at row {row}",
                    labels.name()
                ))
            })
        })
        .collect()
}

/// Returns a copy of `df` with every non-label column rescaled using
/// parameters fit from `df` itself (z-score).
///
/// # Errors
///
/// [`PipelineError::Schema`] if the label column is missing or a feature
/// column is not numeric.
pub fn normalize(df: &DataFrame, label_column: &str) -> Result<DataFrame> {
    normalize_with_state(df, label_column, NormalisationMethod::default()).map(|(df, _)| df)
}

/// Like [`normalize`], with an explicit method, also returning the fitted state.
pub fn normalize_with_state(
    df: &DataFrame,
    label_column: &str,
    method: NormalisationMethod,
) -> Result<(DataFrame, NormalisationState)> {
    let state = NormalisationState::fit(df, label_column, method)?;
    let normalised = state.apply(df)?;
    Ok((normalised, state))
}

/// Returns a copy of `df` whose label column holds `UInt32` codes assigned in
/// first-occurrence order.
///
/// # Errors
///
/// [`PipelineError::Schema`] if the label column is missing, empty, or has nulls.
pub fn encode_labels(df: &DataFrame, label_column: &str) -> Result<DataFrame> {
    encode_labels_with_mapping(df, label_column).map(|(df, _)| df)
}

/// Like [`encode_labels`], also returning the mapping that was applied.
pub fn encode_labels_with_mapping(
    df: &DataFrame,
    label_column: &str,
) -> Result<(DataFrame, LabelEncoding)> {
    require_column(df, label_column)?;
    let labels = df.column(label_column)?.as_materialized_series();
    if labels.is_empty() {
        return Err(PipelineError::Schema(format!(
            "label column '{label_column}' is empty"
        )));
    }

    let strings = label_strings(labels)?;
    let encoding = LabelEncoding::fit(strings.iter().map(String::as_str));
    let codes = encoding.encode(labels)?;

    let mut out = df.clone();
    out.with_column(codes)?;
    Ok((out, encoding))
}
