//! Multinomial logistic regression.
//!
//! Fitting is delegated to `linfa-logistic`; the fitted weights are copied into
//! [`LogisticModel`] so they can be stored as plain JSON and scored without
//! linfa at prediction time.

use super::{
    Classifier, ClassifierKind, Probabilities, read_model_file, to_codes, to_matrix,
    write_model_file,
};
use crate::error::{PipelineError, Result};
use linfa::Dataset;
use linfa::traits::Fit as _;
use linfa_logistic::MultiLogisticRegression;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticModel {
    pub n_features: usize,
    /// One past the highest class code seen in training.
    pub n_classes: usize,
    /// Class codes, one per row of `coefficients`.
    pub classes: Vec<u32>,
    /// `[class][feature]`
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LogisticModel {
    fn logits(&self, row: &[f64]) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(weights, b)| b + weights.iter().zip(row).map(|(w, x)| w * x).sum::<f64>())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogisticClassifier {
    pub max_iterations: u64,
    /// L2 penalty strength.
    pub alpha: f64,
}

impl Default for LogisticClassifier {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            alpha: 1.0,
        }
    }
}

impl Classifier for LogisticClassifier {
    type Model = LogisticModel;

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::LogisticRegression
    }

    fn train(&self, data: &DataFrame, label: &Series) -> Result<LogisticModel> {
        let x = to_matrix(data)?;
        let codes = to_codes(label)?;
        if x.nrows() != codes.len() {
            return Err(PipelineError::Schema(format!(
                "{} feature rows for {} labels",
                x.nrows(),
                codes.len()
            )));
        }
        let mut distinct = codes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 2 {
            return Err(PipelineError::Model(format!(
                "Logistic Regression needs at least two classes, found {}",
                distinct.len()
            )));
        }

        let n_features = x.ncols();
        let y: Array1<usize> = codes.iter().map(|&c| c as usize).collect();

        let dataset = Dataset::new(x, y);
        let fitted = MultiLogisticRegression::default()
            .alpha(self.alpha)
            .max_iterations(self.max_iterations)
            .fit(&dataset)
            .map_err(|e| PipelineError::Model(format!("Logistic Regression training failed: {e}")))?;

        let params = fitted.params();
        let classes: Vec<u32> = fitted
            .classes()
            .iter()
            .map(|&c| u32::try_from(c).unwrap_or(u32::MAX))
            .collect();
        let coefficients = (0..params.ncols())
            .map(|k| params.column(k).to_vec())
            .collect();
        let n_classes = classes.iter().max().map_or(0, |&c| c as usize + 1);

        tracing::debug!(
            "Fitted logistic regression: {} features, {} classes",
            n_features,
            classes.len()
        );
        Ok(LogisticModel {
            n_features,
            n_classes,
            classes,
            coefficients,
            intercepts: fitted.intercept().to_vec(),
        })
    }

    fn save(&self, model: &LogisticModel, directory: &Path) -> Result<()> {
        write_model_file(model, directory)
    }

    fn load(&self, directory: &Path) -> Result<LogisticModel> {
        let model: LogisticModel = read_model_file(directory)?;
        let consistent = model.coefficients.len() == model.classes.len()
            && model.intercepts.len() == model.classes.len()
            && model.coefficients.iter().all(|w| w.len() == model.n_features);
        if !consistent {
            return Err(PipelineError::Model(format!(
                "model file in {} has inconsistent dimensions",
                directory.display()
            )));
        }
        Ok(model)
    }

    fn predict_proba(&self, model: &LogisticModel, data: &DataFrame) -> Result<Probabilities> {
        let x = to_matrix(data)?;
        if x.ncols() != model.n_features {
            return Err(PipelineError::Schema(format!(
                "model expects {} features, got {}",
                model.n_features,
                x.ncols()
            )));
        }

        let mut probs = Array2::zeros((x.nrows(), model.n_classes));
        for (row, mut out) in x.rows().into_iter().zip(probs.rows_mut()) {
            let logits = model.logits(&row.to_vec());
            let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = logits.iter().map(|v| (v - max).exp()).sum();
            for (&code, logit) in model.classes.iter().zip(&logits) {
                if let Some(slot) = out.get_mut(code as usize) {
                    *slot = (logit - max).exp() / sum;
                }
            }
        }
        Ok(Probabilities::new(probs))
    }
}
