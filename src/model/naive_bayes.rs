//! Gaussian naive Bayes.

use super::{
    Classifier, ClassifierKind, Probabilities, read_model_file, to_codes, to_matrix,
    write_model_file,
};
use crate::error::{PipelineError, Result};
use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

/// Per-class feature statistics. Classes absent from the training labels have
/// no entry and are given zero probability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassStats {
    pub code: u32,
    pub prior: f64,
    pub means: Vec<f64>,
    pub variances: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GaussianNbModel {
    pub n_features: usize,
    /// One past the highest class code seen in training.
    pub n_classes: usize,
    pub classes: Vec<ClassStats>,
}

#[derive(Debug, Clone, Copy)]
pub struct NaiveBayesClassifier {
    /// Added to every per-class variance, as a fraction of the largest feature
    /// variance.
    pub var_smoothing: f64,
}

impl Default for NaiveBayesClassifier {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
        }
    }
}

impl NaiveBayesClassifier {
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }
}

impl Classifier for NaiveBayesClassifier {
    type Model = GaussianNbModel;

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::NaiveBayes
    }

    fn train(&self, data: &DataFrame, label: &Series) -> Result<GaussianNbModel> {
        let x = to_matrix(data)?;
        let y = to_codes(label)?;
        if x.nrows() != y.len() {
            return Err(PipelineError::Schema(format!(
                "{} feature rows for {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if y.is_empty() {
            return Err(PipelineError::Model(
                "cannot train on an empty table".to_owned(),
            ));
        }

        let n_features = x.ncols();
        let n_samples = x.nrows();
        let epsilon = self.var_smoothing * max_feature_variance(&x);

        let mut codes: Vec<u32> = y.clone();
        codes.sort_unstable();
        codes.dedup();
        let n_classes = codes.last().map_or(0, |&c| c as usize + 1);

        let mut classes = Vec::with_capacity(codes.len());
        for code in codes {
            // Welford's single-pass mean / variance
            let mut means = vec![0.0; n_features];
            let mut m2 = vec![0.0; n_features];
            let mut count = 0usize;
            for (row, _) in x.rows().into_iter().zip(&y).filter(|(_, c)| **c == code) {
                count += 1;
                for ((mean, acc), &value) in means.iter_mut().zip(m2.iter_mut()).zip(row.iter()) {
                    let delta = value - *mean;
                    *mean += delta / count as f64;
                    *acc += delta * (value - *mean);
                }
            }
            let variances = m2.iter().map(|v| v / count as f64 + epsilon).collect();
            classes.push(ClassStats {
                code,
                prior: count as f64 / n_samples as f64,
                means,
                variances,
            });
        }

        tracing::debug!(
            "Fitted Gaussian naive Bayes: {} samples, {} features, {} classes",
            n_samples,
            n_features,
            classes.len()
        );
        Ok(GaussianNbModel {
            n_features,
            n_classes,
            classes,
        })
    }

    fn save(&self, model: &GaussianNbModel, directory: &Path) -> Result<()> {
        write_model_file(model, directory)
    }

    fn load(&self, directory: &Path) -> Result<GaussianNbModel> {
        read_model_file(directory)
    }

    fn predict_proba(&self, model: &GaussianNbModel, data: &DataFrame) -> Result<Probabilities> {
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
            let log_joint: Vec<f64> = model
                .classes
                .iter()
                .map(|c| c.prior.ln() + log_likelihood(row, c))
                .collect();

            // log-sum-exp normalisation
            let max = log_joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = log_joint.iter().map(|v| (v - max).exp()).sum();
            for (stats, lj) in model.classes.iter().zip(&log_joint) {
                if let Some(slot) = out.get_mut(stats.code as usize) {
                    *slot = (lj - max).exp() / sum;
                }
            }
        }
        Ok(Probabilities::new(probs))
    }
}

fn log_likelihood(row: ArrayView1<'_, f64>, stats: &ClassStats) -> f64 {
    row.iter()
        .zip(&stats.means)
        .zip(&stats.variances)
        .map(|((&x, &mean), &var)| -0.5 * ((x - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
        .sum()
}

fn max_feature_variance(x: &Array2<f64>) -> f64 {
    let variance = x.var_axis(ndarray::Axis(0), 0.0);
    let max = variance.iter().copied().fold(0.0, f64::max);
    // all-constant features would otherwise leave zero variances
    if max > 0.0 { max } else { 1.0 }
}
