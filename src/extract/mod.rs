//! Feature extraction: raw dataset directory → feature table.
//!
//! The pipeline only depends on [`FeatureExtractor`]; [`AudioFeatureExtractor`]
//! is the implementation shipped with the crate.

pub mod audio;
pub mod spectral;

pub use audio::AudioFeatureExtractor;

use crate::error::Result;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maps a raw dataset root to a feature table with one row per sample, numeric
/// feature columns, and a string label column.
pub trait FeatureExtractor {
    fn extract(&self, dataset_root: &Path) -> Result<DataFrame>;
}

/// How per-frame features are summarised into one value per sample.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// `<feature>_mean`
    #[default]
    Mean,
    /// `<feature>_mean` and `<feature>_std`
    MeanStd,
}
