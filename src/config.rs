//! Run configuration.
//!
//! A run is described by a JSON file that is parsed and validated exactly once,
//! before any pipeline I/O happens. The result is an immutable [`RunConfig`]
//! that every component receives by reference.

use crate::dataset::processing::NormalisationMethod;
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::extract::Aggregate;
use crate::model::ClassifierKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the run gets its feature table from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FeatureSource {
    /// Run the feature extractor on the raw dataset root.
    Extract,
    /// Reuse a previously persisted snapshot directory.
    Reuse { snapshot: PathBuf },
}

/// Where the run gets its model from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ModelSource {
    /// Train a fresh model and persist it under the model root.
    Train { classifier: ClassifierKind },
    /// Load a previously persisted model artifact directory.
    Load { artifact: PathBuf },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Raw dataset root (one subdirectory per class)
    pub dataset: Option<PathBuf>,
    /// Root under which split snapshots are written
    pub features: Option<PathBuf>,
    /// Root under which model artifacts are written
    pub models: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub aggregate: Aggregate,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 1024,
            aggregate: Aggregate::Mean,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PredictConfig {
    /// Unlabeled feature table to classify
    pub input: PathBuf,
    /// Optional table to write the predictions to
    pub output: Option<PathBuf>,
}

/// On-disk shape of the configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRunConfig {
    label_name: String,
    test_rate: f64,
    shuffle: bool,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    normalisation: NormalisationMethod,
    #[serde(default)]
    paths: PathsConfig,
    #[serde(default = "default_feature_source")]
    features: FeatureSource,
    model: ModelSource,
    #[serde(default)]
    extraction: ExtractionConfig,
    #[serde(default)]
    predict: Option<PredictConfig>,
}

fn default_feature_source() -> FeatureSource {
    FeatureSource::Extract
}

/// Immutable configuration resolved once per run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunConfig {
    pub label_name: String,
    pub test_rate: f64,
    pub shuffle: bool,
    /// Seed for the shuffled split. Drawn once at load time when not configured.
    pub seed: u64,
    pub normalisation: NormalisationMethod,
    pub paths: PathsConfig,
    pub features: FeatureSource,
    pub model: ModelSource,
    pub extraction: ExtractionConfig,
    pub predict: Option<PredictConfig>,
}

impl RunConfig {
    /// Parses and validates a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for malformed JSON, missing required keys,
    /// unknown keys, or invalid values and mode combinations.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawRunConfig = serde_json::from_str(text)
            .map_err(|e| PipelineError::Config(format!("Invalid run configuration: {e}")))?;

        let seed = match raw.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                tracing::info!(seed, "No shuffle seed configured, drew one for this run");
                seed
            }
        };

        let config = Self {
            label_name: raw.label_name,
            test_rate: raw.test_rate,
            shuffle: raw.shuffle,
            seed,
            normalisation: raw.normalisation,
            paths: raw.paths,
            features: raw.features,
            model: raw.model,
            extraction: raw.extraction,
            predict: raw.predict,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks values and rejects run-mode combinations that cannot work,
    /// without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.label_name.trim().is_empty() {
            return Err(PipelineError::Config("label_name must not be empty".to_owned()));
        }
        validate_test_rate(self.test_rate)?;

        if self.features == FeatureSource::Extract {
            if self.paths.dataset.is_none() {
                return Err(PipelineError::Config(
                    "features.source = extract requires paths.dataset".to_owned(),
                ));
            }
            if self.paths.features.is_none() {
                return Err(PipelineError::Config(
                    "features.source = extract requires paths.features".to_owned(),
                ));
            }
            if self.extraction.frame_size == 0 || self.extraction.hop_size == 0 {
                return Err(PipelineError::Config(
                    "extraction.frame_size and extraction.hop_size must be positive".to_owned(),
                ));
            }
            if self.extraction.hop_size > self.extraction.frame_size {
                return Err(PipelineError::Config(format!(
                    "extraction.hop_size ({}) must not exceed extraction.frame_size ({})",
                    self.extraction.hop_size, self.extraction.frame_size
                )));
            }
        }

        if matches!(self.model, ModelSource::Train { .. }) && self.paths.models.is_none() {
            return Err(PipelineError::Config(
                "model.source = train requires paths.models".to_owned(),
            ));
        }

        Ok(())
    }

    /// Feature root for freshly extracted snapshots.
    pub fn features_root(&self) -> Result<&Path> {
        self.paths
            .features
            .as_deref()
            .ok_or_else(|| PipelineError::Config("paths.features is not set".to_owned()))
    }

    /// Model root for freshly trained artifacts.
    pub fn models_root(&self) -> Result<&Path> {
        self.paths
            .models
            .as_deref()
            .ok_or_else(|| PipelineError::Config("paths.models is not set".to_owned()))
    }

    /// Raw dataset root consumed by the feature extractor.
    pub fn dataset_root(&self) -> Result<&Path> {
        self.paths
            .dataset
            .as_deref()
            .ok_or_else(|| PipelineError::Config("paths.dataset is not set".to_owned()))
    }
}

/// The held-out fraction must lie strictly between 0 and 1.
pub fn validate_test_rate(test_rate: f64) -> Result<()> {
    if test_rate.is_finite() && test_rate > 0.0 && test_rate < 1.0 {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "test_rate must be in (0, 1), got {test_rate}"
        )))
    }
}

/// Reads and validates a run configuration file.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] if the file does not exist, and
/// [`PipelineError::Config`] if it is malformed.
pub fn load_run_config(path: &Path) -> Result<RunConfig> {
    if !path.is_file() {
        return Err(PipelineError::NotFound(format!(
            "configuration file {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    RunConfig::from_json(&content)
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;

    const BASE: &str = r#"{
        "label_name": "genre",
        "test_rate": 0.2,
        "shuffle": true,
        "seed": 7,
        "paths": { "dataset": "data", "features": "feature", "models": "model" },
        "features": { "source": "extract" },
        "model": { "source": "train", "classifier": "naive_bayes" }
    }"#;

    #[test]
    fn test_parse_full_config() {
        let config = RunConfig::from_json(BASE).unwrap();
        assert_eq!(config.label_name, "genre");
        assert_eq!(config.seed, 7);
        assert_eq!(config.normalisation, NormalisationMethod::ZScore);
        assert_eq!(config.features, FeatureSource::Extract);
        assert_eq!(
            config.model,
            ModelSource::Train {
                classifier: ClassifierKind::NaiveBayes
            }
        );
        assert_eq!(config.extraction, ExtractionConfig::default());
        assert!(config.predict.is_none());
    }

    #[test]
    fn test_reuse_and_load_modes() {
        let json = r#"{
            "label_name": "genre",
            "test_rate": 0.25,
            "shuffle": false,
            "features": { "source": "reuse", "snapshot": "feature/2019-01-23_23-19-56.871484" },
            "model": { "source": "load", "artifact": "model/2019-01-23_23-19-59.720996" }
        }"#;
        let config = RunConfig::from_json(json).unwrap();
        assert_eq!(
            config.features,
            FeatureSource::Reuse {
                snapshot: PathBuf::from("feature/2019-01-23_23-19-56.871484")
            }
        );
        assert!(matches!(config.model, ModelSource::Load { .. }));
    }

    #[test]
    fn test_missing_required_key_is_config_error() {
        let json = r#"{ "label_name": "genre", "shuffle": true,
            "model": { "source": "train", "classifier": "naive_bayes" } }"#;
        let err = RunConfig::from_json(json).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)), "got {err:?}");
    }

    #[test]
    fn test_test_rate_out_of_range() {
        for rate in ["0.0", "1.0", "-0.1", "1.5"] {
            let json = BASE.replace("0.2", rate);
            let err = RunConfig::from_json(&json).unwrap_err();
            assert!(matches!(err, PipelineError::Config(_)), "rate {rate}: {err:?}");
        }
    }

    #[test]
    fn test_extract_without_dataset_root_rejected() {
        let json = BASE.replace(r#""dataset": "data", "#, "");
        let err = RunConfig::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("paths.dataset"));
    }

    #[test]
    fn test_train_without_model_root_rejected() {
        let json = BASE.replace(r#", "models": "model""#, "");
        let err = RunConfig::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("paths.models"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let json = BASE.replace(r#""shuffle": true,"#, r#""shuffle": true, "shufle": false,"#);
        assert!(matches!(
            RunConfig::from_json(&json),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_hop_larger_than_frame_rejected() {
        let json = BASE.replace(
            r#""features": { "source": "extract" },"#,
            r#""features": { "source": "extract" },
               "extraction": { "frame_size": 512, "hop_size": 1024, "aggregate": "mean" },"#,
        );
        let err = RunConfig::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("hop_size"));
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let err = load_run_config(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
