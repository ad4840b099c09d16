//! Run orchestration.
//!
//! A run walks a fixed sequence of stages:
//!
//! ```text
//! INIT → FEATURES_READY → PROCESSED → SPLIT_READY → MODEL_READY → TESTED → (PREDICTED)
//! ```
//!
//! Where the feature table and the model come from is decided by the
//! [`FeatureSource`] and [`ModelSource`] of the [`RunConfig`]. The first error
//! aborts the run; there is no partial result.
//!
//! # Example
//!
//! ```no_run
//! use labrun::config::load_run_config;
//! use labrun::pipeline::run_from_config;
//! use std::path::Path;
//!
//! let config = load_run_config(Path::new("config.json"))?;
//! let outcome = run_from_config(&config)?;
//! println!("Final accuracy is {}", outcome.accuracy);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::config::{FeatureSource, ModelSource, RunConfig};
use crate::dataset::io::{load_table, save_table};
use crate::dataset::naming::new_snapshot_id;
use crate::dataset::processing::{
    LabelEncoding, NormalisationState, encode_labels_with_mapping, normalize_with_state,
    require_column,
};
use crate::dataset::snapshot::{
    MANIFEST_FILE, SnapshotProvenance, load_snapshot, persist_snapshot, read_manifest,
};
use crate::dataset::split::{SplitDataset, split};
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::extract::{AudioFeatureExtractor, FeatureExtractor};
use crate::model::{
    ArtifactManifest, Classifier, ClassifierKind, LogisticClassifier, NaiveBayesClassifier,
    SamplePrediction, load_artifact, predict_samples, predictions_to_frame,
    read_artifact_manifest, save_artifact,
};
use polars::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    FeaturesReady,
    Processed,
    SplitReady,
    ModelReady,
    Tested,
    Predicted,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::FeaturesReady => "FEATURES_READY",
            Self::Processed => "PROCESSED",
            Self::SplitReady => "SPLIT_READY",
            Self::ModelReady => "MODEL_READY",
            Self::Tested => "TESTED",
            Self::Predicted => "PREDICTED",
        })
    }
}

fn enter(stage: PipelineStage, detail: &str) {
    tracing::info!(stage = %stage, "{detail}");
}

/// A split ready for training, with the processing parameters behind it.
#[derive(Debug, Clone)]
pub struct PreparedSplit {
    /// Identifies this run; names the model artifact directory.
    pub run_id: String,
    pub split: SplitDataset,
    pub snapshot_dir: PathBuf,
    pub label_encoding: Option<LabelEncoding>,
    pub normalisation: Option<NormalisationState>,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// Fraction of correctly classified test rows.
    pub accuracy: f64,
    pub snapshot_dir: PathBuf,
    pub model_dir: PathBuf,
    pub predictions: Option<Vec<SamplePrediction>>,
}

/// Sequences feature preparation, training or loading, testing and optional
/// prediction for one configuration.
pub struct Pipeline<'a, E, C> {
    config: &'a RunConfig,
    extractor: E,
    classifier: C,
}

impl<'a, E: FeatureExtractor, C: Classifier> Pipeline<'a, E, C> {
    pub fn new(config: &'a RunConfig, extractor: E, classifier: C) -> Self {
        Self {
            config,
            extractor,
            classifier,
        }
    }

    /// Runs every stage and reports the test accuracy.
    ///
    /// # Errors
    ///
    /// The first stage failure, unchanged. Nothing after it runs.
    /// [`PipelineError::Config`] if a loaded model and a reused snapshot code
    /// their labels differently.
    pub fn run(&self) -> Result<RunOutcome> {
        let config = self.config;
        if let ModelSource::Train { classifier } = &config.model
            && *classifier != self.classifier.kind()
        {
            return Err(PipelineError::Config(format!(
                "configured classifier {classifier} but the pipeline was built for {}",
                self.classifier.kind()
            )));
        }

        let stored = match &config.model {
            ModelSource::Load { artifact } => Some(read_artifact_manifest(artifact)?),
            ModelSource::Train { .. } => None,
        };
        let prepared = prepare_split(config, &self.extractor, stored.as_ref())?;
        if let Some(stored) = &stored {
            ensure_same_encoding(&prepared, stored)?;
        }

        let (model, artifact, model_dir) = match &config.model {
            ModelSource::Train { .. } => self.train(&prepared)?,
            ModelSource::Load { artifact } => {
                let (model, manifest) = load_artifact(&self.classifier, artifact)?;
                enter(PipelineStage::ModelReady, "Loaded stored model");
                (model, manifest, artifact.clone())
            }
        };

        let test_data = prepared
            .split
            .test_data
            .select(artifact.feature_columns.iter().map(String::as_str))
            .context("Test partition does not match the model's features")?;
        let accuracy = self
            .classifier
            .test(&model, &test_data, &prepared.split.test_label)?;
        tracing::info!(
            stage = %PipelineStage::Tested,
            accuracy,
            test_rows = prepared.split.test_rows(),
            "Evaluated model on test partition"
        );

        let predictions = match &config.predict {
            Some(predict) => {
                let predictions = predict_file(
                    &self.classifier,
                    &model,
                    &artifact,
                    &predict.input,
                    predict.output.as_deref(),
                )?;
                enter(PipelineStage::Predicted, "Scored prediction input");
                Some(predictions)
            }
            None => None,
        };

        Ok(RunOutcome {
            run_id: prepared.run_id,
            accuracy,
            snapshot_dir: prepared.snapshot_dir,
            model_dir,
            predictions,
        })
    }

    fn train(&self, prepared: &PreparedSplit) -> Result<(C::Model, ArtifactManifest, PathBuf)> {
        let split = &prepared.split;
        let model = self
            .classifier
            .train(&split.train_data, &split.train_label)?;

        let mut manifest = ArtifactManifest::new(
            self.classifier.kind(),
            &self.config.label_name,
            split.feature_columns(),
        );
        manifest.label_encoding.clone_from(&prepared.label_encoding);
        manifest.normalisation.clone_from(&prepared.normalisation);
        manifest.snapshot = prepared
            .snapshot_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());

        let directory = self.config.models_root()?.join(&prepared.run_id);
        save_artifact(&self.classifier, &model, &manifest, &directory)?;
        tracing::info!(
            stage = %PipelineStage::ModelReady,
            kind = %self.classifier.kind(),
            train_rows = split.train_rows(),
            "Trained model"
        );
        Ok((model, manifest, directory))
    }
}

/// Runs the stages up to `SPLIT_READY`: extract, process, split and persist
/// on the fresh path, or load a persisted snapshot on the reuse path.
///
/// When `stored` is given (a model is being loaded), its label encoding and
/// normalisation replace freshly fitted ones so the features match the model.
///
/// # Errors
///
/// Extraction, processing and persistence failures, unchanged.
pub fn prepare_split<E: FeatureExtractor>(
    config: &RunConfig,
    extractor: &E,
    stored: Option<&ArtifactManifest>,
) -> Result<PreparedSplit> {
    let label = config.label_name.as_str();
    enter(PipelineStage::Init, "Starting run");

    match &config.features {
        FeatureSource::Extract => {
            let table = extractor.extract(config.dataset_root()?)?;
            require_column(&table, label)?;
            tracing::info!(
                stage = %PipelineStage::FeaturesReady,
                rows = table.height(),
                columns = table.width(),
                "Extracted feature table"
            );

            let (processed, encoding, normalisation) = process(config, &table, stored)?;
            enter(PipelineStage::Processed, "Normalised features and encoded labels");

            let parts = split(&processed, label, config.test_rate, config.shuffle, config.seed)?;
            let run_id = new_snapshot_id();
            let directory = config.features_root()?.join(&run_id);
            let provenance = SnapshotProvenance {
                seed: Some(config.seed),
                shuffle: Some(config.shuffle),
                test_rate: Some(config.test_rate),
                label_encoding: Some(encoding.clone()),
                normalisation: Some(normalisation.clone()),
            };
            let snapshot_dir = persist_snapshot(&parts, label, &directory, provenance)?;
            enter(PipelineStage::SplitReady, "Persisted split snapshot");

            Ok(PreparedSplit {
                run_id,
                split: parts,
                snapshot_dir,
                label_encoding: Some(encoding),
                normalisation: Some(normalisation),
            })
        }
        FeatureSource::Reuse { snapshot } => {
            let parts = load_snapshot(snapshot, label)?;
            tracing::info!(
                stage = %PipelineStage::FeaturesReady,
                snapshot = %snapshot.display(),
                train_rows = parts.train_rows(),
                test_rows = parts.test_rows(),
                "Loaded split snapshot"
            );

            let provenance = if snapshot.join(MANIFEST_FILE).is_file() {
                read_manifest(snapshot)?.provenance
            } else {
                tracing::warn!(
                    "Snapshot {} has no manifest, label names will not be recorded",
                    snapshot.display()
                );
                SnapshotProvenance::default()
            };
            enter(PipelineStage::Processed, "Snapshot is already processed");
            enter(PipelineStage::SplitReady, "Using persisted split");

            Ok(PreparedSplit {
                run_id: new_snapshot_id(),
                split: parts,
                snapshot_dir: snapshot.clone(),
                label_encoding: provenance.label_encoding,
                normalisation: provenance.normalisation,
            })
        }
    }
}

/// A stored model can only be scored on labels coded the way it was trained.
fn ensure_same_encoding(prepared: &PreparedSplit, stored: &ArtifactManifest) -> Result<()> {
    match (&prepared.label_encoding, &stored.label_encoding) {
        (Some(split), Some(model)) if split.classes() != model.classes() => {
            Err(PipelineError::Config(format!(
                "snapshot {} codes labels as {:?} but the model was trained on {:?}",
                prepared.snapshot_dir.display(),
                split.classes(),
                model.classes()
            )))
        }
        (None, Some(_)) => {
            tracing::warn!(
                "Snapshot {} records no label encoding, assuming it matches the model",
                prepared.snapshot_dir.display()
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

fn process(
    config: &RunConfig,
    table: &DataFrame,
    stored: Option<&ArtifactManifest>,
) -> Result<(DataFrame, LabelEncoding, NormalisationState)> {
    let label = config.label_name.as_str();

    let (scaled, normalisation) = match stored.and_then(|m| m.normalisation.as_ref()) {
        Some(state) => (state.apply(table)?, state.clone()),
        None => normalize_with_state(table, label, config.normalisation)?,
    };

    match stored.and_then(|m| m.label_encoding.as_ref()) {
        Some(encoding) => {
            let labels = scaled.column(label)?.as_materialized_series();
            let codes = encoding.encode(labels)?;
            let mut encoded = scaled.clone();
            encoded.with_column(codes)?;
            Ok((encoded, encoding.clone(), normalisation))
        }
        None => {
            let (encoded, encoding) = encode_labels_with_mapping(&scaled, label)?;
            Ok((encoded, encoding, normalisation))
        }
    }
}

/// Scores `input` with a loaded model and writes the predictions to `output`
/// when given.
///
/// # Errors
///
/// [`PipelineError::NotFound`] for a missing input file, [`PipelineError::Schema`]
/// if it lacks a training feature column.
pub fn predict_file<C: Classifier>(
    classifier: &C,
    model: &C::Model,
    manifest: &ArtifactManifest,
    input: &Path,
    output: Option<&Path>,
) -> Result<Vec<SamplePrediction>> {
    let table = load_table(input)?;
    let predictions = predict_samples(classifier, model, manifest, &table)?;
    tracing::info!(
        input = %input.display(),
        samples = predictions.len(),
        "Predicted classes"
    );

    if let Some(output) = output {
        let mut frame = predictions_to_frame(&predictions, manifest.label_encoding.as_ref())?;
        save_table(&mut frame, output)?;
        tracing::info!(output = %output.display(), "Wrote predictions");
    }
    Ok(predictions)
}

/// Runs a configuration with the audio extractor and the classifier it names
/// (or, when loading, the one recorded in the artifact).
///
/// # Errors
///
/// See [`Pipeline::run`].
pub fn run_from_config(config: &RunConfig) -> Result<RunOutcome> {
    let kind = match &config.model {
        ModelSource::Train { classifier } => *classifier,
        ModelSource::Load { artifact } => read_artifact_manifest(artifact)?.kind,
    };
    let extractor = AudioFeatureExtractor::new(&config.label_name, config.extraction.clone());

    match kind {
        ClassifierKind::NaiveBayes => {
            Pipeline::new(config, extractor, NaiveBayesClassifier::default()).run()
        }
        ClassifierKind::LogisticRegression => {
            Pipeline::new(config, extractor, LogisticClassifier::default()).run()
        }
    }
}

/// Extracts, processes, splits and persists only; returns the snapshot directory.
///
/// # Errors
///
/// See [`prepare_split`].
pub fn prepare_snapshot(config: &RunConfig) -> Result<PathBuf> {
    let extractor = AudioFeatureExtractor::new(&config.label_name, config.extraction.clone());
    let stored = match &config.model {
        ModelSource::Load { artifact } => Some(read_artifact_manifest(artifact)?),
        ModelSource::Train { .. } => None,
    };
    Ok(prepare_split(config, &extractor, stored.as_ref())?.snapshot_dir)
}

/// Scores a table with a persisted model artifact.
///
/// # Errors
///
/// [`PipelineError::NotFound`] if the artifact or input is missing.
pub fn predict_with_artifact(
    model_dir: &Path,
    input: &Path,
    output: Option<&Path>,
) -> Result<Vec<SamplePrediction>> {
    fn with<C: Classifier>(
        classifier: &C,
        model_dir: &Path,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<Vec<SamplePrediction>> {
        let (model, manifest) = load_artifact(classifier, model_dir)?;
        predict_file(classifier, &model, &manifest, input, output)
    }

    match read_artifact_manifest(model_dir)?.kind {
        ClassifierKind::NaiveBayes => {
            with(&NaiveBayesClassifier::default(), model_dir, input, output)
        }
        ClassifierKind::LogisticRegression => {
            with(&LogisticClassifier::default(), model_dir, input, output)
        }
    }
}
