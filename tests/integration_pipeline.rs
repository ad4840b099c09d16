//! Integration tests for the full run workflow
//!
//! These tests synthesise a small WAV dataset, run the complete pipeline
//! through the public API and verify the artifacts it leaves behind.

use hound::{SampleFormat, WavSpec, WavWriter};
use labrun::config::{RunConfig, load_run_config};
use labrun::dataset::io::{load_table, save_table};
use labrun::dataset::snapshot::{list_snapshots, read_manifest};
use labrun::error::PipelineError;
use labrun::extract::{AudioFeatureExtractor, FeatureExtractor as _};
use labrun::model::read_artifact_manifest;
use labrun::pipeline::{predict_with_artifact, prepare_snapshot, run_from_config};
use serde_json::json;
use std::path::Path;

const GENRES: [(&str, f32); 3] = [("blues", 300.0), ("jazz", 1200.0), ("metal", 3000.0)];

fn write_tone(path: &Path, freq: f32, amplitude: f32) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for i in 0..4000 {
        let t = i as f32 / 8000.0;
        let v = (2.0 * std::f32::consts::PI * freq * t).sin() * amplitude;
        writer.write_sample((v * 32_767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// `<root>/dataset/<genre>/<n>.wav`, six slightly detuned tones per genre.
fn write_dataset(root: &Path) -> anyhow::Result<()> {
    for (genre, freq) in GENRES {
        let dir = root.join("dataset").join(genre);
        std::fs::create_dir_all(&dir)?;
        for i in 0..6 {
            let detune = i as f32 * 15.0;
            write_tone(&dir.join(format!("{genre}_{i}.wav")), freq + detune, 0.3 + i as f32 * 0.05)?;
        }
    }
    Ok(())
}

fn base_config(root: &Path) -> serde_json::Value {
    json!({
        "label_name": "genre",
        "test_rate": 0.25,
        "shuffle": true,
        "seed": 42,
        "normalisation": "z_score",
        "paths": {
            "dataset": root.join("dataset"),
            "features": root.join("feature"),
            "models": root.join("model")
        },
        "features": { "source": "extract" },
        "model": { "source": "train", "classifier": "naive_bayes" },
        "extraction": { "frame_size": 512, "hop_size": 256, "aggregate": "mean_std" }
    })
}

fn write_config(root: &Path, value: &serde_json::Value) -> anyhow::Result<std::path::PathBuf> {
    let path = root.join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
    Ok(path)
}

#[test]
fn test_full_run_then_reuse() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    write_dataset(root.path())?;

    let config = load_run_config(&write_config(root.path(), &base_config(root.path()))?)?;
    let first = run_from_config(&config)?;

    assert!(
        first.accuracy >= 0.75,
        "tones should be easy to separate, got {}",
        first.accuracy
    );
    let snapshot = read_manifest(&first.snapshot_dir)?;
    assert_eq!(snapshot.train_rows + snapshot.test_rows, 18);
    assert_eq!(snapshot.feature_columns.len(), 10);
    assert_eq!(list_snapshots(&root.path().join("feature"))?, vec![first.snapshot_dir.clone()]);

    // same snapshot, stored model: identical accuracy
    let mut reuse = base_config(root.path());
    reuse["features"] = json!({ "source": "reuse", "snapshot": first.snapshot_dir });
    reuse["model"] = json!({ "source": "load", "artifact": first.model_dir });
    let config = RunConfig::from_json(&reuse.to_string())?;
    let second = run_from_config(&config)?;
    assert_eq!(second.accuracy, first.accuracy);

    // same snapshot, other classifier
    let mut logistic = base_config(root.path());
    logistic["features"] = json!({ "source": "reuse", "snapshot": first.snapshot_dir });
    logistic["model"] = json!({ "source": "train", "classifier": "logistic_regression" });
    let config = RunConfig::from_json(&logistic.to_string())?;
    let third = run_from_config(&config)?;
    assert!((0.0..=1.0).contains(&third.accuracy));
    assert_ne!(third.model_dir, first.model_dir);
    assert_eq!(
        read_artifact_manifest(&third.model_dir)?.kind,
        labrun::model::ClassifierKind::LogisticRegression
    );
    Ok(())
}

#[test]
fn test_predict_raw_features_with_stored_model() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    write_dataset(root.path())?;
    let config = RunConfig::from_json(&base_config(root.path()).to_string())?;
    let outcome = run_from_config(&config)?;

    // unprocessed features, as a new recording would produce them
    let extractor = AudioFeatureExtractor::new("genre", config.extraction.clone());
    let mut raw = extractor.extract(&root.path().join("dataset"))?;
    let input = root.path().join("dummy_data.csv");
    save_table(&mut raw, &input)?;

    let output = root.path().join("predictions.csv");
    let predictions = predict_with_artifact(&outcome.model_dir, &input, Some(&output))?;
    assert_eq!(predictions.len(), 18);

    let expected: Vec<&str> = GENRES
        .iter()
        .flat_map(|(genre, _)| std::iter::repeat_n(*genre, 6))
        .collect();
    let correct = predictions
        .iter()
        .zip(&expected)
        .filter(|(p, e)| p.class == **e)
        .count();
    assert!(correct >= 14, "only {correct} of 18 predicted correctly");

    let written = load_table(&output)?;
    assert_eq!(written.height(), 18);
    Ok(())
}

#[test]
fn test_prepare_only_writes_snapshot() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    write_dataset(root.path())?;
    let config = RunConfig::from_json(&base_config(root.path()).to_string())?;

    let snapshot = prepare_snapshot(&config)?;
    assert!(snapshot.join("train.csv").is_file());
    assert!(!root.path().join("model").exists());
    Ok(())
}

#[test]
fn test_invalid_config_fails_before_touching_disk() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;

    let mut bad_rate = base_config(root.path());
    bad_rate["test_rate"] = json!(1.5);
    let err = RunConfig::from_json(&bad_rate.to_string()).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)), "got {err:?}");

    let mut missing = base_config(root.path());
    if let Some(map) = missing.as_object_mut() {
        map.remove("shuffle");
    }
    let err = RunConfig::from_json(&missing.to_string()).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)), "got {err:?}");

    assert!(!root.path().join("feature").exists());
    assert!(!root.path().join("model").exists());
    Ok(())
}

#[test]
fn test_missing_dataset_aborts_run() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let config = RunConfig::from_json(&base_config(root.path()).to_string())?;
    let err = run_from_config(&config).unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)), "got {err:?}");
    assert!(!root.path().join("feature").exists());
    Ok(())
}
