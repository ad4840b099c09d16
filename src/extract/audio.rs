//! WAV dataset → feature table.

use super::spectral::{FrameAnalyzer, FrameFeatures};
use super::{Aggregate, FeatureExtractor};
use crate::config::ExtractionConfig;
use crate::dataset::io::{files_with_extension, folder_names};
use crate::error::{PipelineError, Result};
use hound::{SampleFormat, WavReader};
use polars::prelude::*;
use std::path::Path;

/// Decoded mono audio normalised to `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Reads a WAV file and down-mixes it to mono.
///
/// # Errors
///
/// [`PipelineError::DataProcessing`] if the file cannot be decoded or uses an
/// unsupported sample format.
pub fn read_wav(path: &Path) -> Result<MonoAudio> {
    let decode_err =
        |e: hound::Error| PipelineError::DataProcessing(format!("{}: {e}", path.display()));

    let mut reader = WavReader::open(path).map_err(decode_err)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| f32::from(v) / 128.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32_768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        (format, bits) => {
            return Err(PipelineError::DataProcessing(format!(
                "{}: unsupported {format:?} {bits}-bit audio",
                path.display()
            )));
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(MonoAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Extracts spectral features from a directory of class folders of `.wav` files.
///
/// ```text
/// dataset/
///   blues/  a.wav b.wav
///   jazz/   c.wav
/// ```
///
/// yields one row per file, the feature columns followed by `label_column`
/// holding the folder name.
#[derive(Debug, Clone)]
pub struct AudioFeatureExtractor {
    label_column: String,
    settings: ExtractionConfig,
}

impl AudioFeatureExtractor {
    pub fn new(label_column: impl Into<String>, settings: ExtractionConfig) -> Self {
        Self {
            label_column: label_column.into(),
            settings,
        }
    }

    /// Output column names, in table order, excluding the label.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for base in FrameFeatures::NAMES {
            names.push(format!("{base}_mean"));
            if self.settings.aggregate == Aggregate::MeanStd {
                names.push(format!("{base}_std"));
            }
        }
        names
    }

    fn summarise(&self, frames: &[FrameFeatures]) -> Vec<f64> {
        let mut row = Vec::new();
        for i in 0..FrameFeatures::NAMES.len() {
            let values: Vec<f64> = frames
                .iter()
                .filter_map(|f| f.values().get(i).copied())
                .collect();
            let (mean, std) = mean_std(&values);
            row.push(mean);
            if self.settings.aggregate == Aggregate::MeanStd {
                row.push(std);
            }
        }
        row
    }
}

impl FeatureExtractor for AudioFeatureExtractor {
    fn extract(&self, dataset_root: &Path) -> Result<DataFrame> {
        if !dataset_root.is_dir() {
            return Err(PipelineError::NotFound(format!(
                "dataset root {} does not exist",
                dataset_root.display()
            )));
        }

        let names = self.feature_names();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        let mut labels: Vec<String> = Vec::new();
        let mut analyzer = FrameAnalyzer::new(self.settings.frame_size, self.settings.hop_size);

        for class in folder_names(dataset_root)? {
            let files = files_with_extension(&dataset_root.join(&class), "wav")?;
            tracing::debug!("Class '{}': {} files", class, files.len());

            for file in files {
                let audio = read_wav(&file)?;
                let frames = analyzer.analyze(&audio.samples, audio.sample_rate);
                if frames.is_empty() {
                    tracing::warn!("Skipping {}: no audio samples", file.display());
                    continue;
                }
                for (column, value) in columns.iter_mut().zip(self.summarise(&frames)) {
                    column.push(value);
                }
                labels.push(class.clone());
            }
        }

        if labels.is_empty() {
            return Err(PipelineError::Schema(format!(
                "no .wav samples found under {}",
                dataset_root.display()
            )));
        }

        let mut table: Vec<Column> = names
            .into_iter()
            .zip(columns)
            .map(|(name, values)| Column::new(name.into(), values))
            .collect();
        table.push(Column::new(self.label_column.as_str().into(), labels));

        let df = DataFrame::new(table)?;
        tracing::info!(
            "Extracted {} samples x {} features from {}",
            df.height(),
            df.width() - 1,
            dataset_root.display()
        );
        Ok(df)
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
