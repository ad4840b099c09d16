use crate::error::{PipelineError, Result, ResultExt as _};
use polars::prelude::*;
use std::path::{Path, PathBuf};

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Reads a feature table, picking the format from the file extension.
///
/// # Errors
///
/// [`PipelineError::NotFound`] if the file does not exist,
/// [`PipelineError::Config`] for an unsupported extension.
pub fn load_table(path: &Path) -> Result<DataFrame> {
    if !is_valid_file(path) {
        return Err(PipelineError::NotFound(format!("table {}", path.display())));
    }

    let ext = extension_of(path);
    let df = match ext.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(Some(10000))
            .with_has_header(true)
            .finish()?
            .collect()
            .with_context(|| format!("Failed to read CSV {}", path.display()))?,
        "parquet" => ParquetReader::new(std::fs::File::open(path)?)
            .finish()
            .with_context(|| format!("Failed to read Parquet {}", path.display()))?,
        "json" => JsonReader::new(std::fs::File::open(path)?)
            .finish()
            .with_context(|| format!("Failed to read JSON {}", path.display()))?,
        _ => {
            return Err(PipelineError::Config(format!(
                "Unsupported table extension: '{ext}' ({})",
                path.display()
            )));
        }
    };

    Ok(df)
}

/// Writes a feature table, picking the format from the file extension.
/// Anything that is not `parquet` or `json` is written as CSV with a header row.
pub fn save_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    let ext = extension_of(path);
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    match ext.as_str() {
        "parquet" => {
            ParquetWriter::new(file)
                .finish(df)
                .context("Failed to write Parquet file")?;
        }
        "json" => {
            JsonWriter::new(file)
                .with_json_format(JsonFormat::Json)
                .finish(df)
                .context("Failed to write JSON file")?;
        }
        _ => {
            CsvWriter::new(file)
                .include_header(true)
                .finish(df)
                .context("Failed to write CSV file")?;
        }
    }

    Ok(())
}

pub fn is_valid_file(path: &Path) -> bool {
    path.is_file()
}

pub fn is_valid_directory(path: &Path) -> bool {
    path.is_dir()
}

/// True when `path` is a directory with no entries.
pub fn is_empty_directory(path: &Path) -> Result<bool> {
    let mut entries = std::fs::read_dir(path)
        .with_context(|| format!("Failed to read directory {}", path.display()))?;
    Ok(entries.next().is_none())
}

/// Names of the subdirectories of `dir`, sorted.
///
/// # Errors
///
/// [`PipelineError::NotFound`] if `dir` is not a directory.
pub fn folder_names(dir: &Path) -> Result<Vec<String>> {
    if !is_valid_directory(dir) {
        return Err(PipelineError::NotFound(format!("directory {}", dir.display())));
    }

    let mut names = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Files directly under `dir` with the given extension (case-insensitive), sorted by name.
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && extension_of(p) == extension)
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}
