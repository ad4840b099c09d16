//! Centralized error handling for labrun.
//!
//! Every fallible operation in the library returns [`Result<T>`], whose error
//! side is [`PipelineError`]. The variants mirror the failure classes a run can
//! hit, so callers (and tests) can match on them:
//!
//! ```
//! use labrun::error::PipelineError;
//!
//! fn describe(err: &PipelineError) -> &'static str {
//!     match err {
//!         PipelineError::Config(_) => "fix the run configuration",
//!         PipelineError::Schema(_) => "the table is missing an expected column",
//!         PipelineError::NotFound(_) => "a snapshot or model is missing",
//!         PipelineError::Io(_) => "storage failure or target already populated",
//!         _ => "processing failure",
//!     }
//! }
//! ```
//!
//! ## Context Extension Trait
//!
//! [`ResultExt`] adds `.context()` to any `Result` whose error converts into
//! [`PipelineError`]. Unlike `anyhow`, the variant is preserved so the run
//! can still tell a missing artifact from a malformed one:
//!
//! ```no_run
//! use labrun::error::ResultExt as _;
//!
//! fn read_manifest() -> labrun::error::Result<String> {
//!     let text = std::fs::read_to_string("snapshot.json")
//!         .context("Failed to read snapshot manifest")?;
//!     Ok(text)
//! }
//! ```

use std::fmt;

/// Main error type for labrun operations.
#[derive(Debug)]
pub enum PipelineError {
    /// Invalid or missing configuration values
    Config(String),

    /// Expected column absent or malformed table
    Schema(String),

    /// Referenced snapshot, model or artifact is missing
    NotFound(String),

    /// Storage failure, or a write target that is already populated
    Io(std::io::Error),

    /// Table or signal processing failure (polars, audio decoding)
    DataProcessing(String),

    /// Classifier training or inference failure
    Model(String),

    /// Generic error with context
    Other(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Schema(msg) => write!(f, "Schema error: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Model(msg) => write!(f, "Model error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl PipelineError {
    /// Shorthand for the "target directory already holds artifacts" failure.
    pub fn already_populated(path: &std::path::Path) -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists and is not empty", path.display()),
        ))
    }

    fn with_prefix(self, prefix: &str) -> Self {
        match self {
            Self::Config(msg) => Self::Config(format!("{prefix}: {msg}")),
            Self::Schema(msg) => Self::Schema(format!("{prefix}: {msg}")),
            Self::NotFound(msg) => Self::NotFound(format!("{prefix}: {msg}")),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), format!("{prefix}: {e}"))),
            Self::DataProcessing(msg) => Self::DataProcessing(format!("{prefix}: {msg}")),
            Self::Model(msg) => Self::Model(format!("{prefix}: {msg}")),
            Self::Other(msg) => Self::Other(format!("{prefix}: {msg}")),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        use polars::error::PolarsError;
        match err {
            PolarsError::ColumnNotFound(_)
            | PolarsError::SchemaFieldNotFound(_)
            | PolarsError::SchemaMismatch(_)
            | PolarsError::ShapeMismatch(_) => Self::Schema(err.to_string()),
            PolarsError::IO { error, .. } => Self::Io(std::io::Error::new(
                error.kind(),
                error.to_string(),
            )),
            _ => Self::DataProcessing(err.to_string()),
        }
    }
}

impl From<hound::Error> for PipelineError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => Self::Io(e),
            other => Self::DataProcessing(format!("WAV decoding failed: {other}")),
        }
    }
}

/// Result type alias for labrun operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error, keeping its variant.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_prefix(&msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_prefix(&f()))
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Schema("column 'genre' not found".to_owned());
        assert_eq!(err.to_string(), "Schema error: column 'genre' not found");
    }

    #[test]
    fn test_context_keeps_variant() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "train.csv",
        ));

        let err = result.context("Failed to read snapshot").unwrap_err();
        match err {
            PipelineError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
                assert!(e.to_string().contains("Failed to read snapshot"));
            }
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn test_polars_column_not_found_is_schema_error() {
        let err: PipelineError = polars::error::PolarsError::ColumnNotFound("genre".into()).into();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_already_populated_is_io() {
        let err = PipelineError::already_populated(std::path::Path::new("feature/x"));
        assert!(
            matches!(err, PipelineError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists)
        );
    }
}
