//! # labrun - reproducible classification experiments
//!
//! labrun turns a raw dataset into a trained and evaluated classifier through a
//! fixed sequence of stages, and keeps every intermediate artifact so a run can
//! be repeated or picked up halfway.
//!
//! ## Quick Start
//!
//! ```no_run
//! use labrun::config::load_run_config;
//! use labrun::pipeline::run_from_config;
//!
//! let config = load_run_config("config.json".as_ref())?;
//! let outcome = run_from_config(&config)?;
//! println!("Final accuracy is {}", outcome.accuracy);
//! # Ok::<(), labrun::error::PipelineError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`config`]: JSON run configuration, validated once
//! - [`dataset`]: tabular I/O, normalisation, label encoding, splitting and
//!   write-once split snapshots
//! - [`extract`]: the feature extractor trait and the WAV implementation
//! - [`model`]: the classifier trait, naive Bayes and logistic regression, and
//!   model artifact storage
//! - [`pipeline`]: run orchestration
//! - [`error`]: error type and context helpers
//! - [`logging`]: `tracing` subscriber setup
//!
//! ## Artifacts
//!
//! Snapshots and models are written to directories named by a sortable
//! timestamp id (`2019-01-23_23-19-56.871484`). Neither is ever overwritten:
//! writing into a directory that already has entries fails.
//!
//! ```text
//! feature/<id>/train.csv, test.csv, snapshot.json
//! model/<id>/model.json, artifact.json
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod logging;
pub mod model;
pub mod pipeline;
