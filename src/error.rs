//! Error taxonomy for the pipeline.
//! Schema and configuration errors abort a run; row-level problems are
//! never errors and are counted in the audit report instead.

use crate::data::LoaderError;
use polars::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{stage}' requires column '{column}', which is not present")]
    Schema { stage: String, column: String },

    #[error("Columns '{first}' and '{second}' both normalize to '{canonical}'")]
    NameCollision {
        canonical: String,
        first: String,
        second: String,
    },

    #[error("Stage '{stage}' would produce column '{column}', which already exists")]
    ColumnExists { stage: String, column: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stage '{stage}' changed the row count from {before} to {after}")]
    RowCountChanged {
        stage: String,
        before: usize,
        after: usize,
    },

    #[error("Column '{column}' has type {dtype} and cannot be zero-filled")]
    UnsupportedFill { column: String, dtype: String },

    #[error("Gazetteer error: {0}")]
    Gazetteer(String),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn schema(stage: &str, column: &str) -> Self {
        PipelineError::Schema {
            stage: stage.to_string(),
            column: column.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
