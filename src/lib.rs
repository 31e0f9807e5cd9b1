//! Admissions ETL - turns a raw admissions export into a model-ready feature table.
//!
//! The table flows through an ordered list of pure stages:
//! name normalization, pruning, missing-value rules, field splitting,
//! feature derivation and a final projection.

pub mod audit;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod transform;

pub use audit::{AuditReport, ColumnAudit};
pub use config::{GroupRule, PipelineConfig};
pub use data::{DataLoader, DataProcessor};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineOutput, Stage};
pub use transform::ZipGazetteer;
