use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the analysis pipeline.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The input file does not exist. Checked before any load is attempted.
    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// The event log lacks columns the aggregator needs.
    #[error("event log must contain the columns {required}; missing: {missing}")]
    MissingColumns { required: String, missing: String },

    /// A timestamp value matched none of the accepted formats.
    #[error("row {row}: cannot parse timestamp {value:?}")]
    TimestampParse { row: usize, value: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
