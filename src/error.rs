use thiserror::Error;

/// Error taxonomy for the pipeline control plane.
///
/// The orchestrator decides retry vs. abort based on the variant: only
/// `TransientIo` is ever retried, and only at the writer/upload boundary.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("required input not found: {0}")]
    NotFound(String),

    #[error("dataset '{dataset}' is missing required column '{column}'")]
    Schema { dataset: String, column: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("permanent I/O error: {0}")]
    PermanentIo(String),

    #[error("incompatible schema for table '{table}': {reason}")]
    WriteConflict { table: String, reason: String },

    #[error("engine error: {0}")]
    Engine(#[from] polars::prelude::PolarsError),
}

impl PipelineError {
    /// Whether a bounded retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::TransientIo(_))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::NotFound => PipelineError::NotFound(e.to_string()),
            ErrorKind::TimedOut
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted => PipelineError::TransientIo(e.to_string()),
            _ => PipelineError::PermanentIo(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            PipelineError::TransientIo(e.to_string())
        } else {
            PipelineError::PermanentIo(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::PermanentIo(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
