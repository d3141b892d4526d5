//! Error types shared by every pipeline stage.
//!
//! Failures are classified by variant, never by inspecting message text:
//! configuration problems abort the job, missing or insufficient input skips a
//! ticker, storage conflicts are resolved by the publisher, and schema
//! mismatches are patched and retried once by the converter.

use polars::error::PolarsError;
use thiserror::Error;

/// Failure talking to the object store or the price table
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object already exists at {path}")]
    Conflict { path: String },

    #[error("object not found at {path}")]
    NotFound { path: String },

    #[error("storage request to {url} failed with status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("unexpected storage response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

/// Top-level error for a pipeline stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required configuration {name}. {remediation}")]
    Config { name: String, remediation: String },

    #[error("{ticker}: {what} not found ({detail})")]
    Missing {
        ticker: String,
        what: String,
        detail: String,
    },

    #[error("{ticker}: insufficient {unit} ({found}, need at least {required})")]
    Insufficient {
        ticker: String,
        unit: String,
        found: usize,
        required: usize,
    },

    #[error("{ticker}: price download failed: {message}")]
    Download { ticker: String, message: String },

    #[error("schema mismatch at {location}: unsupported key `{key}`")]
    SchemaMismatch { key: String, location: String },

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("invalid input data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl PipelineError {
    pub fn missing(ticker: &str, what: &str, detail: impl Into<String>) -> Self {
        PipelineError::Missing {
            ticker: ticker.to_string(),
            what: what.to_string(),
            detail: detail.into(),
        }
    }

    pub fn insufficient(ticker: &str, unit: &str, found: usize, required: usize) -> Self {
        PipelineError::Insufficient {
            ticker: ticker.to_string(),
            unit: unit.to_string(),
            found,
            required,
        }
    }

    /// Missing or insufficient input: the ticker is skipped, the job does not fail
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            PipelineError::Missing { .. } | PipelineError::Insufficient { .. }
        )
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, PipelineError::SchemaMismatch { .. })
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_classification() {
        assert!(PipelineError::missing("SAP.DE", "model", "no file").is_skip());
        assert!(PipelineError::insufficient("SAP.DE", "rows", 12, 100).is_skip());
        let mismatch = PipelineError::SchemaMismatch {
            key: "ragged".into(),
            location: "modelTopology".into(),
        };
        assert!(!mismatch.is_skip());
        assert!(mismatch.is_schema_mismatch());
        let conflict: PipelineError = StorageError::Conflict { path: "a/b".into() }.into();
        assert!(!conflict.is_skip());
    }

    #[test]
    fn test_config_message_carries_remediation() {
        let err = PipelineError::Config {
            name: "SUPABASE_URL".into(),
            remediation: "Set it in .env".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SUPABASE_URL"));
        assert!(msg.contains("Set it in .env"));
    }
}
