// src/error.rs

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use std::path::PathBuf;
use thiserror::Error;

use crate::validate::ValidationReport;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every way a cleaning run can fail. None of them are retried.
#[derive(Debug, Error)]
pub enum CleanError {
    /// Rejected before any rule runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("dataset is missing required column `{0}`")]
    MissingColumn(String),

    #[error("column `{column}` has unsupported type {data_type}")]
    ColumnType { column: String, data_type: DataType },

    /// Carries the full report so callers see every failed check, not just the first.
    #[error("{0}")]
    InvariantViolation(ValidationReport),

    #[error("failed to export {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to write audit log {}: {source}", path.display())]
    Audit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("arrow: {0}")]
    Arrow(#[from] ArrowError),
}

impl CleanError {
    pub(crate) fn load(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        CleanError::Load {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn export(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        CleanError::Export {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Short label used for the FAILED line of the audit log.
    pub fn kind(&self) -> &'static str {
        match self {
            CleanError::Config(_) => "configuration error",
            CleanError::Load { .. } | CleanError::MissingColumn(_) | CleanError::ColumnType { .. } => {
                "load error"
            }
            CleanError::InvariantViolation(_) => "invariant violation",
            CleanError::Export { .. } => "export error",
            CleanError::Audit { .. } => "audit log error",
            CleanError::Arrow(_) => "data error",
        }
    }
}

pub type Result<T, E = CleanError> = std::result::Result<T, E>;
