//! Stage failure taxonomy.
//!
//! Every stage-local failure is caught at its stage, rendered into
//! `WorkflowState::error` and a `failed` progress entry. Two variants are
//! non-fatal: a degraded classification narrows the request to general chat,
//! and a partial registrar failure is reported per record.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("intent classification degraded to general chat: {0}")]
    ClassificationDegraded(String),

    #[error("failed to fetch spreadsheet: {0}")]
    Fetch(String),

    #[error("failed to parse spreadsheet: {0}")]
    Parse(String),

    #[error("invalid subnet '{subnet}': {reason}")]
    Subnet { subnet: String, reason: String },

    #[error(
        "insufficient address space in {subnet}: {available} usable host addresses for {requested} nodes"
    )]
    Allocation {
        subnet: String,
        requested: usize,
        available: u128,
    },

    #[error("{failed} of {total} DNS records could not be created")]
    RegistrarPartialFailure { failed: usize, total: usize },

    #[error("DNS registration failed: {0}")]
    Registrar(String),

    #[error("{0}")]
    MissingPrecondition(String),

    #[error("internal error in {stage}: {message}")]
    Internal { stage: String, message: String },
}

impl StageError {
    /// Stable name for logs and progress details
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::ClassificationDegraded(_) => "classification_degraded",
            StageError::Fetch(_) => "fetch_error",
            StageError::Parse(_) => "parse_error",
            StageError::Subnet { .. } => "subnet_error",
            StageError::Allocation { .. } => "allocation_error",
            StageError::RegistrarPartialFailure { .. } => "registrar_partial_failure",
            StageError::Registrar(_) => "registrar_error",
            StageError::MissingPrecondition(_) => "missing_precondition",
            StageError::Internal { .. } => "internal_error",
        }
    }
}
