//! Error types shared across jobgrid crates.

use thiserror::Error;

use crate::types::JobStatus;

/// Result type alias for validation of caller-supplied input.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Caller-supplied input was rejected. Never mutates state.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A status change not permitted by the job state machine.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}
