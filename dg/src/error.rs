//! Engine error types

use thiserror::Error;

/// Errors that can occur while validating or promoting a dataset
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Unknown cast kind: {0}")]
    UnknownCastKind(String),

    #[error("IndexSpec.name cannot be empty")]
    EmptyIndexName,

    #[error("Dataset '{0}' must declare at least one field")]
    NoFields(String),

    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Safety check: this action requires --require-confirm.\nExpected: --require-confirm \"{expected}\"")]
    ConfirmationMissing { expected: String },

    #[error("Safety check: confirmation did not match.\nExpected: {expected}\nGot:      {got}")]
    ConfirmationMismatch { expected: String, got: String },

    #[error("Invalid dataset definition: {0}")]
    InvalidDefinition(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Configuration errors are detected before any row is processed
    pub fn is_configuration(&self) -> bool {
        match self {
            GateError::UnknownCastKind(_)
            | GateError::EmptyIndexName
            | GateError::NoFields(_)
            | GateError::InvalidIdentifier(_)
            | GateError::UnknownDataset(_)
            | GateError::ConfirmationMissing { .. }
            | GateError::ConfirmationMismatch { .. }
            | GateError::InvalidDefinition(_)
            | GateError::Yaml(_) => true,
            GateError::Store(_) | GateError::Json(_) | GateError::Io(_) => false,
        }
    }
}

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, GateError>;
