use serde::Serialize;
use snapnest_common::model::ModelValidationError;
use thiserror::Error;

pub type Result<T, E = BackendError> = std::result::Result<T, E>;

/// Why a backend operation failed, stable enough for callers to branch on.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    NotFound,
    Unauthenticated,
    PermissionDenied,
    Conflict,
    InvalidInput,
    Unavailable,
    InvalidData,
    MissingIdentifier,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No active session: {0}")]
    Unauthenticated(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("Invalid request: {0}")]
    InvalidInput(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("A required {0} was missing")]
    MissingIdentifier(&'static str),
    #[error("A document from the backend was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A payload could not be (de)serialized: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    #[must_use]
    pub fn reason(&self) -> ErrorReason {
        match self {
            BackendError::NotFound(_) => ErrorReason::NotFound,
            BackendError::Unauthenticated(_) => ErrorReason::Unauthenticated,
            BackendError::PermissionDenied(_) => ErrorReason::PermissionDenied,
            BackendError::Conflict(_) => ErrorReason::Conflict,
            BackendError::InvalidInput(_) => ErrorReason::InvalidInput,
            BackendError::Unavailable(_) | BackendError::Transport(_) => ErrorReason::Unavailable,
            BackendError::MissingIdentifier(_) => ErrorReason::MissingIdentifier,
            BackendError::Data(_) | BackendError::Payload(_) | BackendError::Url(_) => {
                ErrorReason::InvalidData
            }
        }
    }

    /// Transient failures that a later retry may clear.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.reason() == ErrorReason::Unavailable
    }
}
