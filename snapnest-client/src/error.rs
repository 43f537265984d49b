use snapnest_backend::{BackendError, ErrorReason};
use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Nobody is signed in")]
    NotSignedIn,
}

impl ClientError {
    #[must_use]
    pub fn reason(&self) -> ErrorReason {
        match self {
            ClientError::Backend(err) => err.reason(),
            ClientError::NotSignedIn => ErrorReason::Unauthenticated,
        }
    }

    /// What to tell the user about this failure.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        failure_message(self.reason())
    }
}

#[must_use]
pub fn failure_message(reason: ErrorReason) -> &'static str {
    match reason {
        ErrorReason::NotFound => "We couldn't find that.",
        ErrorReason::Unauthenticated => "Please sign in to continue.",
        ErrorReason::PermissionDenied => "You don't have permission to do that.",
        ErrorReason::Conflict => "That already exists.",
        ErrorReason::InvalidInput => "Please check your input and try again.",
        ErrorReason::Unavailable => "SnapNest can't be reached right now. Please try again.",
        ErrorReason::InvalidData | ErrorReason::MissingIdentifier => {
            "Something went wrong. Please try again."
        }
    }
}
