//! Domain error taxonomy shared by the credential, OTP, token and task layers.
//!
//! Gates return the most specific variant that applies. The API layer maps
//! each variant onto its own stable error code (see `api::error`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    /// The task has been approved and is read-only from now on.
    #[error("task is approved and locked")]
    ApprovalLocked,

    #[error("no one-time passcode was requested")]
    OtpNotRequested,

    #[error("one-time passcode expired")]
    OtpExpired,

    #[error("one-time passcode does not match")]
    OtpMismatch,

    #[error("{0}")]
    Conflict(String),

    /// A decision was already recorded for this submission.
    #[error("task approval already processed")]
    AlreadyProcessed,

    #[error("{service} unavailable: {message}")]
    DependencyFailure {
        service: &'static str,
        message: String,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn dependency(service: &'static str, message: impl Into<String>) -> Self {
        Self::DependencyFailure {
            service,
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
