//! Unified API error handling.
//!
//! Every error leaves the service in the same JSON envelope,
//! `{ "error": { "code", "message", "details"? } }`, with a stable code per
//! failure kind so clients can tell a locked task from a denied one.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Error;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    AlreadyProcessed,
    ApprovalLocked,
    OtpNotRequested,
    OtpExpired,
    OtpMismatch,
    PayloadTooLarge,
    ValidationError,

    // Server errors (5xx)
    InternalError,
    DatabaseError,
    DependencyFailure,
}

impl ErrorCode {
    /// Get the default HTTP status code for this error code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::AlreadyProcessed => StatusCode::CONFLICT,
            ErrorCode::ApprovalLocked => StatusCode::LOCKED,
            ErrorCode::OtpNotRequested => StatusCode::BAD_REQUEST,
            ErrorCode::OtpExpired => StatusCode::GONE,
            ErrorCode::OtpMismatch => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::DependencyFailure => StatusCode::BAD_GATEWAY,
        }
    }

    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::AlreadyProcessed => "already_processed",
            ErrorCode::ApprovalLocked => "approval_locked",
            ErrorCode::OtpNotRequested => "otp_not_requested",
            ErrorCode::OtpExpired => "otp_expired",
            ErrorCode::OtpMismatch => "otp_mismatch",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::DatabaseError => "database_error",
            ErrorCode::DependencyFailure => "dependency_failure",
        }
    }
}

/// The inner error object in the response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (e.g., validation errors per field)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Additional error details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    /// Field-level validation errors
    ValidationErrors(HashMap<String, Vec<String>>),
    /// Generic key-value details
    Generic(HashMap<String, serde_json::Value>),
}

/// The full error response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    details: Option<ErrorDetails>,
}

impl ApiError {
    /// Create a new API error with a specific code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Add details to the error
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// Add validation errors as details
    pub fn with_validation_errors(mut self, errors: HashMap<String, Vec<String>>) -> Self {
        self.details = Some(ErrorDetails::ValidationErrors(errors));
        self
    }

    /// Bad request error (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Unauthorized error (401) - authentication required
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Forbidden error (403) - authenticated but not allowed
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Not found error (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Conflict error (409) - resource already exists or state conflict
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Validation error (400) with field-level details
    pub fn validation(errors: HashMap<String, Vec<String>>) -> Self {
        let message = if errors.len() == 1 {
            errors
                .values()
                .next()
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string())
        } else {
            format!("Validation failed for {} fields", errors.len())
        };

        Self::new(ErrorCode::ValidationError, message).with_validation_errors(errors)
    }

    /// Single field validation error
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }

    /// Internal server error (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error (500)
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(message) => Self::new(ErrorCode::ValidationError, message),
            Error::NotFound(what) => Self::not_found(format!("{} not found", capitalize(what))),
            Error::Unauthenticated => Self::unauthorized("Authentication required"),
            Error::Forbidden(message) => Self::forbidden(message),
            Error::ApprovalLocked => Self::new(
                ErrorCode::ApprovalLocked,
                "Task is approved and can no longer be changed",
            ),
            Error::OtpNotRequested => Self::new(
                ErrorCode::OtpNotRequested,
                "No one-time passcode is pending, request a new one",
            ),
            Error::OtpExpired => Self::new(
                ErrorCode::OtpExpired,
                "One-time passcode has expired, request a new one",
            ),
            Error::OtpMismatch => {
                Self::new(ErrorCode::OtpMismatch, "One-time passcode is incorrect")
            }
            Error::Conflict(message) => Self::conflict(message),
            Error::AlreadyProcessed => Self::new(
                ErrorCode::AlreadyProcessed,
                "Task approval has already been processed",
            ),
            Error::DependencyFailure { service, message } => {
                tracing::error!(service, "Dependency failure: {}", message);
                Self::new(
                    ErrorCode::DependencyFailure,
                    format!("The {} service is unavailable, try again later", service),
                )
            }
            Error::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                Self::internal("An internal error occurred")
            }
            Error::Database(err) => err.into(),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);

        match &err {
            sqlx::Error::RowNotFound => ApiError::not_found("Resource not found"),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    ApiError::conflict("A resource with this identifier already exists")
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    ApiError::bad_request("Referenced resource does not exist")
                } else {
                    ApiError::database("A database error occurred")
                }
            }
            _ => ApiError::database("A database error occurred"),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

/// Builder for collecting multiple validation errors
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: HashMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    /// Create a new validation error builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation error for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Add an error when `check` fails
    pub fn check(&mut self, field: &str, check: Result<(), String>) -> &mut Self {
        if let Err(message) = check {
            self.add(field, message);
        }
        self
    }

    /// Check if there are any errors
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Build the ApiError if there are any errors
    pub fn build(self) -> Option<ApiError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(ApiError::validation(self.errors))
        }
    }

    /// Return Ok(()) if no errors, or Err(ApiError) if there are errors
    pub fn finish(self) -> Result<(), ApiError> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(ErrorCode::ApprovalLocked.status_code(), StatusCode::LOCKED);
        assert_eq!(ErrorCode::OtpExpired.status_code(), StatusCode::GONE);
        assert_eq!(ErrorCode::OtpMismatch.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::AlreadyProcessed.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::DependencyFailure.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_domain_errors_keep_their_kind() {
        let cases = [
            (Error::ApprovalLocked, ErrorCode::ApprovalLocked),
            (Error::forbidden("no"), ErrorCode::Forbidden),
            (Error::OtpExpired, ErrorCode::OtpExpired),
            (Error::OtpMismatch, ErrorCode::OtpMismatch),
            (Error::OtpNotRequested, ErrorCode::OtpNotRequested),
            (Error::AlreadyProcessed, ErrorCode::AlreadyProcessed),
            (Error::conflict("taken"), ErrorCode::Conflict),
            (Error::Unauthenticated, ErrorCode::Unauthorized),
            (Error::NotFound("task"), ErrorCode::NotFound),
            (Error::validation("bad"), ErrorCode::ValidationError),
            (Error::dependency("email", "refused"), ErrorCode::DependencyFailure),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).code(), code);
        }
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let err = ApiError::from(Error::internal("disk at /var/secret is full"));
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(!err.message.contains("/var/secret"));

        let err = ApiError::from(Error::dependency("email", "535 auth failed for user x"));
        assert!(!err.message.contains("535"));
    }

    #[test]
    fn test_not_found_message() {
        let err = ApiError::from(Error::NotFound("task"));
        assert_eq!(err.message, "Task not found");
    }

    #[test]
    fn test_validation_error_single_field() {
        let err = ApiError::validation_field("name", "Name is required");
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(err.message.contains("Name is required"));
    }

    #[test]
    fn test_validation_error_builder() {
        let mut builder = ValidationErrorBuilder::new();
        builder.add("name", "Name is required");
        builder.check("email", Err("Invalid email format".to_string()));
        builder.check("phone", Ok(()));
        builder.add("name", "Name is too short");

        assert!(!builder.is_empty());

        let err = builder.build().unwrap();
        assert_eq!(err.code, ErrorCode::ValidationError);

        if let Some(ErrorDetails::ValidationErrors(errors)) = &err.details {
            assert_eq!(errors.get("name").unwrap().len(), 2);
            assert_eq!(errors.get("email").unwrap().len(), 1);
            assert!(!errors.contains_key("phone"));
        } else {
            panic!("Expected ValidationErrors details");
        }
    }
}
