use std::borrow::Cow;

use thiserror::Error;

use crate::backend::Table;

/// Top-level error type returned by snugfeed repositories and views.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Input was rejected before reaching the backend.
    #[error("validation failed")]
    Validation(#[from] ValidationError),

    /// The actor is anonymous or does not own the targeted resource.
    #[error("not authorized to {action}")]
    Unauthorized { action: Cow<'static, str> },

    /// Lookup of a single resource found nothing.
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: Option<String> },

    /// Sign-in was rejected by the auth service.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// A uniqueness constraint rejected the write.
    #[error("conflict on {constraint}")]
    Conflict { constraint: String },

    /// The backend could not be reached or failed unexpectedly.
    #[error("backend error: {0}")]
    Backend(BackendError),
}

impl FeedError {
    pub fn unauthorized(action: impl Into<Cow<'static, str>>) -> Self {
        Self::Unauthorized { action: action.into() }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: Some(id.into()),
        }
    }

    /// Whether a manual retry (re-navigation, reload) can be expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::Backend(inner) if inner.is_transient())
    }
}

impl From<BackendError> for FeedError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PolicyDenied { table, operation } => FeedError::Unauthorized {
                action: Cow::Owned(format!("{operation} {table}")),
            },
            BackendError::UniqueViolation { constraint } => FeedError::Conflict { constraint },
            BackendError::InvalidCredentials => FeedError::InvalidCredentials,
            BackendError::AlreadyRegistered => FeedError::Validation(ValidationError::single(
                "email",
                "auth.already_registered",
                "user already registered",
            )),
            BackendError::WeakPassword { min_length } => FeedError::Validation(ValidationError::single(
                "password",
                "auth.weak_password",
                format!("password must be at least {min_length} characters"),
            )),
            other => FeedError::Backend(other),
        }
    }
}

/// Failures reported by a backend implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network or service failure.
    #[error("backend unavailable: {message}")]
    Unavailable { message: Cow<'static, str> },

    /// Row-level policy rejected the operation for the acting user.
    #[error("row-level policy denied {operation} on {table}")]
    PolicyDenied { table: Table, operation: &'static str },

    /// Duplicate key for a unique constraint.
    #[error("duplicate key violates unique constraint \"{constraint}\"")]
    UniqueViolation { constraint: String },

    /// A single-row fetch matched zero or several rows.
    #[error("expected a single row from {table}, found {found}")]
    NotSingle { table: Table, found: usize },

    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("user already registered")]
    AlreadyRegistered,

    #[error("password must be at least {min_length} characters")]
    WeakPassword { min_length: usize },

    /// Row payload did not have the expected shape.
    #[error("malformed row: {message}")]
    Decode { message: String },

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl BackendError {
    pub fn unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable { .. } | BackendError::Redis(_))
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::decode(err)
    }
}

/// Collection of validation issues encountered while preparing a request.
#[derive(Debug, Error)]
#[error("validation errors: {issues:?}")]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Convenience helper for constructing a single-field validation error.
    pub fn single(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([ValidationIssue::new(field, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }
}

/// Detailed validation failure for a single field.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trims `value` and rejects it when nothing is left.
pub fn require_text(field: &str, value: &str) -> ValidationResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::single(
            field,
            "validation.required",
            format!("{field} must not be empty"),
        ));
    }
    Ok(trimmed.to_string())
}
