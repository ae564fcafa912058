use std::borrow::Cow;

use thiserror::Error;

/// Top-level error type returned by every ridesync component.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Referenced document is absent.
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// The actor is not allowed to perform the requested transition.
    #[error("user '{actor}' is not allowed to {action}")]
    Unauthorized { actor: String, action: Cow<'static, str> },

    /// A relationship or marker for the same key already exists.
    #[error("already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    /// The requested transition is illegal from the current state.
    #[error("invalid state: {message}")]
    InvalidState { message: Cow<'static, str> },

    /// Optimistic transaction retries were exhausted.
    #[error("write conflict after {attempts} attempts")]
    WriteConflict { attempts: u32 },

    /// The document store could not be reached.
    #[error("store unreachable: {message}")]
    Unreachable { message: Cow<'static, str> },

    /// A stored document did not decode into its record type.
    #[error("malformed document {collection}/{id}: {reason}")]
    MalformedDocument {
        collection: String,
        id: String,
        reason: String,
    },

    /// Validation failed for one or more fields.
    #[error("validation failed")]
    Validation(#[from] ValidationError),

    /// Invalid input supplied to a query or action.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl SyncError {
    pub(crate) fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub(crate) fn unauthorized(actor: impl Into<String>, action: impl Into<Cow<'static, str>>) -> Self {
        Self::Unauthorized {
            actor: actor.into(),
            action: action.into(),
        }
    }

    pub(crate) fn invalid_state(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether the failure is transient and the caller may retry the same action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteConflict { .. } | Self::Unreachable { .. })
    }
}

impl From<redis::RedisError> for SyncError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unreachable {
            message: Cow::Owned(err.to_string()),
        }
    }
}

/// Collection of validation issues encountered while preparing a mutation.
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

    /// Returns `Ok(())` when no issues were collected.
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Detailed validation failure for a single field or logical path.
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
