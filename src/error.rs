//! Uniform success/failure value for every engine operation.
//!
//! Every fallible operation in the library returns [`Result<T>`], whose error
//! side is a [`MemoryError`] carrying one code from the closed [`ErrorCode`]
//! taxonomy, a human-readable message, and optional diagnostics (`cause`,
//! `context`). Raw driver errors (`rusqlite`, `reqwest`, `serde_json`) are
//! converted at the boundary and never leak to callers.
//!
//! `map` and `unwrap_or` are the standard [`std::result::Result`] methods;
//! [`and_then_async`] adds the async continuation the engine needs.

use std::fmt;
use std::future::Future;

use serde::Serialize;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Closed set of failure kinds, grouped by origin (see [`ErrorCategory`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Storage
    ConnectionFailed,
    QueryFailed,
    NotFound,
    Duplicate,
    ConstraintViolation,
    // Vector
    EmbeddingFailed,
    DimensionMismatch,
    InvalidVector,
    // Graph
    EntityNotFound,
    RelationNotFound,
    InvalidRelation,
    /// Reserved. Traversal is cycle-safe by construction, so nothing raises it today.
    CycleDetected,
    MaxDepthExceeded,
    // Extraction
    ExtractionFailed,
    LlmError,
    ParseError,
    // Input
    ValidationError,
    InvalidInput,
    // Quota
    RateLimited,
    QuotaExceeded,
    // Generic
    Unknown,
    Timeout,
}

/// Origin group of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Storage,
    Vector,
    Graph,
    Extraction,
    Input,
    Quota,
    Generic,
}

impl ErrorCode {
    /// Stable wire representation (e.g. `"ENTITY_NOT_FOUND"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::QueryFailed => "QUERY_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::Duplicate => "DUPLICATE",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::EmbeddingFailed => "EMBEDDING_FAILED",
            Self::DimensionMismatch => "DIMENSION_MISMATCH",
            Self::InvalidVector => "INVALID_VECTOR",
            Self::EntityNotFound => "ENTITY_NOT_FOUND",
            Self::RelationNotFound => "RELATION_NOT_FOUND",
            Self::InvalidRelation => "INVALID_RELATION",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::MaxDepthExceeded => "MAX_DEPTH_EXCEEDED",
            Self::ExtractionFailed => "EXTRACTION_FAILED",
            Self::LlmError => "LLM_ERROR",
            Self::ParseError => "PARSE_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidInput => "INVALID_INPUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::Unknown => "UNKNOWN",
            Self::Timeout => "TIMEOUT",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionFailed
            | Self::QueryFailed
            | Self::NotFound
            | Self::Duplicate
            | Self::ConstraintViolation => ErrorCategory::Storage,
            Self::EmbeddingFailed | Self::DimensionMismatch | Self::InvalidVector => {
                ErrorCategory::Vector
            }
            Self::EntityNotFound
            | Self::RelationNotFound
            | Self::InvalidRelation
            | Self::CycleDetected
            | Self::MaxDepthExceeded => ErrorCategory::Graph,
            Self::ExtractionFailed | Self::LlmError | Self::ParseError => {
                ErrorCategory::Extraction
            }
            Self::ValidationError | Self::InvalidInput => ErrorCategory::Input,
            Self::RateLimited | Self::QuotaExceeded => ErrorCategory::Quota,
            Self::Unknown | Self::Timeout => ErrorCategory::Generic,
        }
    }

    /// Whether a caller may reasonably retry the same request after backing off.
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout | Self::ConnectionFailed
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error half of every engine [`Result`].
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct MemoryError {
    pub code: ErrorCode,
    pub message: String,
    /// Stringified underlying error, kept for diagnostics only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Structured detail, e.g. `{"field": "depth"}` for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl MemoryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            context: None,
        }
    }

    /// A `ValidationError` pointing at the offending input field.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message).with_context("field", field)
    }

    pub fn entity_not_found(id: &str) -> Self {
        Self::new(ErrorCode::EntityNotFound, format!("entity not found: {id}"))
            .with_context("id", id)
    }

    pub fn relation_not_found(id: &str) -> Self {
        Self::new(ErrorCode::RelationNotFound, format!("relation not found: {id}"))
            .with_context("id", id)
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{what} not found: {id}")).with_context("id", id)
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Attach one key to the context object, creating it if needed.
    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let value = value.into();
        match self.context {
            Some(serde_json::Value::Object(ref mut map)) => {
                map.insert(key.to_string(), value);
            }
            _ => {
                let mut map = serde_json::Map::new();
                map.insert(key.to_string(), value);
                self.context = Some(serde_json::Value::Object(map));
            }
        }
        self
    }

    /// The validated field this error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|c| c.get("field"))
            .and_then(|f| f.as_str())
    }

    /// JSON form used on the tool boundary: `{code, message, field?, context?}`.
    /// Never fails. `cause` stays server-side.
    pub fn to_json_string(&self) -> String {
        #[derive(Serialize)]
        struct Wire<'a> {
            code: ErrorCode,
            message: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            field: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            context: Option<&'a serde_json::Value>,
        }

        let wire = Wire {
            code: self.code,
            message: &self.message,
            field: self.field(),
            context: self.context.as_ref(),
        };
        serde_json::to_string(&wire).unwrap_or_else(|_| {
            format!(r#"{{"code":"{}","message":"{}"}}"#, self.code, self.code)
        })
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi;

        let code = match &err {
            rusqlite::Error::QueryReturnedNoRows => ErrorCode::NotFound,
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                rusqlite::ErrorCode::ConstraintViolation => match failure.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        ErrorCode::Duplicate
                    }
                    _ => ErrorCode::ConstraintViolation,
                },
                rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase => {
                    ErrorCode::ConnectionFailed
                }
                _ => ErrorCode::QueryFailed,
            },
            _ => ErrorCode::QueryFailed,
        };

        let message = match code {
            ErrorCode::NotFound => "record not found",
            ErrorCode::Duplicate => "a record with the same identity already exists",
            ErrorCode::ConstraintViolation => "storage constraint violated",
            ErrorCode::ConnectionFailed => "failed to open database",
            _ => "database query failed",
        };

        MemoryError::new(code, message).with_cause(err)
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        MemoryError::new(ErrorCode::ParseError, "invalid JSON").with_cause(err)
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        MemoryError::new(ErrorCode::Unknown, "background task failed").with_cause(err)
    }
}

/// Chain an async continuation onto a result. `f` is only invoked for `Ok`.
pub async fn and_then_async<T, U, F, Fut>(result: Result<T>, f: F) -> Result<U>
where
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<U>>,
{
    match result {
        Ok(value) => f(value).await,
        Err(err) => Err(err),
    }
}
