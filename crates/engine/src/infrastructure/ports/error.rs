//! Error types for port operations.

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Entity not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Business constraint violated.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepoError {
    /// Create a NotFound error with entity type and ID context.
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Create a ConstraintViolation error.
    pub fn constraint(message: impl ToString) -> Self {
        Self::ConstraintViolation(message.to_string())
    }

    /// Check if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        Self::database("sqlx", err)
    }
}

/// LLM adapter errors. Transient failures are retryable; permanent ones
/// (auth, unknown model) are not.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("LLM authentication or model error: {0}")]
    Permanent(String),
}

impl LlmError {
    /// Whether the error is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(msg) => {
                !msg.contains("401") && !msg.contains("403") && !msg.contains("404")
            }
            Self::InvalidResponse(_) => true,
            Self::Permanent(_) => false,
        }
    }
}

/// Embedding adapter errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbedError {
    #[error("Embedding request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}
