//! Engine-wide error taxonomy.
//!
//! Every failure a caller can observe maps to one of these variants,
//! each with a stable string code and an HTTP status. Services convert
//! their local errors into `FactoryError` at the API boundary.

use axum::http::StatusCode;

use crate::infrastructure::ports::{EmbedError, LlmError, RepoError};
use storyforge_domain::DomainError;

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Project already has a running job")]
    BusyProject,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Network/timeout/5xx from the LLM provider after retries.
    #[error("LLM transient failure: {0}")]
    LlmTransient(String),

    /// Auth or model-id problems; retrying cannot help.
    #[error("LLM permanent failure: {0}")]
    LlmPermanent(String),

    #[error("Failed to parse model output: {0}")]
    JsonParseFailed(String),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A hard canon fact would be contradicted.
    #[error("Canon conflict: {0}")]
    CanonConflict(String),

    /// A critical consistency issue blocks the chapter.
    #[error("Critical consistency issue: {0}")]
    ConsistencyCritical(String),

    /// Draft still below the word-count floor after all continuations.
    #[error("Chapter below word count floor: {0}")]
    WordCountFloor(String),

    #[error("Storage failure: {0}")]
    InternalStorage(String),
}

impl FactoryError {
    /// Stable string code carried in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthRequired => "AuthRequired",
            Self::PermissionDenied => "PermissionDenied",
            Self::NotFound { .. } => "NotFound",
            Self::BusyProject => "BusyProject",
            Self::ValidationFailed(_) => "ValidationFailed",
            Self::LlmTransient(_) => "LLMTransient",
            Self::LlmPermanent(_) => "LLMPermanent",
            Self::JsonParseFailed(_) => "JSONParseFailed",
            Self::BudgetExceeded(_) => "BudgetExceeded",
            Self::CanonConflict(_) => "CanonConflict",
            Self::ConsistencyCritical(_) => "ConsistencyCritical",
            Self::WordCountFloor(_) => "WordCountFloor",
            Self::InternalStorage(_) => "InternalStorage",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BusyProject => StatusCode::CONFLICT,
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::LlmTransient(_) => StatusCode::BAD_GATEWAY,
            Self::LlmPermanent(_) => StatusCode::BAD_GATEWAY,
            Self::JsonParseFailed(_) => StatusCode::BAD_GATEWAY,
            Self::BudgetExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::CanonConflict(_) => StatusCode::CONFLICT,
            Self::ConsistencyCritical(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::WordCountFloor(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalStorage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<RepoError> for FactoryError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            other => Self::InternalStorage(other.to_string()),
        }
    }
}

impl From<LlmError> for FactoryError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Permanent(msg) => Self::LlmPermanent(msg),
            other => Self::LlmTransient(other.to_string()),
        }
    }
}

impl From<EmbedError> for FactoryError {
    fn from(err: EmbedError) -> Self {
        Self::LlmTransient(err.to_string())
    }
}

impl From<DomainError> for FactoryError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            other => Self::ValidationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(FactoryError::BusyProject.code(), "BusyProject");
        assert_eq!(
            FactoryError::BudgetExceeded("daily".into()).code(),
            "BudgetExceeded"
        );
        assert_eq!(
            FactoryError::LlmTransient("timeout".into()).code(),
            "LLMTransient"
        );
    }

    #[test]
    fn repo_not_found_maps_through() {
        let err: FactoryError = RepoError::not_found("Project", "abc").into();
        assert_eq!(err.code(), "NotFound");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn llm_errors_split_transient_permanent() {
        let t: FactoryError = LlmError::RequestFailed("503".into()).into();
        assert_eq!(t.code(), "LLMTransient");
        let p: FactoryError = LlmError::Permanent("401".into()).into();
        assert_eq!(p.code(), "LLMPermanent");
    }
}
