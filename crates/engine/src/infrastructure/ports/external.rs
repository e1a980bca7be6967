//! Port traits for external services.

use async_trait::async_trait;

use super::error::{EmbedError, LlmError};
use super::types::{LlmRequest, LlmResponse};

/// Any OpenAI-compatible chat completion provider.
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// Text embedding provider.
#[async_trait]
pub trait EmbeddingPort: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>, EmbedError>;
}
