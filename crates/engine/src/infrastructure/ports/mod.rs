//! Ports: traits and shared types the services depend on, implemented
//! by the infrastructure adapters.

pub mod error;
pub mod external;
pub mod types;

pub use error::{EmbedError, LlmError, RepoError};
pub use external::{EmbeddingPort, LlmPort};
pub use types::{ChatMessage, FinishReason, LlmRequest, LlmResponse, MessageRole, TokenUsage};
