//! Infrastructure adapters: LLM and embedding clients, persistence,
//! caches, configuration and the HTTP surface.

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod http;
pub mod llm;
pub mod persistence;
pub mod ports;
pub mod resilient_llm;
pub mod state;
