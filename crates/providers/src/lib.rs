//! # Noteseek Providers
//!
//! Remote model collaborators: a batch embedding client and a judge-model
//! rerank client, both speaking OpenAI-compatible HTTP endpoints.
//!
//! Embedding failure is non-fatal for indexing (documents stay
//! keyword-searchable) but fatal for vector queries. Rerank failure is
//! never fatal: it degrades to the caller's pre-rerank ordering.

mod embedding;
mod error;
mod model;
mod rerank;

pub use embedding::{EmbeddingProvider, HttpEmbeddingClient, ModelInfo};
pub use error::{ProviderError, Result};
pub use model::{ModelProfile, TaskPrefixes, CHARS_PER_TOKEN};
pub use rerank::{HttpRerankClient, RerankCandidate, RerankProvider, RerankScore};
