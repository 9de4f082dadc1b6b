use crate::error::{ProviderError, Result};
use crate::model::{truncate_chars, ModelProfile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Inputs per embeddings request; larger note batches are split and sent
/// sequentially so provider-side concurrency limits are respected
const EMBED_BATCH_SIZE: usize = 32;

/// Embedding model metadata resolved from the provider
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ModelInfo {
    /// Fixed output vector dimension
    #[serde(alias = "embedding_dimension")]
    pub dimension: usize,
    /// Token context window used to derive the input character budget
    #[serde(alias = "max_input_tokens")]
    pub context_length: usize,
}

/// Batch embedding contract consumed by the indexing pipeline and the
/// query engine. One vector per input, order preserved.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn model_info(&self) -> Result<ModelInfo>;

    /// Embed indexed content (document task prefix applied)
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query (query task prefix applied)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// OpenAI-compatible embeddings endpoint client
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    profile: ModelProfile,
    info: OnceCell<ModelInfo>,
}

#[derive(Serialize)]
struct EmbeddingsRequestBody {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingsResponseBody {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

impl HttpEmbeddingClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, profile: ModelProfile) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            profile,
            info: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.profile.model_id
    }

    async fn fetch_model_info(&self) -> Result<ModelInfo> {
        let url = format!("{}/models/{}", self.base_url, self.profile.model_id);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, body });
        }
        let info: ModelInfo = response.json().await?;
        if info.dimension == 0 {
            return Err(ProviderError::InvalidResponse(
                "model reports zero embedding dimension".to_string(),
            ));
        }
        Ok(info)
    }

    async fn embed_raw(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let mut all = Vec::with_capacity(inputs.len());

        for batch in inputs.chunks(EMBED_BATCH_SIZE) {
            let body = EmbeddingsRequestBody {
                model: self.profile.model_id.clone(),
                input: batch.to_vec(),
            };
            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Http { status, body });
            }

            let mut parsed: EmbeddingsResponseBody = response.json().await?;
            if parsed.data.len() != batch.len() {
                return Err(ProviderError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    parsed.data.len()
                )));
            }
            parsed.data.sort_by_key(|item| item.index);
            all.extend(parsed.data.into_iter().map(|item| item.embedding));
        }

        Ok(all)
    }

    /// Apply the task prefix, then clamp to the model's character budget.
    /// The budget is a client-side safety net independent of any
    /// server-side truncation.
    fn prepare(&self, text: &str, context_length: usize, for_query: bool) -> String {
        let prefixed = if for_query {
            self.profile.prefix_query(text)
        } else {
            self.profile.prefix_document(text)
        };
        let budget = self.profile.char_budget(context_length);
        truncate_chars(&prefixed, budget).to_string()
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn model_info(&self) -> Result<ModelInfo> {
        self.info
            .get_or_try_init(|| self.fetch_model_info())
            .await
            .copied()
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let info = self.model_info().await?;
        let inputs: Vec<String> = texts
            .iter()
            .map(|t| self.prepare(t, info.context_length, false))
            .collect();
        let vectors = self.embed_raw(inputs).await?;
        log::debug!("Embedded {} document chunks", vectors.len());
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let info = self.model_info().await?;
        let input = self.prepare(text, info.context_length, true);
        let mut vectors = self.embed_raw(vec![input]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("empty embedding response".to_string()))
    }
}
