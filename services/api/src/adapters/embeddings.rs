//! services/api/src/adapters/embeddings.rs
//!
//! Implements the `EmbeddingService` port against an OpenAI-compatible embeddings endpoint.

use async_openai::{
    config::OpenAIConfig, error::OpenAIError, types::CreateEmbeddingRequestArgs, Client,
};
use async_trait::async_trait;
use flight_assistant_core::ports::{EmbeddingService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct OpenAiEmbeddingAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbeddingAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn embed(&self, input: Vec<String>) -> PortResult<Vec<Vec<f32>>> {
        let expected = input.len();
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(input)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        let mut data = response.data;
        data.sort_by_key(|embedding| embedding.index);
        if data.len() != expected {
            return Err(PortError::Unexpected(format!(
                "Embedding API returned {} vectors for {} inputs",
                data.len(),
                expected
            )));
        }
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

//=========================================================================================
// `EmbeddingService` Trait Implementation
//=========================================================================================

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingAdapter {
    async fn embed_query(&self, text: &str) -> PortResult<Vec<f32>> {
        self.embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PortError::Unexpected("Embedding API returned no vectors".to_string()))
    }

    /// One request for the whole batch.
    async fn embed_documents(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed(texts.to_vec()).await
    }
}
