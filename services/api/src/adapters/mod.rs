pub mod db;
pub mod embeddings;
pub mod generation_llm;
pub mod vector_index;

pub use db::DbAdapter;
pub use embeddings::OpenAiEmbeddingAdapter;
pub use generation_llm::OpenAiGenerationAdapter;
pub use vector_index::SqliteVectorIndex;

use async_openai::{config::OpenAIConfig, Client};

use crate::config::Config;

/// Builds the shared OpenAI-compatible client, or `None` when the configured
/// backend cannot be reached without credentials we do not have.
pub fn openai_client(config: &Config) -> Option<Client<OpenAIConfig>> {
    if !config.models_enabled() {
        return None;
    }
    let mut openai_config =
        OpenAIConfig::new().with_api_key(config.openai_api_key.clone().unwrap_or_default());
    if let Some(api_base) = &config.llm_api_base {
        openai_config = openai_config.with_api_base(api_base);
    }
    Some(Client::with_config(openai_config))
}
