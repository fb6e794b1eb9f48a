//! services/api/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the text-generation LLM.
//! It implements the `TextGenerationService` port from the `core` crate and serves
//! answer synthesis, hypothetical-document generation and assisted extraction.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use flight_assistant_core::ports::{PortError, PortResult, TextGenerationService};
use serde_json::Value;
use tracing::debug;

const EXTRACTION_INSTRUCTIONS: &str = "You extract structured flight data from ATOM XML \
documents. Reply with a single JSON object that follows the provided schema. Use null for \
fields that are not present in the document.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using an OpenAI-compatible chat API.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String, temperature: f32) -> Self {
        Self {
            client,
            model,
            temperature,
        }
    }

    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        response_format: Option<ResponseFormat>,
    ) -> PortResult<String> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .n(1);
        if let Some(format) = response_format {
            args.response_format(format);
        }
        let request = args
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        // Extract the text content from the first choice in the response.
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            PortError::Unexpected("Generation LLM returned no choices in its response.".to_string())
        })?;
        choice.message.content.ok_or_else(|| {
            PortError::Unexpected("Generation LLM response contained no text content.".to_string())
        })
    }
}

fn user_message(content: String) -> PortResult<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestUserMessageArgs::default()
        .content(content)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiGenerationAdapter {
    async fn generate(&self, prompt: &str) -> PortResult<String> {
        debug!(model = %self.model, chars = prompt.len(), "Requesting completion");
        self.complete(vec![user_message(prompt.to_string())?], None)
            .await
    }

    /// Requests a JSON object constrained by `schema`. Servers without structured
    /// output support fail here and the caller falls back to plain prompting.
    async fn extract_structured(&self, text: &str, schema: &Value) -> PortResult<Value> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(EXTRACTION_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            user_message(text.to_string())?,
        ];
        let format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("A single flight leg from an ATOM message".to_string()),
                name: "flight_record".to_string(),
                schema: Some(schema.clone()),
                strict: None,
            },
        };

        let content = self.complete(messages, Some(format)).await?;
        serde_json::from_str(&content).map_err(|e| {
            PortError::Unexpected(format!("Structured response was not valid JSON: {e}"))
        })
    }
}
