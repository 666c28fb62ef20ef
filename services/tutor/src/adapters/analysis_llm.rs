//! services/tutor/src/adapters/analysis_llm.rs
//!
//! This module contains the adapter for the content-analysis LLM.
//! It implements the `ContentAnalysisService` port from the `core` crate, asking
//! the model for a JSON document constrained by the analysis schema.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use professor_core::analysis::{analysis_prompt, analysis_schema};
use professor_core::ports::{ContentAnalysisService, PortError, PortResult};
use tracing::debug;

const TEMPERATURE: f32 = 0.5;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ContentAnalysisService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiAnalysisAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiAnalysisAdapter {
    /// Creates a new `OpenAiAnalysisAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `ContentAnalysisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentAnalysisService for OpenAiAnalysisAdapter {
    async fn analyze_content(&self, content_text: &str) -> PortResult<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(analysis_prompt(content_text))
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Chapters and topics of the analyzed content.".to_string()),
                name: "analysis_result".to_string(),
                schema: Some(analysis_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .response_format(response_format)
            .temperature(TEMPERATURE)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!("Sending analysis request to model {}", self.model);
        // The backend's message is passed through untouched; the core classifies it.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            PortError::Unexpected("Analysis LLM returned no choices in its response.".to_string())
        })?;
        choice.message.content.ok_or_else(|| {
            PortError::Unexpected("Analysis LLM response contained no text content.".to_string())
        })
    }
}
