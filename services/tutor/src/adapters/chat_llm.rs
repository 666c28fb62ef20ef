//! services/tutor/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the tutor chat LLM. It implements the
//! `ChatService` port: each context keeps its own conversation history and
//! streams every reply back chunk by chunk.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use professor_core::chat::CHAT_SYSTEM_INSTRUCTION;
use professor_core::ports::{ChatContext, ChatService, ChunkStream, PortError, PortResult};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl ChatService for OpenAiChatAdapter {
    async fn start_chat(&self) -> PortResult<Box<dyn ChatContext>> {
        let system: ChatCompletionRequestMessage = ChatCompletionRequestSystemMessageArgs::default()
            .content(CHAT_SYSTEM_INSTRUCTION)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into();
        Ok(Box::new(OpenAiChatContext {
            client: self.client.clone(),
            model: self.model.clone(),
            history: Arc::new(Mutex::new(vec![system])),
        }))
    }
}

//=========================================================================================
// One conversation
//=========================================================================================

pub struct OpenAiChatContext {
    client: Client<OpenAIConfig>,
    model: String,
    // Shared with the reply stream, which appends the finished answer.
    history: Arc<Mutex<Vec<ChatCompletionRequestMessage>>>,
}

impl OpenAiChatContext {
    fn lock_history(&self) -> PortResult<std::sync::MutexGuard<'_, Vec<ChatCompletionRequestMessage>>> {
        self.history
            .lock()
            .map_err(|_| PortError::Unexpected("Chat history lock poisoned".to_string()))
    }
}

#[async_trait]
impl ChatContext for OpenAiChatContext {
    async fn send_message_stream(&mut self, message: &str) -> PortResult<ChunkStream> {
        let user: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(message)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into();

        let messages = {
            let mut history = self.lock_history()?;
            history.push(user);
            history.clone()
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!("Sending chat turn to model {}", self.model);
        let mut upstream = match self.client.chat().create_stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                // A turn that never reached the model is not part of the conversation.
                self.lock_history()?.pop();
                return Err(PortError::Unexpected(e.to_string()));
            }
        };

        let history = self.history.clone();
        let stream = async_stream::stream! {
            let mut reply = String::new();
            let mut failed = false;
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(response) => {
                        let text: String = response
                            .choices
                            .iter()
                            .filter_map(|choice| choice.delta.content.as_deref())
                            .collect();
                        if text.is_empty() {
                            continue;
                        }
                        reply.push_str(&text);
                        yield Ok(text);
                    }
                    Err(e) => {
                        error!("Chat stream error: {}", e);
                        failed = true;
                        yield Err(PortError::Unexpected(e.to_string()));
                        break;
                    }
                }
            }

            if !failed {
                match ChatCompletionRequestAssistantMessageArgs::default().content(reply).build() {
                    Ok(answer) => {
                        let answer: ChatCompletionRequestMessage = answer.into();
                        if let Ok(mut history) = history.lock() {
                            history.push(answer);
                        }
                    }
                    Err(e) => error!("Failed to record assistant reply: {}", e),
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
