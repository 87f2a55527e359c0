//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the conversational LLM.
//! It implements the `ChatCompletionService` port from the `core` crate.

const SYSTEM_PERSONA: &str = "You are a friendly and professional dermatology assistant. \
You help users understand their skin conditions based on previous analysis results. \
Be concise, empathetic, and always remind users to consult a doctor for a definitive diagnosis.";

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use skin_consult_core::{
    domain::{Message, Role},
    ports::{ChatCompletionService, PortError, PortResult},
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatCompletionService` using an
/// OpenAI-compatible LLM.
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

    /// Flattens a stored message into plain turn text. An assistant message
    /// that carries a structured analysis gets it appended as a bracketed
    /// context annotation so the model understands what was discussed.
    fn turn_text(message: &Message) -> String {
        match &message.analysis {
            Some(analysis) => {
                let context = serde_json::to_string(analysis).unwrap_or_default();
                format!(
                    "{}\n\n[System Context - Previous Analysis Result]: {}",
                    message.content, context
                )
            }
            None => message.content.clone(),
        }
    }
}

//=========================================================================================
// `ChatCompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatCompletionService for OpenAiChatAdapter {
    /// Continues the consultation with the prior turns plus the new user text.
    async fn continue_chat(&self, history: &[Message], prompt: &str) -> PortResult<String> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(history.len() + 2);

        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PERSONA)
                .build()
                .map_err(|e| PortError::Chat(e.to_string()))?
                .into(),
        );

        for message in history {
            let text = Self::turn_text(message);
            let turn = match message.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(text)
                    .build()
                    .map_err(|e| PortError::Chat(e.to_string()))?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(text)
                    .build()
                    .map_err(|e| PortError::Chat(e.to_string()))?
                    .into(),
            };
            messages.push(turn);
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Chat(e.to_string()))?
                .into(),
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| PortError::Chat(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Chat(e.to_string()))?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Chat("Chat LLM returned no text content.".to_string()))?;

        Ok(reply)
    }
}
