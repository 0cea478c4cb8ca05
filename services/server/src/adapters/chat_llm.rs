//! services/server/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the remote chat model.
//! It implements the `ChatModelService` port from the `core` crate against any
//! OpenAI-compatible chat completions endpoint, streaming the reply as it arrives.

const SYSTEM_INSTRUCTIONS: &str = "You are a friendly, helpful assistant chatting with a logged-in user. \
Answer clearly and conversationally, and use the earlier turns of the conversation when they help.";

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
use chatbot_core::domain::{Role, TranscriptEntry};
use chatbot_core::ports::{ChatModelService, ChunkStream, PortError, PortResult};
use futures::StreamExt;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ChatModelService` using an OpenAI-compatible LLM.
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

    /// Builds a client for `api_key`, pointed at `api_base` when one is given.
    pub fn client_for(api_key: &str, api_base: Option<&str>) -> Client<OpenAIConfig> {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        Client::with_config(config)
    }
}

/// Lays out the system prompt, the prior turns, and the new message.
fn build_messages(
    context: &[TranscriptEntry],
    message: &str,
) -> PortResult<Vec<ChatCompletionRequestMessage>> {
    let mut messages = Vec::with_capacity(context.len() + 2);
    messages.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_INSTRUCTIONS)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
    );

    for turn in context {
        let built: Result<ChatCompletionRequestMessage, OpenAIError> = match turn.role {
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.text.as_str())
                .build()
                .map(Into::into),
            Role::Bot => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.text.as_str())
                .build()
                .map(Into::into),
        };
        messages.push(built.map_err(|e| PortError::Unexpected(e.to_string()))?);
    }

    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(message)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
    );
    Ok(messages)
}

//=========================================================================================
// `ChatModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ChatModelService for OpenAiChatAdapter {
    async fn stream_reply(
        &self,
        context: &[TranscriptEntry],
        message: &str,
    ) -> PortResult<ChunkStream> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(build_messages(context, message)?)
            .stream(true)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // Keep only the text deltas; role-only and empty deltas carry nothing to show.
        let chunks = upstream.filter_map(|event| async move {
            match event {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .filter(|text| !text.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(PortError::Unexpected(e.to_string()))),
            }
        });

        Ok(Box::pin(chunks))
    }
}
