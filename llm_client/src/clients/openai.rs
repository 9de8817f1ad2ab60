//! OpenAI client, kept close to the teacher's `clients/openai.rs`:
//! `async-openai` does the request/response encoding, we only adapt message
//! shapes and pull real usage counts off the response instead of streaming.

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

use crate::provider::{LLMModel, LLMProviderAPIKeys};

use super::types::{
    LLMClient, LLMClientCompletionRequest, LLMClientCompletionResponse, LLMClientError,
    LLMClientRole,
};

pub struct OpenAIClient {
    client: Client<OpenAIConfig>,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
        }
    }

    fn messages(
        &self,
        request: &LLMClientCompletionRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, LLMClientError> {
        request
            .messages()
            .iter()
            .map(|message| match message.role() {
                LLMClientRole::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(message.content())
                    .build()
                    .map(Into::into)
                    .map_err(LLMClientError::from),
                LLMClientRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content())
                    .build()
                    .map(Into::into)
                    .map_err(LLMClientError::from),
                LLMClientRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content())
                    .build()
                    .map(Into::into)
                    .map_err(LLMClientError::from),
            })
            .collect()
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn completion(
        &self,
        api_key: &LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError> {
        if !matches!(api_key, LLMProviderAPIKeys::OpenAI(_)) {
            return Err(LLMClientError::WrongApiKeyType);
        }
        if !request.model().is_openai() {
            return Err(LLMClientError::UnsupportedModel(
                request.model().wire_name().to_owned(),
            ));
        }

        let messages = self.messages(&request)?;
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(request.model().wire_name())
            .messages(messages)
            .temperature(request.temperature());
        if let Some(max_tokens) = request.max_tokens() {
            builder.max_tokens(max_tokens as u16);
        }
        let openai_request = builder.build()?;

        let response = self.client.chat().create(openai_request).await?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(LLMClientError::EmptyResponse)?;

        let usage = response.usage;
        let (input_tokens, output_tokens) = usage
            .map(|u| (u.prompt_tokens as usize, u.completion_tokens as usize))
            .unwrap_or((0, 0));

        Ok(LLMClientCompletionResponse::new(
            text,
            input_tokens,
            output_tokens,
        ))
    }
}
