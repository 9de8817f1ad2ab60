//! Generic OpenAI-wire-compatible client for `ai.endpoint` overrides —
//! local model servers, proxies, anything that speaks the
//! `/chat/completions` shape without being the real OpenAI API. Grounded on
//! the teacher's `clients/openai_compatible.rs`, which exists for exactly
//! this purpose (self-hosted/llama.cpp-style servers).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::LLMProviderAPIKeys;

use super::types::{
    LLMClient, LLMClientCompletionRequest, LLMClientCompletionResponse, LLMClientError,
};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageOwned,
}

#[derive(Deserialize)]
struct ChatMessageOwned {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

pub struct OpenAICompatibleClient {
    client: reqwest::Client,
}

impl OpenAICompatibleClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for OpenAICompatibleClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn completion(
        &self,
        api_key: &LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError> {
        let LLMProviderAPIKeys::OpenAICompatible(provider) = api_key else {
            return Err(LLMClientError::WrongApiKeyType);
        };

        let messages = request
            .messages()
            .iter()
            .map(|m| ChatMessage {
                role: m.role().as_str(),
                content: m.content(),
            })
            .collect();

        let body = ChatRequest {
            model: request.model().wire_name(),
            messages,
            temperature: request.temperature(),
            max_tokens: request.max_tokens(),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", provider.endpoint))
            .bearer_auth(&provider.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LLMClientError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LLMClientError::EmptyResponse)?;

        Ok(LLMClientCompletionResponse::new(
            text,
            parsed.usage.prompt_tokens,
            parsed.usage.completion_tokens,
        ))
    }
}
