//! Anthropic Messages API client. Kept close to the teacher's
//! `clients/anthropic.rs` for headers/auth (`x-api-key`,
//! `anthropic-version`) and request shape, narrowed to a single
//! non-streaming response instead of an SSE stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::{LLMModel, LLMProviderAPIKeys};

use super::types::{
    LLMClient, LLMClientCompletionRequest, LLMClientCompletionResponse, LLMClientError,
    LLMClientRole,
};

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.anthropic.com".to_owned(),
        }
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn chat_endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

fn as_anthropic_request(
    request: &LLMClientCompletionRequest,
) -> AnthropicRequest {
    let system = request
        .messages()
        .iter()
        .find(|m| m.role() == LLMClientRole::System)
        .map(|m| m.content().to_owned());

    let messages = request
        .messages()
        .iter()
        .filter(|m| m.role() != LLMClientRole::System)
        .map(|m| AnthropicMessage {
            role: if m.role() == LLMClientRole::Assistant {
                "assistant"
            } else {
                "user"
            },
            content: m.content().to_owned(),
        })
        .collect();

    AnthropicRequest {
        model: request.model().wire_name().to_owned(),
        system,
        messages,
        temperature: request.temperature(),
        max_tokens: request.max_tokens().unwrap_or(1024),
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn completion(
        &self,
        api_key: &LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError> {
        let LLMProviderAPIKeys::Anthropic(key) = api_key else {
            return Err(LLMClientError::WrongApiKeyType);
        };
        if !request.model().is_anthropic() {
            return Err(LLMClientError::UnsupportedModel(
                request.model().wire_name().to_owned(),
            ));
        }

        let anthropic_request = as_anthropic_request(&request);

        let response = self
            .client
            .post(self.chat_endpoint())
            .header("x-api-key", key.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnthropicResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(LLMClientError::EmptyResponse);
        }

        Ok(LLMClientCompletionResponse::new(
            text,
            parsed.usage.input_tokens,
            parsed.usage.output_tokens,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::types::LLMClientMessage;

    #[test]
    fn system_message_is_pulled_out_of_the_transcript() {
        let request = LLMClientCompletionRequest::new(
            LLMModel::Claude35Sonnet,
            vec![
                LLMClientMessage::system("be terse".into()),
                LLMClientMessage::user("hello".into()),
            ],
            0.2,
        );
        let anthropic_request = as_anthropic_request(&request);
        assert_eq!(anthropic_request.system.as_deref(), Some("be terse"));
        assert_eq!(anthropic_request.messages.len(), 1);
        assert_eq!(anthropic_request.messages[0].role, "user");
    }
}
