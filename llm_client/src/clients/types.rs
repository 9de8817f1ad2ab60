//! Request/response/error types shared by every provider client. Narrowed
//! from the teacher's streaming-first design (`stream_completion` +
//! `UnboundedSender<LLMClientCompletionResponse>`) to the single
//! request/response round trip spec §6 actually asks for: `POST` with
//! `{model, messages, temperature, max_tokens}`, response
//! `{text, input_tokens, output_tokens}` or an error. Streaming has no
//! caller in this system (the Gateway always waits for the full answer
//! before parsing actions out of it), so it is not carried forward.

use async_trait::async_trait;
use thiserror::Error;

use crate::provider::{LLMModel, LLMProviderAPIKeys};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LLMClientRole {
    System,
    User,
    Assistant,
}

impl LLMClientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LLMClientRole::System => "system",
            LLMClientRole::User => "user",
            LLMClientRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LLMClientMessage {
    role: LLMClientRole,
    content: String,
}

impl LLMClientMessage {
    pub fn new(role: LLMClientRole, content: String) -> Self {
        Self { role, content }
    }

    pub fn system(content: String) -> Self {
        Self::new(LLMClientRole::System, content)
    }

    pub fn user(content: String) -> Self {
        Self::new(LLMClientRole::User, content)
    }

    pub fn role(&self) -> LLMClientRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Clone)]
pub struct LLMClientCompletionRequest {
    model: LLMModel,
    messages: Vec<LLMClientMessage>,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl LLMClientCompletionRequest {
    pub fn new(model: LLMModel, messages: Vec<LLMClientMessage>, temperature: f32) -> Self {
        Self {
            model,
            messages,
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &LLMModel {
        &self.model
    }

    pub fn messages(&self) -> &[LLMClientMessage] {
        &self.messages
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<usize> {
        self.max_tokens
    }

    /// Flattened prompt text, used for pre-flight token estimation before a
    /// provider-specific request body is even constructed.
    pub fn flattened_prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct LLMClientCompletionResponse {
    text: String,
    input_tokens: usize,
    output_tokens: usize,
}

impl LLMClientCompletionResponse {
    pub fn new(text: String, input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            text,
            input_tokens,
            output_tokens,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn input_tokens(&self) -> usize {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> usize {
        self.output_tokens
    }
}

#[derive(Error, Debug)]
pub enum LLMClientError {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("serde failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unsupported model for this provider: {0}")]
    UnsupportedModel(String),

    #[error("openai api error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),

    #[error("wrong api key type for this client")]
    WrongApiKeyType,

    #[error("provider returned an empty response body")]
    EmptyResponse,

    #[error("provider HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn completion(
        &self,
        api_key: &LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattened_prompt_joins_messages_in_order() {
        let req = LLMClientCompletionRequest::new(
            LLMModel::Gpt4o,
            vec![
                LLMClientMessage::system("sys".into()),
                LLMClientMessage::user("usr".into()),
            ],
            0.0,
        );
        assert_eq!(req.flattened_prompt(), "sys\nusr");
    }
}
