//! Routes a completion request to the right provider client. Kept from the
//! teacher's `LLMBroker` pattern: a small map from provider to boxed trait
//! object, so callers never need to match on provider themselves.

use std::collections::HashMap;

use crate::{
    clients::{
        anthropic::AnthropicClient,
        openai::OpenAIClient,
        openai_compatible::OpenAICompatibleClient,
        types::{LLMClient, LLMClientCompletionRequest, LLMClientCompletionResponse, LLMClientError},
    },
    provider::{LLMProvider, LLMProviderAPIKeys},
};

pub struct LLMBroker {
    providers: HashMap<LLMProvider, Box<dyn LLMClient>>,
}

impl LLMBroker {
    /// Builds a broker with the OpenAI-compatible and Anthropic clients
    /// always available; the real OpenAI client needs its api key at
    /// construction time (the teacher's `OpenAIClient::new` takes no key and
    /// configures it lazily per-call, but `async-openai`'s client is cheaper
    /// to build once per key than per call).
    pub fn new(openai_api_key: Option<&str>) -> Self {
        let mut providers: HashMap<LLMProvider, Box<dyn LLMClient>> = HashMap::new();
        if let Some(key) = openai_api_key {
            providers.insert(LLMProvider::OpenAI, Box::new(OpenAIClient::new(key)));
        }
        providers.insert(LLMProvider::Anthropic, Box::new(AnthropicClient::new()));
        providers.insert(
            LLMProvider::OpenAICompatible,
            Box::new(OpenAICompatibleClient::new()),
        );
        Self { providers }
    }

    pub fn add_provider(mut self, provider: LLMProvider, client: Box<dyn LLMClient>) -> Self {
        self.providers.insert(provider, client);
        self
    }

    pub async fn completion(
        &self,
        api_key: LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
    ) -> Result<LLMClientCompletionResponse, LLMClientError> {
        let provider = api_key.provider();
        let client = self
            .providers
            .get(&provider)
            .ok_or(LLMClientError::WrongApiKeyType)?;
        client.completion(&api_key, request).await
    }
}
