//! Provider and model identifiers. Narrowed from the teacher's broader
//! multi-backend enum (CodeStory, TogetherAI, Ollama, Azure, Gemini, ...) to
//! the providers spec'd in the cost table: OpenAI and Anthropic, plus a
//! generic OpenAI-compatible escape hatch for `ai.endpoint` overrides.

use std::fmt;

#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, Hash, PartialEq, Eq)]
pub enum LLMProvider {
    OpenAI,
    Anthropic,
    OpenAICompatible,
}

impl fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::OpenAICompatible => write!(f, "openai-compatible"),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub enum LLMProviderAPIKeys {
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
    OpenAICompatible(OpenAICompatibleProvider),
}

impl LLMProviderAPIKeys {
    pub fn provider(&self) -> LLMProvider {
        match self {
            LLMProviderAPIKeys::OpenAI(_) => LLMProvider::OpenAI,
            LLMProviderAPIKeys::Anthropic(_) => LLMProvider::Anthropic,
            LLMProviderAPIKeys::OpenAICompatible(_) => LLMProvider::OpenAICompatible,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct OpenAIProvider {
    pub api_key: String,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct AnthropicProvider {
    pub api_key: String,
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct OpenAICompatibleProvider {
    pub api_key: String,
    pub endpoint: String,
}

/// Model identifiers. Unlike the teacher's `LLMType`, which enumerates a
/// large fixed set of open-weight and hosted models, the core only ever
/// needs to know the four models the cost table prices plus whatever the
/// user's config names (`Custom`), so the enum stays small and the mapping
/// to a wire model string lives on the enum itself rather than in a
/// per-client lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LLMModel {
    Gpt4o,
    Gpt4oMini,
    Claude35Sonnet,
    Claude3Haiku,
    Custom(String),
}

impl LLMModel {
    pub fn wire_name(&self) -> &str {
        match self {
            LLMModel::Gpt4o => "gpt-4o",
            LLMModel::Gpt4oMini => "gpt-4o-mini",
            LLMModel::Claude35Sonnet => "claude-3.5-sonnet",
            LLMModel::Claude3Haiku => "claude-3-haiku",
            LLMModel::Custom(name) => name,
        }
    }

    pub fn from_config_str(name: &str) -> Self {
        match name {
            "gpt-4o" => LLMModel::Gpt4o,
            "gpt-4o-mini" => LLMModel::Gpt4oMini,
            "claude-3.5-sonnet" => LLMModel::Claude35Sonnet,
            "claude-3-haiku" => LLMModel::Claude3Haiku,
            other => LLMModel::Custom(other.to_owned()),
        }
    }

    pub fn is_anthropic(&self) -> bool {
        matches!(self, LLMModel::Claude35Sonnet | LLMModel::Claude3Haiku)
    }

    pub fn is_openai(&self) -> bool {
        matches!(self, LLMModel::Gpt4o | LLMModel::Gpt4oMini)
    }
}

impl fmt::Display for LLMModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_roundtrips_as_custom() {
        let m = LLMModel::from_config_str("llama-3-70b");
        assert_eq!(m.wire_name(), "llama-3-70b");
        assert!(matches!(m, LLMModel::Custom(_)));
    }

    #[test]
    fn known_models_roundtrip() {
        assert_eq!(LLMModel::from_config_str("gpt-4o").wire_name(), "gpt-4o");
        assert!(LLMModel::from_config_str("claude-3-haiku").is_anthropic());
    }
}
