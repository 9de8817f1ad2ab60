//! Model-aware token estimation. The teacher uses `tiktoken-rs` for its
//! OpenAI-family clients; kept here as the sole tokenizer dependency since
//! the spec only asks for an estimate (§4.6), not an exact provider count,
//! and `cl100k_base` is a reasonable stand-in for the Anthropic models too —
//! the Gateway always prefers the actual counts the provider returns (§4.6
//! Post-flight) and only falls back to this estimate pre-flight or on error.

use tiktoken_rs::{cl100k_base, CoreBPE};

fn bpe() -> &'static CoreBPE {
    use std::sync::OnceLock;
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| cl100k_base().expect("cl100k_base tokenizer ranks are statically bundled"))
}

pub fn estimate_tokens(text: &str) -> usize {
    bpe().encode_with_special_tokens(text).len()
}

/// Rough response-size estimate used before a call is made, when no prior
/// interaction history exists to calibrate against. The teacher's codegen
/// prompts rarely ask for more than a bounded summary back, so a fixed
/// fraction of the prompt's own size is a defensible default.
pub fn estimate_response_tokens(prompt_tokens: usize, max_tokens_hint: Option<usize>) -> usize {
    max_tokens_hint.unwrap_or_else(|| (prompt_tokens / 4).clamp(64, 1024))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_nonzero_for_nonempty_text() {
        assert!(estimate_tokens("hello world") > 0);
    }

    #[test]
    fn estimate_is_zero_for_empty_text() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn response_estimate_respects_hint() {
        assert_eq!(estimate_response_tokens(1000, Some(50)), 50);
    }
}
