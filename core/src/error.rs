//! Error taxonomy from spec §7, realized as a single `thiserror` enum per
//! the teacher's habit (`llm_client::clients::types::LLMClientError`,
//! Weavegraph's `SQLiteCheckpointerError`) of one flat error type per
//! subsystem boundary with `#[from]` conversions from the library errors
//! that actually cross it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("CDP transport failed: {0}")]
    CdpTransportFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("HTML extraction failed: all strategies produced fewer than 100 characters")]
    HtmlExtractFailed,

    #[error("LLM call failed: {0}")]
    LlmCallFailed(#[from] llm_client::clients::types::LLMClientError),

    #[error("LLM call declined by cost gate")]
    LlmDeclined,

    #[error("mail transport error: {0}")]
    MailTransport(String),

    #[error("persistence error: {0}")]
    PersistenceFailed(#[from] sqlx::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn is_declined(&self) -> bool {
        matches!(self, CoreError::LlmDeclined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declined_is_distinguishable_from_other_errors() {
        assert!(CoreError::LlmDeclined.is_declined());
        assert!(!CoreError::HtmlExtractFailed.is_declined());
    }
}
