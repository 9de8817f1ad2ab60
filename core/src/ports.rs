//! Trait contracts for the collaborators spec §1/§6 places out of scope:
//! the TUI, and the static source scanner. The core only ever calls through
//! these traits; it never assumes a concrete implementation. No
//! implementation of either trait lives in this crate.

use async_trait::async_trait;

/// The UI's side of the cost-gate and interactive-prompt contracts (§6).
/// `show` is purely informational — the core never blocks on it, so it is
/// not `async`.
#[async_trait]
pub trait UiPort: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
    async fn prompt(&self, label: &str, suggestions: &[String]) -> String;
    async fn select(&self, label: &str, options: &[String]) -> String;
    async fn password(&self, label: &str) -> String;
    fn show(&self, event: UiEvent);
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Message(String),
    Progress(String),
    Error(String),
    Success(String),
    Table(Vec<Vec<String>>),
    Json(serde_json::Value),
}

/// One action the static scanner found by reading source code, per §6's
/// `CodeAction` record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CodeAction {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub inputs: Vec<String>,
    pub expects: CodeActionExpectation,
    pub implementation: CodeActionImplementation,
    pub category: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CodeActionExpectation {
    pub success: bool,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CodeActionImplementation {
    pub method: String,
    pub endpoint: String,
}

/// Read-only static source scanner consumed by Action Discovery to seed its
/// dedup/already-tested machinery (spec §4.4, §9 "replacing global
/// singletons" — this stays an injected value, never a singleton).
#[async_trait]
pub trait CodeScanner: Send + Sync {
    async fn scan_project(&self) -> Vec<CodeAction>;
}
