//! Row types for the Capture Store, one `sqlx::FromRow` struct per table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PageCapture {
    pub id: i64,
    pub url: String,
    pub title: String,
    /// Path to the captured HTML under `.tod/captures/` (spec §6 filesystem
    /// layout) — the HTML body itself never lives in the database row.
    pub html_file: String,
    pub html_length: i64,
    pub captured_at: DateTime<Utc>,
    pub debug_port: i64,
    pub ws_target_url: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DiscoveredActionRow {
    pub id: String,
    pub capture_id: String,
    pub description: String,
    pub selector: String,
    pub action_kind: String,
    pub javascript: String,
    pub is_tested: bool,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub user_input: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub id: String,
    pub capture_id: Option<String>,
    pub kind: String,
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestGeneration {
    pub id: String,
    pub capture_id: String,
    /// JSON-encoded array of the `DiscoveredAction` ids this generated file
    /// covers — a flow is usually more than one action.
    pub action_ids: String,
    pub framework: String,
    pub file_path: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl TestGeneration {
    pub fn action_id_list(&self) -> Vec<String> {
        serde_json::from_str(&self.action_ids).unwrap_or_default()
    }

    pub fn encode_action_ids(ids: &[String]) -> String {
        serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_captures: i64,
    pub total_actions: i64,
    pub untested_actions: i64,
    pub total_generations: i64,
    pub llm_interactions: i64,
    pub last_capture_at: Option<DateTime<Utc>>,
}
