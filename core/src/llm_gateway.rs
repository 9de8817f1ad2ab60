//! C5 — LLM Gateway orchestration. Wraps `llm_client::broker::LLMBroker`
//! with the pre-flight cost gate and post-flight usage recording spec §4.6
//! asks for; the broker itself only knows how to talk to one provider at a
//! time; this is the layer that knows about money and a human in the loop.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use llm_client::broker::LLMBroker;
use llm_client::clients::types::{LLMClientCompletionRequest, LLMClientCompletionResponse};
use llm_client::cost::estimate_cost;
use llm_client::provider::LLMProviderAPIKeys;
use llm_client::tokenizer::{estimate_response_tokens, estimate_tokens};

use crate::error::CoreError;
use crate::ports::UiPort;
use crate::store::CaptureStore;
use crate::usage::{UsageLedger, UsageRecord};

/// Calls estimated at or above this cost require an explicit human
/// confirmation before the Gateway dials out (spec §8 S5).
const DEFAULT_COST_GATE_THRESHOLD_USD: f64 = 0.05;

/// Which pipeline stage a completion call belongs to, matching
/// `LLMInteraction.kind` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    ActionDiscovery,
    IncrementalDiscovery,
    ActionCodeGen,
    TestGeneration,
    Other,
}

impl InteractionKind {
    fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::ActionDiscovery => "action_discovery",
            InteractionKind::IncrementalDiscovery => "incremental_discovery",
            InteractionKind::ActionCodeGen => "action_code_gen",
            InteractionKind::TestGeneration => "test_generation",
            InteractionKind::Other => "other",
        }
    }
}

/// Append-only, human-readable trail of every LLM call (spec §6 filesystem
/// layout: `.tod/api_calls.log`) — a plain-text companion to the structured
/// `llm_interactions` table and the JSONL usage ledger, meant to be `tail -f`'d
/// by a human rather than queried. Rotates once past
/// `logging::exceeds_size_cap`'s 10 MiB threshold, keeping a single `.1`
/// backup, matching the cap the logging crate already enforces for
/// `.tod/logs/*.log`.
struct ApiCallLog {
    path: PathBuf,
}

impl ApiCallLog {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, line: &str) {
        if logging::exceeds_size_cap(&self.path) {
            let rotated = PathBuf::from(format!("{}.1", self.path.display()));
            let _ = std::fs::rename(&self.path, rotated);
        }
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(file, "{line}");
        }
    }
}

pub struct LlmGateway {
    broker: LLMBroker,
    ledger: Arc<UsageLedger>,
    store: Arc<CaptureStore>,
    ui: Arc<dyn UiPort>,
    session_id: String,
    cost_gate_threshold_usd: f64,
    api_call_log: Option<ApiCallLog>,
}

impl LlmGateway {
    pub fn new(
        broker: LLMBroker,
        ledger: Arc<UsageLedger>,
        store: Arc<CaptureStore>,
        ui: Arc<dyn UiPort>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            ledger,
            store,
            ui,
            session_id: session_id.into(),
            cost_gate_threshold_usd: DEFAULT_COST_GATE_THRESHOLD_USD,
            api_call_log: None,
        }
    }

    pub fn with_cost_gate_threshold_usd(mut self, threshold: f64) -> Self {
        self.cost_gate_threshold_usd = threshold;
        self
    }

    /// Points this gateway at `.tod/api_calls.log` (or wherever the caller's
    /// configured data directory resolves it to). Left unset, no human log is
    /// written — the structured store and ledger records still are.
    pub fn with_api_call_log(mut self, path: impl AsRef<Path>) -> Self {
        self.api_call_log = Some(ApiCallLog::new(path.as_ref().to_path_buf()));
        self
    }

    /// Runs one completion through the cost gate, the broker, the usage
    /// ledger, and the Capture Store. Every call — success, decline, or
    /// transport failure — appends exactly one `LLMInteraction` row (spec
    /// §4.6 Post-flight); a declined gate still surfaces as
    /// `CoreError::LlmDeclined` so callers can distinguish "the user said
    /// no" from a transport failure (spec §7).
    pub async fn complete(
        &self,
        api_key: LLMProviderAPIKeys,
        request: LLMClientCompletionRequest,
        capture_id: Option<&str>,
        kind: InteractionKind,
    ) -> Result<LLMClientCompletionResponse, CoreError> {
        let model = request.model().clone();
        let provider = api_key.provider();
        let prompt = request.flattened_prompt();

        let prompt_tokens = estimate_tokens(&prompt);
        let response_tokens = estimate_response_tokens(prompt_tokens, request.max_tokens());
        let estimated_cost = estimate_cost(&model, prompt_tokens, response_tokens);

        if requires_confirmation(estimated_cost, self.cost_gate_threshold_usd) {
            let question = format!(
                "This call to {model} is estimated to cost ${estimated_cost:.3}. Continue?"
            );
            if !self.ui.confirm(&question).await {
                self.store
                    .save_interaction(
                        capture_id,
                        kind.as_str(),
                        &provider.to_string(),
                        model.wire_name(),
                        &prompt,
                        "",
                        0,
                        0,
                        0.0,
                        Some("declined by cost gate"),
                    )
                    .await?;
                self.log_call(kind, &provider.to_string(), model.wire_name(), 0, 0, 0.0, Some("declined by cost gate"));
                return Err(CoreError::LlmDeclined);
            }
        }

        let response = match self.broker.completion(api_key, request).await {
            Ok(response) => response,
            Err(err) => {
                self.store
                    .save_interaction(
                        capture_id,
                        kind.as_str(),
                        &provider.to_string(),
                        model.wire_name(),
                        &prompt,
                        "",
                        0,
                        0,
                        0.0,
                        Some(&err.to_string()),
                    )
                    .await?;
                self.log_call(kind, &provider.to_string(), model.wire_name(), 0, 0, 0.0, Some(&err.to_string()));
                return Err(CoreError::from(err));
            }
        };

        let actual_cost = estimate_cost(&model, response.input_tokens(), response.output_tokens());

        self.store
            .save_interaction(
                capture_id,
                kind.as_str(),
                &provider.to_string(),
                model.wire_name(),
                &prompt,
                response.text(),
                response.input_tokens() as i64,
                response.output_tokens() as i64,
                actual_cost,
                None,
            )
            .await?;

        self.log_call(
            kind,
            &provider.to_string(),
            model.wire_name(),
            response.input_tokens(),
            response.output_tokens(),
            actual_cost,
            None,
        );

        self.ledger.record(UsageRecord {
            timestamp: Utc::now(),
            session_id: self.session_id.clone(),
            provider: provider.to_string(),
            model: model.to_string(),
            input_tokens: response.input_tokens() as u32,
            output_tokens: response.output_tokens() as u32,
            cost_usd: actual_cost,
        })?;

        Ok(response)
    }

    fn log_call(
        &self,
        kind: InteractionKind,
        provider: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
        cost_usd: f64,
        error: Option<&str>,
    ) {
        let Some(log) = &self.api_call_log else { return };
        let status = match error {
            Some(_) if error == Some("declined by cost gate") => "declined",
            Some(_) => "failed",
            None => "success",
        };
        let mut line = format!(
            "{} session={} kind={} provider={} model={} status={} tokens_in={} tokens_out={} cost_usd={:.4}",
            Utc::now().to_rfc3339(),
            self.session_id,
            kind.as_str(),
            provider,
            model,
            status,
            input_tokens,
            output_tokens,
            cost_usd,
        );
        if let Some(err) = error {
            line.push_str(&format!(" error={err:?}"));
        }
        log.append(&line);
    }
}

fn requires_confirmation(estimated_cost_usd: f64, threshold_usd: f64) -> bool {
    estimated_cost_usd >= threshold_usd
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_client::clients::types::LLMClientMessage;
    use llm_client::provider::{LLMModel, OpenAIProvider};

    #[test]
    fn scenario_s5_threshold_is_inclusive() {
        let cost = estimate_cost(&LLMModel::Gpt4o, 10_000, 2_000);
        assert!((cost - 0.050).abs() < 1e-9);
        assert!(requires_confirmation(cost, DEFAULT_COST_GATE_THRESHOLD_USD));
    }

    #[test]
    fn p7_calls_below_threshold_never_gate() {
        let cost = estimate_cost(&LLMModel::Gpt4oMini, 1_000, 200);
        assert!(!requires_confirmation(cost, DEFAULT_COST_GATE_THRESHOLD_USD));
    }

    struct AlwaysDecline;

    #[async_trait::async_trait]
    impl UiPort for AlwaysDecline {
        async fn confirm(&self, _question: &str) -> bool {
            false
        }
        async fn prompt(&self, _label: &str, _suggestions: &[String]) -> String {
            String::new()
        }
        async fn select(&self, _label: &str, _options: &[String]) -> String {
            String::new()
        }
        async fn password(&self, _label: &str) -> String {
            String::new()
        }
        fn show(&self, _event: crate::ports::UiEvent) {}
    }

    #[tokio::test]
    async fn scenario_s5_declined_call_records_a_zero_cost_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CaptureStore::connect(&dir.path().join("store.db")).await.unwrap());
        let ledger = Arc::new(UsageLedger::load(dir.path().join("usage.jsonl")).unwrap());
        let broker = LLMBroker::new(Some("unused"));

        let gateway = LlmGateway::new(broker, ledger, store.clone(), Arc::new(AlwaysDecline), "session-1");

        let request = LLMClientCompletionRequest::new(
            LLMModel::Gpt4o,
            vec![LLMClientMessage::user("word ".repeat(60_000))],
            0.0,
        );
        let api_key = LLMProviderAPIKeys::OpenAI(OpenAIProvider { api_key: "sk-test".into() });

        let result = gateway
            .complete(api_key, request, Some("cap-1"), InteractionKind::ActionDiscovery)
            .await;

        assert!(matches!(result, Err(CoreError::LlmDeclined)));

        let interactions = store.list_interactions("cap-1").await.unwrap();
        assert_eq!(interactions.len(), 1);
        assert_eq!(interactions[0].cost_usd, 0.0);
        assert_eq!(interactions[0].error.as_deref(), Some("declined by cost gate"));
    }

    #[tokio::test]
    async fn declined_call_is_appended_to_the_human_readable_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CaptureStore::connect(&dir.path().join("store.db")).await.unwrap());
        let ledger = Arc::new(UsageLedger::load(dir.path().join("usage.jsonl")).unwrap());
        let broker = LLMBroker::new(Some("unused"));
        let log_path = dir.path().join("api_calls.log");

        let gateway = LlmGateway::new(broker, ledger, store, Arc::new(AlwaysDecline), "session-1")
            .with_api_call_log(&log_path);

        let request = LLMClientCompletionRequest::new(
            LLMModel::Gpt4o,
            vec![LLMClientMessage::user("word ".repeat(60_000))],
            0.0,
        );
        let api_key = LLMProviderAPIKeys::OpenAI(OpenAIProvider { api_key: "sk-test".into() });

        let _ = gateway
            .complete(api_key, request, Some("cap-1"), InteractionKind::ActionDiscovery)
            .await;

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("status=declined"));
        assert!(contents.contains("kind=action_discovery"));
    }
}
