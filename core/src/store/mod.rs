//! C9 — Capture Store. SQLite-backed persistence for every capture,
//! discovered action, LLM interaction, and generated test file, grounded on
//! the teacher's sqlx-over-SQLite runtime (`Idleness76-Weavegraph`'s
//! `checkpointer_sqlite.rs`): a typed pool wrapper, `CREATE TABLE IF NOT
//! EXISTS` schema applied at startup rather than a compiled migrations
//! directory, and one method per logical write/read the rest of the system
//! needs.

pub mod model;

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::discovery::DiscoveredAction;
use crate::error::CoreError;

use model::{DiscoveredActionRow, LlmInteraction, PageCapture, Statistics, TestGeneration};

pub struct CaptureStore {
    pool: SqlitePool,
}

/// What a saved page capture points at on disk (spec §6: HTML bodies live
/// under `.tod/captures/`, never inline in the database row).
pub struct NewCapture<'a> {
    pub url: &'a str,
    pub title: &'a str,
    pub html_file: &'a str,
    pub html_length: i64,
    pub debug_port: i64,
    pub ws_target_url: &'a str,
}

impl CaptureStore {
    pub async fn connect(db_path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), CoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS page_captures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                html_file TEXT NOT NULL,
                html_length INTEGER NOT NULL,
                captured_at TEXT NOT NULL,
                debug_port INTEGER NOT NULL,
                ws_target_url TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS discovered_actions (
                id TEXT PRIMARY KEY,
                capture_id TEXT NOT NULL REFERENCES page_captures(id) ON DELETE CASCADE,
                description TEXT NOT NULL,
                selector TEXT NOT NULL,
                action_kind TEXT NOT NULL,
                javascript TEXT NOT NULL,
                is_tested INTEGER NOT NULL DEFAULT 0,
                priority TEXT NOT NULL,
                created_at TEXT NOT NULL,
                user_input TEXT
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS llm_interactions (
                id TEXT PRIMARY KEY,
                capture_id TEXT REFERENCES page_captures(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS test_generations (
                id TEXT PRIMARY KEY,
                capture_id TEXT NOT NULL REFERENCES page_captures(id) ON DELETE CASCADE,
                action_ids TEXT NOT NULL,
                framework TEXT NOT NULL,
                file_path TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_test_generations_capture ON test_generations(capture_id);")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_captures_url ON page_captures(url);")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_captures_captured_at ON page_captures(captured_at DESC);")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_discovered_actions_capture_tested ON discovered_actions(capture_id, is_tested);",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_llm_interactions_capture ON llm_interactions(capture_id);")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_llm_interactions_kind ON llm_interactions(kind);")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn save_capture(&self, new_capture: NewCapture<'_>) -> Result<PageCapture, CoreError> {
        let captured_at = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO page_captures
             (url, title, html_file, html_length, captured_at, debug_port, ws_target_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING id",
        )
        .bind(new_capture.url)
        .bind(new_capture.title)
        .bind(new_capture.html_file)
        .bind(new_capture.html_length)
        .bind(captured_at)
        .bind(new_capture.debug_port)
        .bind(new_capture.ws_target_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(PageCapture {
            id,
            url: new_capture.url.to_owned(),
            title: new_capture.title.to_owned(),
            html_file: new_capture.html_file.to_owned(),
            html_length: new_capture.html_length,
            captured_at,
            debug_port: new_capture.debug_port,
            ws_target_url: new_capture.ws_target_url.to_owned(),
        })
    }

    /// Inserts every action in one transaction: either the whole batch
    /// lands or none of it does, so a partially-discovered page never shows
    /// up as partially persisted.
    pub async fn save_actions(&self, actions: &[DiscoveredAction]) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;
        for action in actions {
            sqlx::query(
                "INSERT INTO discovered_actions
                 (id, capture_id, description, selector, action_kind, javascript, is_tested, priority, created_at, user_input)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .bind(&action.id)
            .bind(&action.capture_id)
            .bind(&action.description)
            .bind(&action.selector)
            .bind(action.action_kind.as_str())
            .bind(&action.javascript)
            .bind(action.is_tested)
            .bind(action.priority.as_str())
            .bind(action.created_at)
            .bind(&action.user_input)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn save_interaction(
        &self,
        capture_id: Option<&str>,
        kind: &str,
        provider: &str,
        model: &str,
        prompt: &str,
        response: &str,
        input_tokens: i64,
        output_tokens: i64,
        cost_usd: f64,
        error: Option<&str>,
    ) -> Result<LlmInteraction, CoreError> {
        let interaction = LlmInteraction {
            id: Uuid::new_v4().to_string(),
            capture_id: capture_id.map(str::to_owned),
            kind: kind.to_owned(),
            provider: provider.to_owned(),
            model: model.to_owned(),
            prompt: prompt.to_owned(),
            response: response.to_owned(),
            input_tokens,
            output_tokens,
            cost_usd,
            error: error.map(str::to_owned),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO llm_interactions
             (id, capture_id, kind, provider, model, prompt, response, input_tokens, output_tokens, cost_usd, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&interaction.id)
        .bind(&interaction.capture_id)
        .bind(&interaction.kind)
        .bind(&interaction.provider)
        .bind(&interaction.model)
        .bind(&interaction.prompt)
        .bind(&interaction.response)
        .bind(interaction.input_tokens)
        .bind(interaction.output_tokens)
        .bind(interaction.cost_usd)
        .bind(&interaction.error)
        .bind(interaction.created_at)
        .execute(&self.pool)
        .await?;

        Ok(interaction)
    }

    pub async fn save_generation(
        &self,
        capture_id: &str,
        action_ids: &[String],
        framework: &str,
        file_path: &str,
        source: &str,
    ) -> Result<TestGeneration, CoreError> {
        let generation = TestGeneration {
            id: Uuid::new_v4().to_string(),
            capture_id: capture_id.to_owned(),
            action_ids: TestGeneration::encode_action_ids(action_ids),
            framework: framework.to_owned(),
            file_path: file_path.to_owned(),
            source: source.to_owned(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO test_generations (id, capture_id, action_ids, framework, file_path, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&generation.id)
        .bind(&generation.capture_id)
        .bind(&generation.action_ids)
        .bind(&generation.framework)
        .bind(&generation.file_path)
        .bind(&generation.source)
        .bind(generation.created_at)
        .execute(&self.pool)
        .await?;

        Ok(generation)
    }

    pub async fn list_generations(&self, capture_id: &str) -> Result<Vec<TestGeneration>, CoreError> {
        let generations = sqlx::query_as::<_, TestGeneration>(
            "SELECT * FROM test_generations WHERE capture_id = ?1 ORDER BY created_at ASC",
        )
        .bind(capture_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(generations)
    }

    pub async fn get_capture(&self, id: i64) -> Result<Option<PageCapture>, CoreError> {
        let capture = sqlx::query_as::<_, PageCapture>("SELECT * FROM page_captures WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(capture)
    }

    pub async fn list_recent_captures(&self, limit: i64) -> Result<Vec<PageCapture>, CoreError> {
        let captures = sqlx::query_as::<_, PageCapture>(
            "SELECT * FROM page_captures ORDER BY captured_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(captures)
    }

    /// Highest priority first (high, medium, low), ties broken by
    /// insertion order via `id` (spec R1, scenario S6).
    pub async fn list_actions(&self, capture_id: &str) -> Result<Vec<DiscoveredActionRow>, CoreError> {
        let actions = sqlx::query_as::<_, DiscoveredActionRow>(
            "SELECT * FROM discovered_actions WHERE capture_id = ?1
             ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END ASC, id ASC",
        )
        .bind(capture_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(actions)
    }

    pub async fn list_interactions(&self, capture_id: &str) -> Result<Vec<LlmInteraction>, CoreError> {
        let interactions = sqlx::query_as::<_, LlmInteraction>(
            "SELECT * FROM llm_interactions WHERE capture_id = ?1 ORDER BY created_at ASC",
        )
        .bind(capture_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(interactions)
    }

    /// Deletes a capture and, by foreign-key cascade, every action,
    /// interaction, and generated test file row rooted on it (spec P8).
    pub async fn delete_capture(&self, id: i64) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM page_captures WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn statistics(&self) -> Result<Statistics, CoreError> {
        let total_captures: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM page_captures")
            .fetch_one(&self.pool)
            .await?;
        let total_actions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discovered_actions")
            .fetch_one(&self.pool)
            .await?;
        let untested_actions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM discovered_actions WHERE is_tested = 0")
                .fetch_one(&self.pool)
                .await?;
        let llm_interactions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM llm_interactions")
            .fetch_one(&self.pool)
            .await?;
        let total_generations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM test_generations")
            .fetch_one(&self.pool)
            .await?;
        let last_capture_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(captured_at) FROM page_captures")
                .fetch_one(&self.pool)
                .await?;

        Ok(Statistics {
            total_captures,
            total_actions,
            untested_actions,
            total_generations,
            llm_interactions,
            last_capture_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{ActionKind, Priority};

    async fn in_memory_store() -> CaptureStore {
        // A single connection: SQLite's `:memory:` database is private to
        // the connection that created it, so a pool of more than one would
        // silently hand different connections empty, unrelated databases.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(":memory:").foreign_keys(true))
            .await
            .unwrap();
        let store = CaptureStore { pool };
        store.migrate().await.unwrap();
        store
    }

    fn sample_capture() -> NewCapture<'static> {
        NewCapture {
            url: "https://x",
            title: "X",
            html_file: ".tod/captures/1.html",
            html_length: 42,
            debug_port: 9222,
            ws_target_url: "ws://127.0.0.1:9222/devtools/page/1",
        }
    }

    fn sample_action(capture_id: &str, selector: &str, priority: Priority) -> DiscoveredAction {
        let mut action = DiscoveredAction::pending(capture_id, "Click login".into(), priority);
        action.selector = selector.to_owned();
        action.action_kind = ActionKind::Click;
        action
    }

    #[tokio::test]
    async fn r1_capture_and_actions_round_trip() {
        let store = in_memory_store().await;
        let capture = store.save_capture(sample_capture()).await.unwrap();
        let capture_id = capture.id.to_string();
        store
            .save_actions(&[sample_action(&capture_id, "#login", Priority::Medium)])
            .await
            .unwrap();

        let fetched = store.get_capture(capture.id).await.unwrap().unwrap();
        assert_eq!(fetched.url, "https://x");

        let actions = store.list_actions(&capture_id).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].selector, "#login");
    }

    #[tokio::test]
    async fn scenario_s6_actions_list_high_first_then_insertion_order() {
        let store = in_memory_store().await;
        let capture = store.save_capture(sample_capture()).await.unwrap();
        let capture_id = capture.id.to_string();

        store
            .save_actions(&[
                sample_action(&capture_id, "#low", Priority::Low),
                sample_action(&capture_id, "#high", Priority::High),
                sample_action(&capture_id, "#medium", Priority::Medium),
            ])
            .await
            .unwrap();

        let actions = store.list_actions(&capture_id).await.unwrap();
        assert_eq!(
            actions.iter().map(|a| a.selector.as_str()).collect::<Vec<_>>(),
            vec!["#high", "#medium", "#low"]
        );
    }

    #[tokio::test]
    async fn p8_deleting_capture_cascades_to_actions() {
        let store = in_memory_store().await;
        let capture = store.save_capture(sample_capture()).await.unwrap();
        let capture_id = capture.id.to_string();
        store
            .save_actions(&[sample_action(&capture_id, "#login", Priority::Medium)])
            .await
            .unwrap();

        store.delete_capture(capture.id).await.unwrap();

        assert!(store.get_capture(capture.id).await.unwrap().is_none());
        assert!(store.list_actions(&capture_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn p8_deleting_capture_cascades_to_interactions_and_generations() {
        let store = in_memory_store().await;
        let capture = store.save_capture(sample_capture()).await.unwrap();
        let capture_id = capture.id.to_string();

        store
            .save_interaction(
                Some(&capture_id),
                "action_discovery",
                "openai",
                "gpt-4o",
                "p",
                "r",
                10,
                5,
                0.01,
                None,
            )
            .await
            .unwrap();
        store
            .save_generation(
                &capture_id,
                &["a1".to_string()],
                "playwright",
                "tests/e2e/flow.spec.ts",
                "// test",
            )
            .await
            .unwrap();

        store.delete_capture(capture.id).await.unwrap();

        assert!(store.list_interactions(&capture_id).await.unwrap().is_empty());
        assert!(store.list_generations(&capture_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn statistics_reflect_stored_rows() {
        let store = in_memory_store().await;
        let capture = store.save_capture(sample_capture()).await.unwrap();
        let capture_id = capture.id.to_string();
        store
            .save_actions(&[sample_action(&capture_id, "#login", Priority::Medium)])
            .await
            .unwrap();
        store
            .save_interaction(
                Some(&capture_id),
                "action_discovery",
                "openai",
                "gpt-4o",
                "p",
                "r",
                10,
                5,
                0.01,
                None,
            )
            .await
            .unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_captures, 1);
        assert_eq!(stats.total_actions, 1);
        assert_eq!(stats.untested_actions, 1);
        assert_eq!(stats.last_capture_at, Some(capture.captured_at));
    }
}
