//! C7 — Test Generator. Groups discovered actions into a named flow and
//! produces a runnable E2E test file in the configured framework (plus,
//! optionally, setup/config scaffolding), the last stop before a human
//! reviews generated code (spec §4.5).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use llm_client::clients::types::{LLMClientCompletionRequest, LLMClientMessage};
use llm_client::provider::{LLMModel, LLMProviderAPIKeys};

use crate::discovery::{ActionKind, DiscoveredAction};
use crate::llm_gateway::{InteractionKind, LlmGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    Playwright,
    Cypress,
    Generic,
}

impl Framework {
    pub fn from_config_str(value: &str) -> Self {
        match value {
            "playwright" => Framework::Playwright,
            "cypress" => Framework::Cypress,
            _ => Framework::Generic,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Framework::Playwright => "playwright",
            Framework::Cypress => "cypress",
            Framework::Generic => "generic",
        }
    }

    /// The framework's conventional config file name, if it has one (spec
    /// §4.5 step 5: "Config file is emitted only if the framework declares
    /// a config filename").
    fn config_file_name(&self) -> Option<&'static str> {
        match self {
            Framework::Playwright => Some("playwright.config.ts"),
            Framework::Cypress => Some("cypress.config.js"),
            Framework::Generic => None,
        }
    }
}

/// Narrated (`adventure`), plain (`standard`), or bare (`minimal`) step
/// comments (spec §4.5 ambient addition, SPEC_FULL §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStyle {
    Adventure,
    Standard,
    Minimal,
}

impl TestStyle {
    pub fn from_config_str(value: &str) -> Self {
        match value {
            "adventure" => TestStyle::Adventure,
            "minimal" => TestStyle::Minimal,
            _ => TestStyle::Standard,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub framework: Framework,
    pub language: String,
    pub actions: Vec<DiscoveredAction>,
    pub flow_name: String,
    pub output_dir: PathBuf,
    pub test_style: TestStyle,
    pub include_setup: bool,
    /// Whether generated tests should include an auth/magic-link bootstrap
    /// step ahead of the flow's first action. Resolved from whether the
    /// session that discovered the actions went through the Mail Watcher
    /// (spec §4.5 Open Question — see DESIGN.md).
    pub include_auth: bool,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub framework: &'static str,
    pub file_name: String,
    pub path: PathBuf,
    pub source: String,
    pub action_ids: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub main_test: GeneratedFile,
    pub setup_file: Option<GeneratedFile>,
    pub config_file: Option<GeneratedFile>,
}

/// Lowercases, replaces runs of non-alphanumeric characters with a single
/// dash, and trims leading/trailing dashes, so "Sign-up Flow!" becomes
/// "sign-up-flow".
pub fn dashify(name: &str) -> String {
    let mut out = String::new();
    let mut last_was_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

fn extension_for(language: &str) -> &str {
    match language {
        "ts" => "ts",
        "js" => "js",
        "py" | "python" => "py",
        other => other,
    }
}

/// Main entry point: template-based generation, always available with no
/// network round trip. The LLM-authored variant (`generate_via_llm`) wraps
/// this as its fallback when the model call errors or is declined by the
/// cost gate (spec §4.5 step 2).
pub fn generate(options: &GenerationOptions) -> GenerationResult {
    let extension = extension_for(&options.language);
    let file_name = format!("{}.spec.{extension}", dashify(&options.flow_name));
    let path = options.output_dir.join(&file_name);
    let action_ids: Vec<String> = options.actions.iter().map(|a| a.id.clone()).collect();
    let generated_at = Utc::now();

    let source = match options.framework {
        Framework::Playwright => playwright_source(options),
        Framework::Cypress => cypress_source(options),
        Framework::Generic => generic_source(options),
    };

    let main_test = GeneratedFile {
        framework: options.framework.name(),
        file_name,
        path,
        source,
        action_ids,
        generated_at,
    };

    // Setup/config failures are logged and omitted, never fatal to the
    // whole generation (spec §4.5 "Error semantics"); since these builders
    // are pure and total here, "failure" only ever means "not applicable".
    let setup_file = options.include_setup.then(|| setup_file(options, generated_at)).flatten();
    let config_file = config_file(options, generated_at);

    GenerationResult {
        main_test,
        setup_file,
        config_file,
    }
}

/// Builds the generation prompt (spec §4.5 step 1): framework, style, and
/// one line per action naming its description, synthesized input (if any),
/// expected success, and the selector/JS that implements it.
pub fn build_generation_prompt(options: &GenerationOptions) -> String {
    let mut steps = String::new();
    for (i, action) in options.actions.iter().enumerate() {
        steps.push_str(&format!(
            "{}. {} (expects success; implementation: {} via `{}`{})\n",
            i + 1,
            action.description,
            action.action_kind.as_str(),
            action.selector,
            action
                .user_input
                .as_deref()
                .map(|v| format!(", input={v:?}"))
                .unwrap_or_default(),
        ));
    }

    format!(
        "Write a {framework} E2E test in {style:?} style for the flow \"{flow}\".\n\
         Base URL: {base_url}\n\
         Steps:\n{steps}\n\
         Return only the complete test file source, no explanation.",
        framework = options.framework.name(),
        style = options.test_style,
        flow = options.flow_name,
        base_url = options.base_url.as_deref().unwrap_or("(none)"),
    )
}

/// LLM-authored generation (spec §4.5 steps 1-2): asks the model to write
/// the whole test file, falling back to the deterministic template when the
/// gateway call is declined by the cost gate or fails outright — generation
/// must always produce a file, never merely propagate the LLM error.
pub async fn generate_via_llm(
    gateway: &LlmGateway,
    api_key: LLMProviderAPIKeys,
    model: LLMModel,
    options: &GenerationOptions,
) -> GenerationResult {
    let template = generate(options);

    if options.actions.is_empty() {
        return template;
    }

    let prompt = build_generation_prompt(options);
    let request = LLMClientCompletionRequest::new(model, vec![LLMClientMessage::user(prompt)], 0.2);

    match gateway
        .complete(api_key, request, None, InteractionKind::TestGeneration)
        .await
    {
        Ok(response) => {
            let GenerationResult { main_test, setup_file, config_file } = template;
            GenerationResult {
                main_test: GeneratedFile { source: response.text().to_string(), ..main_test },
                setup_file,
                config_file,
            }
        }
        Err(_) => template,
    }
}

fn step_comment(style: TestStyle, index: usize, action: &DiscoveredAction, indent: &str) -> String {
    match style {
        TestStyle::Adventure => format!("{indent}// Step {}: {}\n", index + 1, action.description),
        TestStyle::Standard => format!("{indent}// {}\n", action.description),
        TestStyle::Minimal => String::new(),
    }
}

fn auth_preamble(options: &GenerationOptions, indent: &str) -> String {
    if !options.include_auth {
        return String::new();
    }
    format!("{indent}// TODO: complete magic-link authentication before continuing\n")
}

fn playwright_source(options: &GenerationOptions) -> String {
    let goto = options
        .base_url
        .as_deref()
        .map(|url| format!("  await page.goto('{url}');\n"))
        .unwrap_or_default();
    let auth = auth_preamble(options, "  ");

    let mut body = String::new();
    for (i, action) in options.actions.iter().enumerate() {
        body.push_str(&step_comment(options.test_style, i, action, "  "));
        body.push_str(&playwright_step(action));
        body.push('\n');
    }

    format!(
        "import {{ test, expect }} from '@playwright/test';\n\n\
         test('{name}', async ({{ page }}) => {{\n{goto}{auth}{body}}});\n",
        name = options.flow_name.replace('\'', "\\'"),
    )
}

fn playwright_step(action: &DiscoveredAction) -> String {
    let selector = &action.selector;
    match action.action_kind {
        ActionKind::Navigate => format!(
            "  await page.goto('{href}');\n  await expect(page).toHaveTitle(/.+/);",
            href = action.selector_or_href(),
        ),
        ActionKind::Type => format!(
            "  await page.fill('{selector}', '{value}');\n  await page.click('button[type=submit]');",
            value = action.user_input.as_deref().unwrap_or(""),
        ),
        ActionKind::Select => format!(
            "  await page.selectOption('{selector}', '{value}');",
            value = action.user_input.as_deref().unwrap_or(""),
        ),
        ActionKind::Click => format!("  await page.click('{selector}');"),
        ActionKind::Pending => format!("  // TODO: action not yet synthesized: {}", action.description),
    }
}

fn cypress_source(options: &GenerationOptions) -> String {
    let visit = options
        .base_url
        .as_deref()
        .map(|url| format!("    cy.visit('{url}');\n"))
        .unwrap_or_default();
    let auth = auth_preamble(options, "    ");

    let mut body = String::new();
    for (i, action) in options.actions.iter().enumerate() {
        body.push_str(&step_comment(options.test_style, i, action, "    "));
        body.push_str(&cypress_step(action));
        body.push('\n');
    }

    format!(
        "describe('{name}', () => {{\n  it('works', () => {{\n{visit}{auth}{body}  }});\n}});\n",
        name = options.flow_name.replace('\'', "\\'"),
    )
}

fn cypress_step(action: &DiscoveredAction) -> String {
    let selector = &action.selector;
    match action.action_kind {
        ActionKind::Navigate => format!("    cy.visit('{href}');", href = action.selector_or_href()),
        ActionKind::Type => format!(
            "    cy.get('{selector}').type('{value}');\n    cy.get('button[type=submit]').click();",
            value = action.user_input.as_deref().unwrap_or(""),
        ),
        ActionKind::Select => format!(
            "    cy.get('{selector}').select('{value}');",
            value = action.user_input.as_deref().unwrap_or(""),
        ),
        ActionKind::Click => format!("    cy.get('{selector}').click();"),
        ActionKind::Pending => format!("    // TODO: action not yet synthesized: {}", action.description),
    }
}

fn generic_source(options: &GenerationOptions) -> String {
    let auth = auth_preamble(options, "");
    let mut body = String::new();
    for (i, action) in options.actions.iter().enumerate() {
        body.push_str(&step_comment(options.test_style, i, action, ""));
        body.push_str(&format!(
            "// TODO: {kind:?} {selector}\n",
            kind = action.action_kind,
            selector = action.selector,
        ));
    }
    format!("// flow: {}\n{auth}{body}", options.flow_name)
}

fn setup_file(options: &GenerationOptions, generated_at: DateTime<Utc>) -> Option<GeneratedFile> {
    let (file_name, source): (&str, String) = match options.framework {
        Framework::Playwright => (
            "global-setup.ts",
            "import type { FullConfig } from '@playwright/test';\n\n\
             async function globalSetup(_config: FullConfig) {\n  \
             // perform shared login / seed steps once before the suite runs\n}\n\n\
             export default globalSetup;\n"
                .to_string(),
        ),
        Framework::Cypress => (
            "support/e2e.js",
            "// shared Cypress support file: seed auth/session state here\n".to_string(),
        ),
        Framework::Generic => return None,
    };
    Some(GeneratedFile {
        framework: options.framework.name(),
        file_name: file_name.to_string(),
        path: options.output_dir.join(file_name),
        source,
        action_ids: Vec::new(),
        generated_at,
    })
}

fn config_file(options: &GenerationOptions, generated_at: DateTime<Utc>) -> Option<GeneratedFile> {
    let file_name = options.framework.config_file_name()?;
    let source = match options.framework {
        Framework::Playwright => {
            "import { defineConfig } from '@playwright/test';\n\n\
             export default defineConfig({\n  testDir: './tests/e2e',\n});\n"
                .to_string()
        }
        Framework::Cypress => {
            "const { defineConfig } = require('cypress');\n\n\
             module.exports = defineConfig({\n  e2e: {},\n});\n"
                .to_string()
        }
        Framework::Generic => return None,
    };
    Some(GeneratedFile {
        framework: options.framework.name(),
        file_name: file_name.to_string(),
        path: output_dir_parent(&options.output_dir).join(file_name),
        source,
        action_ids: Vec::new(),
        generated_at,
    })
}

/// Config files conventionally live at the project root, one level above
/// the test directory, not inside it.
fn output_dir_parent(output_dir: &Path) -> PathBuf {
    output_dir.parent().map(Path::to_path_buf).unwrap_or_else(|| output_dir.to_path_buf())
}

impl DiscoveredAction {
    /// The URL a `navigate` action's JavaScript/selector points at, when
    /// known; falls back to the bare selector for templates that just need
    /// something to put in the generated call.
    fn selector_or_href(&self) -> &str {
        if self.selector.is_empty() {
            &self.description
        } else {
            &self.selector
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Priority;

    fn click_action() -> DiscoveredAction {
        let mut a = DiscoveredAction::pending("cap1", "Click login button".into(), Priority::High);
        a.selector = "#login".into();
        a.action_kind = ActionKind::Click;
        a
    }

    fn type_action() -> DiscoveredAction {
        let mut a = DiscoveredAction::pending("cap1", "Enter email address".into(), Priority::Medium);
        a.selector = "#email".into();
        a.action_kind = ActionKind::Type;
        a.user_input = Some("person@example.com".into());
        a
    }

    fn options(framework: Framework, actions: Vec<DiscoveredAction>) -> GenerationOptions {
        GenerationOptions {
            framework,
            language: "ts".into(),
            actions,
            flow_name: "Sign in flow".into(),
            output_dir: PathBuf::from("tests/e2e"),
            test_style: TestStyle::Standard,
            include_setup: false,
            include_auth: false,
            base_url: Some("https://example.com".into()),
        }
    }

    #[test]
    fn dashify_normalizes_names() {
        assert_eq!(dashify("Sign in Flow!"), "sign-in-flow");
        assert_eq!(dashify("  leading  "), "leading");
    }

    #[test]
    fn playwright_file_name_and_steps() {
        let opts = options(Framework::Playwright, vec![click_action(), type_action()]);
        let result = generate(&opts);
        assert_eq!(result.main_test.file_name, "sign-in-flow.spec.ts");
        assert!(result.main_test.source.contains("await page.click('#login');"));
        assert!(result.main_test.source.contains("await page.fill('#email', 'person@example.com');"));
        assert!(result.main_test.source.contains("@playwright/test"));
        assert_eq!(result.main_test.action_ids.len(), 2);
    }

    #[test]
    fn cypress_uses_cy_get_and_honors_auth_flag() {
        let mut opts = options(Framework::Cypress, vec![click_action()]);
        opts.include_auth = true;
        opts.include_setup = true;
        let result = generate(&opts);
        assert!(result.main_test.source.contains("cy.get('#login').click();"));
        assert!(result.main_test.source.contains("TODO: complete magic-link"));
        assert!(result.setup_file.is_some());
    }

    #[test]
    fn generic_framework_has_no_config_file() {
        let opts = options(Framework::Generic, vec![click_action()]);
        let result = generate(&opts);
        assert!(result.config_file.is_none());
    }

    #[test]
    fn playwright_config_file_lives_one_level_above_test_dir() {
        let opts = options(Framework::Playwright, vec![click_action()]);
        let result = generate(&opts);
        let config = result.config_file.expect("playwright declares a config file");
        assert_eq!(config.file_name, "playwright.config.ts");
        assert_eq!(config.path, PathBuf::from("tests/playwright.config.ts"));
    }

    #[test]
    fn adventure_style_numbers_steps() {
        let mut opts = options(Framework::Playwright, vec![click_action(), type_action()]);
        opts.test_style = TestStyle::Adventure;
        let result = generate(&opts);
        assert!(result.main_test.source.contains("// Step 1: Click login button"));
        assert!(result.main_test.source.contains("// Step 2: Enter email address"));
    }

    #[test]
    fn minimal_style_omits_comments() {
        let mut opts = options(Framework::Playwright, vec![click_action()]);
        opts.test_style = TestStyle::Minimal;
        let result = generate(&opts);
        assert!(!result.main_test.source.contains("//"));
    }

    #[test]
    fn pending_action_emits_todo_placeholder() {
        let action = DiscoveredAction::pending("cap1", "Unsynthesized action".into(), Priority::Low);
        let opts = options(Framework::Playwright, vec![action]);
        let result = generate(&opts);
        assert!(result.main_test.source.contains("TODO: action not yet synthesized"));
    }

    #[test]
    fn generation_prompt_lists_every_action_and_its_input() {
        let opts = options(Framework::Playwright, vec![click_action(), type_action()]);
        let prompt = build_generation_prompt(&opts);
        assert!(prompt.contains("Click login button"));
        assert!(prompt.contains("input=\"person@example.com\""));
        assert!(prompt.contains("Sign in flow"));
    }

    struct AlwaysDecline;

    #[async_trait::async_trait]
    impl crate::ports::UiPort for AlwaysDecline {
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
    async fn generate_via_llm_falls_back_to_the_template_on_a_declined_call() {
        use llm_client::broker::LLMBroker;
        use llm_client::provider::OpenAIProvider;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::store::CaptureStore::connect(&dir.path().join("store.db")).await.unwrap());
        let ledger = Arc::new(crate::usage::UsageLedger::load(dir.path().join("usage.jsonl")).unwrap());
        let broker = LLMBroker::new(Some("unused"));
        let gateway = LlmGateway::new(broker, ledger, store, Arc::new(AlwaysDecline), "session-1");

        let opts = options(Framework::Playwright, vec![click_action(), type_action()]);
        let template = generate(&opts);
        let api_key = LLMProviderAPIKeys::OpenAI(OpenAIProvider { api_key: "sk-test".into() });

        let result = generate_via_llm(&gateway, api_key, LLMModel::Gpt4o, &opts).await;
        assert_eq!(result.main_test.source, template.main_test.source);
    }

    #[tokio::test]
    async fn generate_via_llm_skips_the_gateway_entirely_for_an_empty_flow() {
        use llm_client::broker::LLMBroker;
        use llm_client::provider::OpenAIProvider;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::store::CaptureStore::connect(&dir.path().join("store.db")).await.unwrap());
        let ledger = Arc::new(crate::usage::UsageLedger::load(dir.path().join("usage.jsonl")).unwrap());
        let broker = LLMBroker::new(Some("unused"));
        let gateway = LlmGateway::new(broker, ledger, store.clone(), Arc::new(AlwaysDecline), "session-1");

        let opts = options(Framework::Playwright, vec![]);
        let api_key = LLMProviderAPIKeys::OpenAI(OpenAIProvider { api_key: "sk-test".into() });
        let _ = generate_via_llm(&gateway, api_key, LLMModel::Gpt4o, &opts).await;

        // no actions means no prompt is ever sent, so no interaction row is recorded
        assert!(store.list_interactions("cap1").await.unwrap().is_empty());
    }
}
