//! The typed `Configuration` record from spec §3/§6. Loading it from
//! `.tod/config.yaml` is an out-of-scope external collaborator's job (spec
//! §1); this module only defines the shape (`serde` for the on-disk format)
//! and the pure environment-override step. The file read itself lives
//! outside this crate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_provider() -> String {
    "openai".to_owned()
}

fn default_model() -> String {
    "gpt-4o-mini".to_owned()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> usize {
    1024
}

fn default_framework() -> String {
    "playwright".to_owned()
}

fn default_language() -> String {
    "ts".to_owned()
}

fn default_test_dir() -> PathBuf {
    "tests/e2e".into()
}

fn default_debug_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_debug_port() -> u16 {
    9222
}

fn default_poll_interval_s() -> u64 {
    15
}

fn default_lookback_minutes() -> i64 {
    10
}

fn default_log_dir() -> PathBuf {
    ".tod/logs".into()
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_db_path() -> PathBuf {
    ".tod/captures.db".into()
}

fn default_captures_dir() -> PathBuf {
    ".tod/captures".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            endpoint: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestingConfig {
    #[serde(default = "default_framework")]
    pub framework: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_test_dir")]
    pub test_dir: PathBuf,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    /// The framework's own version pin (e.g. a Playwright or Cypress major),
    /// independent of `framework`'s name — spec §6 overrides it separately
    /// via `TOD_TESTING_VERSION`.
    #[serde(default)]
    pub version: Option<String>,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            framework: default_framework(),
            language: default_language(),
            test_dir: default_test_dir(),
            command: None,
            pattern: None,
            version: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_debug_host")]
    pub debug_host: String,
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,
    #[serde(default)]
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debug_host: default_debug_host(),
            debug_port: default_debug_port(),
            headless: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_poll_interval_s")]
    pub poll_interval_s: u64,
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_captures_dir")]
    pub captures_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            captures_dir: default_captures_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub testing: TestingConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub mail: Option<MailConfig>,
    #[serde(default)]
    pub current_env: Option<String>,
    #[serde(default)]
    pub environments: std::collections::HashMap<String, EnvironmentConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Configuration {
    /// The `current_env`'s `base_url`, if both are set.
    pub fn base_url(&self) -> Option<&str> {
        let env = self.current_env.as_deref()?;
        self.environments.get(env).map(|e| e.base_url.as_str())
    }

    /// Applies the §6 environment-variable override table on top of
    /// whatever was loaded from the config file. Pure function of
    /// `(Self, env lookup)` so it's testable without touching real env vars.
    pub fn apply_env_overrides<F>(&mut self, get_env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = get_env("TOD_AI_PROVIDER") {
            self.ai.provider = provider;
        }
        if let Some(model) = get_env("TOD_AI_MODEL") {
            self.ai.model = model;
        }
        if let Some(endpoint) = get_env("TOD_AI_ENDPOINT") {
            self.ai.endpoint = Some(endpoint);
        }
        if let Some(framework) = get_env("TOD_TESTING_FRAMEWORK") {
            self.testing.framework = framework;
        }
        if let Some(version) = get_env("TOD_TESTING_VERSION") {
            self.testing.version = Some(version);
        }
        if let Some(test_dir) = get_env("TOD_TESTING_TEST_DIR") {
            self.testing.test_dir = PathBuf::from(test_dir);
        }
        if let Some(current_env) = get_env("TOD_CURRENT_ENV") {
            self.current_env = Some(current_env);
        }

        let api_key = get_env("TOD_AI_API_KEY").or_else(|| {
            if self.ai.provider == "openai" {
                get_env("OPENAI_API_KEY")
            } else {
                None
            }
        });
        if let Some(api_key) = api_key {
            self.ai.api_key = Some(api_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_map(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn tod_ai_api_key_overrides_any_provider() {
        let mut config = Configuration::default();
        config.ai.provider = "anthropic".to_owned();
        config.apply_env_overrides(env_map(&[("TOD_AI_API_KEY", "sk-explicit")]));
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-explicit"));
    }

    #[test]
    fn openai_api_key_only_applies_when_provider_is_openai() {
        let mut config = Configuration::default();
        config.ai.provider = "anthropic".to_owned();
        config.apply_env_overrides(env_map(&[("OPENAI_API_KEY", "sk-openai")]));
        assert_eq!(config.ai.api_key, None);

        let mut config = Configuration::default();
        config.apply_env_overrides(env_map(&[("OPENAI_API_KEY", "sk-openai")]));
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-openai"));
    }

    #[test]
    fn base_url_resolves_through_current_env() {
        let mut config = Configuration::default();
        config.current_env = Some("staging".to_owned());
        config.environments.insert(
            "staging".to_owned(),
            EnvironmentConfig {
                base_url: "https://staging.example.com".to_owned(),
            },
        );
        assert_eq!(config.base_url(), Some("https://staging.example.com"));
    }

    #[test]
    fn no_current_env_means_no_base_url() {
        let config = Configuration::default();
        assert_eq!(config.base_url(), None);
    }
}
