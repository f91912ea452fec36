use serde::Deserialize;
use std::path::Path;

use crate::catalog::ToolSpec;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Provider chain in fallback order; the first entry is primary.
    pub providers: Vec<ProviderEndpointConfig>,
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub context_window: ContextWindowConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Optional catalog override; empty means the built-in blockchain set.
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderEndpointConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    /// Log label; defaults to the kind's name.
    #[serde(default)]
    pub label: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompatible,
    GoogleGenai,
}

impl ProviderEndpointConfig {
    /// Fill in unset fields with per-kind defaults.
    pub fn apply_defaults(&mut self) {
        if self.label.is_empty() {
            self.label = match self.kind {
                ProviderKind::OpenaiCompatible => "openai_compatible".to_string(),
                ProviderKind::GoogleGenai => "google_genai".to_string(),
            };
        }
        if self.model.is_empty() {
            self.model = match self.kind {
                ProviderKind::OpenaiCompatible => "llama-3.3-70b-versatile".to_string(),
                ProviderKind::GoogleGenai => "gemini-2.0-flash".to_string(),
            };
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutorConfig {
    /// Base URL of the operation-execution service.
    pub base_url: String,
    #[serde(default = "default_executor_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_executor_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannerConfig {
    #[serde(default = "default_planning_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            temperature: default_planning_temperature(),
            chat_temperature: default_chat_temperature(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

fn default_planning_temperature() -> f32 {
    0.2
}
fn default_chat_temperature() -> f32 {
    0.7
}
fn default_attempt_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextWindowConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
        }
    }
}

fn default_token_budget() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl_seconds(),
        }
    }
}

fn default_session_ttl_seconds() -> u64 {
    7200
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        if config.providers.is_empty() {
            anyhow::bail!("config must declare at least one [[providers]] entry");
        }
        for provider in &mut config.providers {
            provider.apply_defaults();
        }
        Ok(config)
    }
}
