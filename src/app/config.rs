//! Application configuration types

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use switchboard_core::{
    AgentDescriptor, DriverConfig, ExecutorConfig, OrchestratorConfig, RouterConfig,
    SynthesizerConfig,
};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub synthesizer: SynthesizerConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    /// Static agent registry, in registration order
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,
}

impl AppConfig {
    /// Orchestration settings
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            router: self.router.clone(),
            executor: self.executor.clone(),
            synthesizer: self.synthesizer.clone(),
            driver: self.driver.clone(),
        }
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

/// Language-model provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// No model: rule-based routing and deterministic composition
    #[default]
    None,
    /// Any OpenAI-compatible chat completions endpoint
    OpenAi,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    switchboard_llm::openai::BASE_URL.to_string()
}

fn default_model() -> String {
    switchboard_llm::openai::DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agents_table_deserializes() {
        let raw = r#"
            [llm]
            provider = "openai"
            model = "llama3.2"

            [executor]
            call_timeout_ms = 5000

            [[agents]]
            name = "github"
            endpoint = "http://localhost:9001/"
            skills = ["pull requests"]
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.executor.call_timeout_ms, 5000);
        assert_eq!(config.executor.cancel_grace_ms, 2000);
        assert_eq!(config.agents[0].declared_skills, vec!["pull requests"]);
        assert!(config.agents[0].supports_streaming);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = AppConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.orchestrator(), config.orchestrator());
    }
}
