//! Language-model provider resolution

use super::config::{LlmConfig, LlmProvider};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use switchboard_llm::{LanguageModel, OpenAiCompatibleConfig, OpenAiCompatibleModel};
use tracing::{info, warn};

/// Build the configured model. A missing API key disables the model
/// instead of failing, so rule-based routing keeps working.
pub fn resolve_language_model(config: &LlmConfig) -> Result<Option<Arc<dyn LanguageModel>>> {
    match config.provider {
        LlmProvider::None => {
            info!("No language model configured, using rule-based routing only");
            Ok(None)
        }
        LlmProvider::OpenAi => {
            let provider_config = match OpenAiCompatibleConfig::from_env(&config.api_key_env) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "Language model disabled");
                    return Ok(None);
                }
            };
            let model = OpenAiCompatibleModel::new(
                provider_config
                    .with_base_url(&config.base_url)
                    .with_model(&config.model)
                    .with_timeout(Duration::from_secs(config.timeout_secs)),
            )
            .context("Failed to create language model")?;
            info!(model = %model.model(), base_url = %config.base_url, "Registered language model");
            Ok(Some(Arc::new(model)))
        }
    }
}
