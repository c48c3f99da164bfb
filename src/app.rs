//! Application wiring
//!
//! Loads configuration and builds the orchestrator the CLI commands share.

pub mod config;
pub mod loader;
pub mod providers;

use anyhow::{Context, Result};
use std::sync::Arc;
use switchboard_a2a::HttpA2aClient;
use switchboard_core::{AgentRegistry, Orchestrator};
use tracing::{debug, info};

pub use config::AppConfig;
pub use loader::load_config;

/// Build the orchestrator described by `config`
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let registry =
        AgentRegistry::new(config.agents.clone()).context("Invalid agent registry")?;
    info!(agents = registry.len(), "Agent registry loaded");

    let client = HttpA2aClient::new(config.executor.connect_timeout())
        .context("Failed to create agent client")?;

    let mut orchestrator = Orchestrator::new(registry, Arc::new(client), config.orchestrator());
    if let Some(model) = providers::resolve_language_model(&config.llm)? {
        orchestrator = orchestrator.with_model(model);
    }
    debug!(?orchestrator, "Orchestrator ready");
    Ok(orchestrator)
}
