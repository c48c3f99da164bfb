//! `switchboard agents`

use crate::app::AppConfig;
use anyhow::Result;

pub fn run(config: &AppConfig) -> Result<()> {
    if config.agents.is_empty() {
        println!("🤷 No agents registered. Add [[agents]] entries to config/local.toml.");
        return Ok(());
    }

    println!("🤖 {} agent(s)\n", config.agents.len());
    for agent in &config.agents {
        println!("  {}  {}", agent.name, agent.endpoint);
        if !agent.description.is_empty() {
            println!("      {}", agent.description);
        }
        if !agent.declared_skills.is_empty() {
            println!("      skills: {}", agent.declared_skills.join(", "));
        }
        if !agent.supports_streaming {
            println!("      (non-streaming)");
        }
    }
    Ok(())
}
