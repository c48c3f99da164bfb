//! `switchboard route`

use anyhow::Result;
use switchboard_core::{Orchestrator, UserFriendlyError};

pub async fn run(orchestrator: &Orchestrator, text: &str) -> Result<()> {
    let decision = match orchestrator.route(text).await {
        Ok(decision) => decision,
        Err(e) => {
            eprintln!("{}", e.user_message());
            if let Some(hint) = e.suggestion() {
                eprintln!("💡 {hint}");
            }
            anyhow::bail!(e);
        }
    };

    println!("🧭 {}", decision.kind);
    println!("   agents: {}", decision.agent_names().join(", "));
    println!("   basis:  {:?}", decision.basis);
    println!("   why:    {}", decision.rationale);
    Ok(())
}
