//! CLI module for Switchboard
//!
//! Provides commands:
//! - `agents`: list the agent registry
//! - `route`: show how a request would be routed
//! - `ask`: run a request and stream the answer
//! - `config`: print the effective configuration

use crate::app;
use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod agents;
pub mod ask;
pub mod route;

/// Switchboard multi-agent orchestrator CLI
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "Routes requests to specialist agents and streams one answer back")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered agents
    Agents,
    /// Show the routing decision for a request
    Route {
        /// Request text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Run a request and stream the answer
    Ask {
        /// Request text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Conversation context shared with the agents
        #[arg(long)]
        context_id: Option<String>,
        /// Print the output channel as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let config = app::load_config()?;
    match command {
        Commands::Agents => agents::run(&config),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Route { text } => {
            let orchestrator = app::build_orchestrator(&config)?;
            route::run(&orchestrator, &text.join(" ")).await
        }
        Commands::Ask {
            text,
            context_id,
            json,
        } => {
            let orchestrator = app::build_orchestrator(&config)?;
            ask::run(&orchestrator, &text.join(" "), context_id, json).await
        }
    }
}
