//! Switchboard Core - multi-agent orchestration
//!
//! This crate turns one user request into work for remote specialist
//! agents and one answer:
//! - Router: DIRECT, PARALLEL or COMPLEX routing decisions
//! - Plan: visible todo lists for multi-agent work
//! - Executor: concurrent fan-out / fan-in of streaming agent calls
//! - Driver: step-by-step execution of complex requests
//! - Synthesizer: one final result from every agent's outcome
//! - Orchestrator: the facade tying them together

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod registry;
pub mod router;
pub mod synthesizer;
pub mod types;
pub mod utils;

pub use driver::{DriverConfig, PlannedStep, StepwiseDriver};
pub use error::{AgentFailure, Error, OrchestrationError, Result, UserFriendlyError};
pub use executor::{
    AgentRunState, Executor, ExecutorConfig, OutputEnvelope, OutputEvent, OutputReceiver,
    OutputSink, Origin, PlanBinding, RunScope, RunStatus,
};
pub use orchestrator::{
    OrchestrationHandle, OrchestrationReport, Orchestrator, OrchestratorConfig,
};
pub use plan::{PlanId, PlanTracker, PlanView, TodoDraft, TodoItem, TodoStatus};
pub use registry::{AgentDescriptor, AgentRegistry};
pub use router::{Router, RouterConfig, TieBreak};
pub use synthesizer::{AttributionStyle, OrchestrationResult, Synthesizer, SynthesizerConfig};
pub use types::{CallerContext, Request, RoutingBasis, RoutingDecision, RoutingKind};
pub use utils::{RetryError, RetryPolicy};
