//! Switchboard LLM - language-model capability
//!
//! The orchestrator treats the language model as a black box with a single
//! operation, `generate(prompt) -> text` (optionally streamed):
//! - Model: the [`LanguageModel`] trait
//! - OpenAI: OpenAI-compatible chat completions provider
//! - Scripted: deterministic model for tests and offline runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod model;
pub mod openai;
pub mod scripted;
pub mod util;

pub use error::{Error, Result};
#[cfg(any(test, feature = "mock"))]
pub use model::MockLanguageModel;
pub use model::{LanguageModel, TokenStream};
pub use openai::{OpenAiCompatibleConfig, OpenAiCompatibleModel};
pub use scripted::ScriptedModel;
