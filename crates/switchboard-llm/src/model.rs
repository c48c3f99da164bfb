//! Language-model capability
//!
//! The orchestrator only ever needs `generate(prompt) -> text`, optionally
//! streamed token-wise. Routing classification and answer synthesis are the
//! two callers.

use crate::error::Result;
use futures::stream::{self, BoxStream, StreamExt};

/// Stream of generated text chunks
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Text generation capability.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a complete answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate an answer as a stream of chunks.
    ///
    /// Providers without native streaming yield the whole answer as one chunk.
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(futures::future::ready(Ok(text))).boxed())
    }
}
