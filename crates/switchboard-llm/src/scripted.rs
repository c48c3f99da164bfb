//! Scripted language model for tests and offline runs
//!
//! Returns queued answers in order, then a fixed fallback answer.
//! Every prompt is recorded so tests can assert what was asked.

use crate::error::{Error, Result};
use crate::model::{LanguageModel, TokenStream};
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A language model that replays queued answers.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    answers: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    /// Create a model with no queued answers; it fails once the queue is empty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with `text` whenever the queue is empty.
    #[must_use]
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Queue an answer.
    #[must_use]
    pub fn answer(self, text: impl Into<String>) -> Self {
        self.lock_answers().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.lock_answers().push_back(Err(Error::Api(message.into())));
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock_answers(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String>>> {
        self.answers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_answer(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        match self.lock_answers().pop_front() {
            Some(answer) => answer,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| Error::NotConfigured("scripted model has no answer left".into())),
        }
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.next_answer(prompt)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        let answer = self.next_answer(prompt)?;
        let words: Vec<Result<String>> = answer
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(stream::iter(words).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answers_in_order_then_fallback() {
        let model = ScriptedModel::new()
            .answer("first")
            .fail("overloaded")
            .with_fallback("default");

        assert_eq!(model.generate("a").await.unwrap(), "first");
        assert!(model.generate("b").await.is_err());
        assert_eq!(model.generate("c").await.unwrap(), "default");
        assert_eq!(model.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stream_reassembles_answer() {
        let model = ScriptedModel::new().answer("one two three");
        let chunks: Vec<String> = model
            .generate_stream("p")
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), "one two three");
    }

    #[tokio::test]
    async fn test_empty_queue_without_fallback_fails() {
        let model = ScriptedModel::new();
        tokio_test::assert_err!(model.generate("x").await);
    }
}
