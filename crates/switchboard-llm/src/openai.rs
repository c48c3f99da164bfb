//! OpenAI-compatible chat completions provider
//!
//! Works with any endpoint exposing `/chat/completions` (OpenAI, Groq,
//! OpenRouter, a local Ollama, ...).

use crate::error::{Error, Result};
use crate::model::{LanguageModel, TokenStream};
use crate::util::{mask_api_key, sanitize_api_error};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default base URL
pub const BASE_URL: &str = "https://api.openai.com/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

// ============================================================================
// Configuration
// ============================================================================

/// Provider configuration
#[derive(Clone)]
pub struct OpenAiCompatibleConfig {
    /// API key
    pub api_key: String,
    /// Base URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl fmt::Debug for OpenAiCompatibleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiCompatibleConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            temperature: Some(0.2),
        }
    }

    /// Create from the named API-key environment variable
    pub fn from_env(api_key_var: &str) -> Result<Self> {
        let api_key = std::env::var(api_key_var)
            .map_err(|_| Error::NotConfigured(format!("{api_key_var} not set")))?;
        Ok(Self::new(api_key))
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// OpenAI-compatible language model
pub struct OpenAiCompatibleModel {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleModel {
    /// Create a new provider
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::NotConfigured(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Configured model name
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            stream,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimit);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(Error::Api(sanitize_api_error(&message)));
        }
        Ok(response)
    }
}

fn parse_chunk_line(line: &str) -> Option<Result<String>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<ChatChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(Ok),
        Err(e) => Some(Err(Error::InvalidResponse(e.to_string()))),
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    #[instrument(skip(self, prompt), fields(model = %self.config.model))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Sending completion request");
        let response: ChatResponse = self
            .send(prompt, false)
            .await?
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::InvalidResponse("No choices in response".to_string()))
    }

    #[instrument(skip(self, prompt), fields(model = %self.config.model))]
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        let response = self.send(prompt, true).await?;
        let body = response.bytes_stream().boxed();
        let state = (body, String::new(), VecDeque::<Result<String>>::new(), false);

        let tokens = stream::unfold(state, |(mut body, mut buf, mut ready, mut done)| async move {
            loop {
                if let Some(item) = ready.pop_front() {
                    return Some((item, (body, buf, ready, done)));
                }
                if done {
                    return None;
                }
                match body.next().await {
                    Some(Ok(bytes)) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buf.find('\n') {
                            let line: String = buf.drain(..=pos).collect();
                            if let Some(item) = parse_chunk_line(&line) {
                                ready.push_back(item);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        ready.push_back(Err(Error::Network(e.to_string())));
                        done = true;
                    }
                    None => {
                        if let Some(item) = parse_chunk_line(&buf) {
                            ready.push_back(item);
                        }
                        buf.clear();
                        done = true;
                    }
                }
            }
        });

        Ok(tokens.boxed())
    }
}
