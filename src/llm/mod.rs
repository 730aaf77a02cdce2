//! Language-model chat clients.
//!
//! The rest of the crate sees a model only through [`ChatClient`]: role-tagged
//! messages in, generated text plus token usage out. Calls are always routed
//! through a [`MeteredClient`], which records usage into every attached sink
//! whether or not the call succeeded.

pub mod ollama;
pub mod openai;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::metrics::TokenUsage;
use crate::metrics::UsageSink;
pub use ollama::{OllamaClient, OllamaConfig};
pub use openai::{OpenAiClient, OpenAiConfig};

/// Errors from the LLM subsystem.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum LlmError {
    #[error("language model is not available at {url}")]
    #[diagnostic(
        code(mcr::llm::unavailable),
        help("Start the model server (e.g. `ollama serve`) or point `llm.base_url` elsewhere.")
    )]
    Unavailable { url: String },

    #[error("language model request failed: {message}")]
    #[diagnostic(
        code(mcr::llm::request_failed),
        help("Check that the server is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse model response: {message}")]
    #[diagnostic(
        code(mcr::llm::parse_error),
        help("The model returned an unexpected response format.")
    )]
    ParseError {
        message: String,
        /// Text the model actually produced, if any.
        raw_output: Option<String>,
    },

    #[error("language model request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(mcr::llm::timeout),
        help("Increase `llm.timeout_secs` or use a smaller model.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("no language model configured")]
    #[diagnostic(
        code(mcr::llm::not_configured),
        help("Natural-language operations need a model; configure `[llm]` or use the symbolic operations.")
    )]
    NotConfigured,
}

impl LlmError {
    /// Raw model output attached to the error, for feedback construction.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::ParseError { raw_output, .. } => raw_output.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn from_transport(err: ureq::Error, url: &str, timeout_secs: u64) -> Self {
        match err {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                Self::RequestFailed {
                    message: format!("server returned status {code}: {body}"),
                }
            }
            ureq::Error::Transport(t) => {
                let message = t.to_string();
                if message.contains("timed out") {
                    Self::Timeout { timeout_secs }
                } else if t.kind() == ureq::ErrorKind::ConnectionFailed {
                    Self::Unavailable { url: url.into() }
                } else {
                    Self::RequestFailed { message }
                }
            }
        }
    }
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message for multi-turn conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Ask the model for a single valid JSON value.
    pub json_mode: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.0,
            json_mode: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Generated text plus usage.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

/// A [`ChatClient`] that records every call into its usage sinks.
#[derive(Clone)]
pub struct MeteredClient {
    inner: Arc<dyn ChatClient>,
    sinks: Vec<Arc<dyn UsageSink>>,
    temperature: f32,
}

impl MeteredClient {
    pub fn new(inner: Arc<dyn ChatClient>) -> Self {
        Self {
            inner,
            sinks: Vec::new(),
            temperature: 0.0,
        }
    }

    /// Attach another accumulator (session or process scope).
    pub fn with_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Default sampling temperature for requests built with [`Self::request`].
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Start a request at this client's configured temperature.
    pub fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest::new(messages).temperature(self.temperature)
    }

    pub fn model(&self) -> &str {
        self.inner.model()
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let result = self.inner.chat(request).await;
        let elapsed = start.elapsed();
        let usage = result.as_ref().ok().and_then(|r| r.usage.as_ref());
        for sink in &self.sinks {
            sink.record(usage, elapsed);
        }
        match &result {
            Ok(resp) => tracing::debug!(
                model = self.model(),
                latency_ms = elapsed.as_millis() as u64,
                chars = resp.content.len(),
                "llm call"
            ),
            Err(e) => tracing::warn!(model = self.model(), error = %e, "llm call failed"),
        }
        result
    }
}

impl std::fmt::Debug for MeteredClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteredClient")
            .field("model", &self.model())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Run blocking HTTP on tokio's blocking pool.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, LlmError>
where
    F: FnOnce() -> Result<T, LlmError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LlmError::RequestFailed {
            message: format!("worker task failed: {e}"),
        })?
}

/// Pull the first JSON object out of model output that may be wrapped in
/// prose or a code fence.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
