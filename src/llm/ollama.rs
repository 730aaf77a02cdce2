//! Ollama `/api/chat` client.

use std::time::Duration;

use async_trait::async_trait;

use super::{ChatClient, ChatRequest, ChatResponse, LlmError, TokenUsage, run_blocking};

/// Configuration for the Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model name to use.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

/// Client for the Ollama REST API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        Self { config }
    }

    /// Check that the server answers `/api/tags`.
    pub fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();
        matches!(agent.get(&url).call(), Ok(resp) if resp.status() == 200)
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": request.messages,
            "stream": false,
            "options": { "temperature": request.temperature },
        });
        if request.json_mode {
            body["format"] = serde_json::Value::String("json".into());
        }
        body
    }
}

/// Decode a non-streaming `/api/chat` response body.
fn parse_response(json: &serde_json::Value) -> Result<ChatResponse, LlmError> {
    let content = json["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::ParseError {
            message: "missing 'message.content' field".into(),
            raw_output: Some(json.to_string()),
        })?
        .to_string();
    let usage = match (
        json["prompt_eval_count"].as_u64(),
        json["eval_count"].as_u64(),
    ) {
        (None, None) => None,
        (p, c) => Some(TokenUsage::new(p.unwrap_or(0), c.unwrap_or(0))),
    };
    Ok(ChatResponse { content, usage })
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/api/chat", self.config.base_url);
        let timeout_secs = self.config.timeout_secs;
        let body = self.body(&request);
        tracing::debug!(model = %self.config.model, messages = request.messages.len(), "ollama chat");

        run_blocking(move || {
            let agent = ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(timeout_secs))
                .build();
            let resp = agent
                .post(&url)
                .send_json(body)
                .map_err(|e| LlmError::from_transport(e, &url, timeout_secs))?;
            let json: serde_json::Value = resp.into_json().map_err(|e| LlmError::ParseError {
                message: e.to_string(),
                raw_output: None,
            })?;
            parse_response(&json)
        })
        .await
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    #[test]
    fn default_config_values() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn request_body_sets_json_format() {
        let client = OllamaClient::new(OllamaConfig::default());
        let req = ChatRequest::new(vec![ChatMessage::user("hi")]).json();
        let body = client.body(&req);
        assert_eq!(body["format"], "json");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stream"], false);

        let plain = client.body(&ChatRequest::new(vec![]));
        assert!(plain.get("format").is_none());
    }

    #[test]
    fn parses_content_and_usage() {
        let json = serde_json::json!({
            "message": { "role": "assistant", "content": "bird(tweety)." },
            "prompt_eval_count": 12,
            "eval_count": 4,
        });
        let resp = parse_response(&json).unwrap();
        assert_eq!(resp.content, "bird(tweety).");
        assert_eq!(resp.usage, Some(TokenUsage::new(12, 4)));
    }

    #[test]
    fn missing_content_is_parse_error() {
        let json = serde_json::json!({ "error": "model not found" });
        let err = parse_response(&json).unwrap_err();
        assert!(matches!(err, LlmError::ParseError { .. }));
        assert!(err.raw_output().unwrap().contains("model not found"));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let client = OllamaClient::new(OllamaConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout_secs: 2,
            ..Default::default()
        });
        assert!(!client.probe());
        let result = client
            .chat(ChatRequest::new(vec![ChatMessage::user("hello")]))
            .await;
        assert!(result.is_err());
    }
}
