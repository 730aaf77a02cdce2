//! OpenAI-compatible `/v1/chat/completions` client.
//!
//! Works against any server speaking the same protocol (OpenAI, Groq,
//! vLLM, llama.cpp server, ...).

use std::time::Duration;

use async_trait::async_trait;

use super::{ChatClient, ChatRequest, ChatResponse, LlmError, TokenUsage, run_blocking};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL up to and including the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self { config }
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": request.messages,
            "temperature": request.temperature,
        });
        if request.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

fn parse_response(json: &serde_json::Value) -> Result<ChatResponse, LlmError> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::ParseError {
            message: "missing 'choices[0].message.content' field".into(),
            raw_output: Some(json.to_string()),
        })?
        .to_string();
    let usage = json.get("usage").map(|u| TokenUsage {
        prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
        total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
    });
    Ok(ChatResponse { content, usage })
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let timeout_secs = self.config.timeout_secs;
        let auth = format!("Bearer {}", self.config.api_key);
        let body = self.body(&request);
        tracing::debug!(model = %self.config.model, messages = request.messages.len(), "openai chat");

        run_blocking(move || {
            let agent = ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(timeout_secs))
                .build();
            let resp = agent
                .post(&url)
                .set("Authorization", &auth)
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
    fn json_mode_sets_response_format() {
        let client = OpenAiClient::new(OpenAiConfig::default());
        let body = client.body(&ChatRequest::new(vec![ChatMessage::user("x")]).json());
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn parses_choice_and_usage() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "bird(X)" } }],
            "usage": { "prompt_tokens": 20, "completion_tokens": 3, "total_tokens": 23 }
        });
        let resp = parse_response(&json).unwrap();
        assert_eq!(resp.content, "bird(X)");
        assert_eq!(resp.usage.unwrap().total_tokens, 23);
    }

    #[test]
    fn empty_choices_is_parse_error() {
        let json = serde_json::json!({ "choices": [] });
        assert!(matches!(
            parse_response(&json),
            Err(LlmError::ParseError { .. })
        ));
    }
}
