//! The three moves a reasoning strategy can make.

use serde::{Deserialize, Serialize};

use super::error::ReasoningError;
use crate::llm::extract_json_object;

/// Next step chosen by a [`ReasoningStrategy`](super::ReasoningStrategy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AgentAction {
    /// Run a goal against the knowledge base. A `terminal` query ends the run
    /// with whatever answer its bindings support.
    Query {
        content: String,
        #[serde(default)]
        terminal: bool,
    },
    /// Add a clause to the knowledge base.
    Assert { content: String },
    /// Stop with a natural-language answer.
    Conclude {
        answer: String,
        #[serde(default)]
        explanation: Option<String>,
    },
}

/// Loose wire shape: models mix up `content` and `answer`.
#[derive(Debug, Deserialize)]
struct WireAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    terminal: bool,
}

impl AgentAction {
    pub fn query(content: impl Into<String>) -> Self {
        Self::Query {
            content: content.into(),
            terminal: false,
        }
    }

    pub fn assert(content: impl Into<String>) -> Self {
        Self::Assert {
            content: content.into(),
        }
    }

    pub fn conclude(answer: impl Into<String>) -> Self {
        Self::Conclude {
            answer: answer.into(),
            explanation: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Assert { .. } => "assert",
            Self::Conclude { .. } => "conclude",
        }
    }

    /// Decode a model's JSON answer.
    ///
    /// Unparseable text is [`ReasoningError::MalformedOutput`] (retryable);
    /// a well-formed object with an unknown `type` is
    /// [`ReasoningError::InvalidAction`] (fatal).
    pub fn from_json(text: &str) -> Result<Self, ReasoningError> {
        let json = extract_json_object(text).unwrap_or(text);
        let wire: WireAction =
            serde_json::from_str(json).map_err(|e| ReasoningError::MalformedOutput {
                message: e.to_string(),
                raw_output: Some(text.to_string()),
            })?;

        let missing = |field: &str| ReasoningError::MalformedOutput {
            message: format!("\"{}\" action is missing \"{field}\"", wire.kind),
            raw_output: Some(text.to_string()),
        };

        match wire.kind.as_str() {
            "query" => Ok(Self::Query {
                content: wire.content.clone().ok_or_else(|| missing("content"))?,
                terminal: wire.terminal,
            }),
            "assert" => Ok(Self::Assert {
                content: wire.content.clone().ok_or_else(|| missing("content"))?,
            }),
            "conclude" => Ok(Self::Conclude {
                answer: wire
                    .answer
                    .clone()
                    .or_else(|| wire.content.clone())
                    .ok_or_else(|| missing("answer"))?,
                explanation: wire.explanation.clone(),
            }),
            other => Err(ReasoningError::InvalidAction {
                kind: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_kind() {
        assert_eq!(
            AgentAction::from_json(r#"{"type": "query", "content": "can_fly(X)."}"#).unwrap(),
            AgentAction::query("can_fly(X).")
        );
        assert_eq!(
            AgentAction::from_json(r#"{"type": "assert", "content": "bird(tweety)."}"#).unwrap(),
            AgentAction::assert("bird(tweety).")
        );
        let conclude = AgentAction::from_json(
            r#"{"type": "conclude", "answer": "Yes.", "explanation": "Tweety is a canary."}"#,
        )
        .unwrap();
        assert_eq!(
            conclude,
            AgentAction::Conclude {
                answer: "Yes.".into(),
                explanation: Some("Tweety is a canary.".into()),
            }
        );
    }

    #[test]
    fn conclude_accepts_content_as_answer() {
        let a = AgentAction::from_json(r#"{"type": "conclude", "content": "No."}"#).unwrap();
        assert_eq!(a, AgentAction::conclude("No."));
    }

    #[test]
    fn unknown_type_is_invalid_action() {
        assert!(matches!(
            AgentAction::from_json(r#"{"type": "dance", "content": "x"}"#),
            Err(ReasoningError::InvalidAction { ref kind }) if kind == "dance"
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            AgentAction::from_json("I think we should query bird(X)"),
            Err(ReasoningError::MalformedOutput { .. })
        ));
        assert!(matches!(
            AgentAction::from_json(r#"{"type": "query"}"#),
            Err(ReasoningError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn terminal_flag() {
        let a = AgentAction::from_json(r#"{"type":"query","content":"done","terminal":true}"#)
            .unwrap();
        assert!(matches!(a, AgentAction::Query { terminal: true, .. }));
        assert_eq!(a.kind(), "query");
    }
}
