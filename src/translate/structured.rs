//! Structured translation: the model emits a JSON description of the clause,
//! which is rendered to Prolog here.
//!
//! ```json
//! {"type":"rule","head":{"predicate":"has_wings","args":["X"]},
//!  "body":[{"predicate":"bird","args":["X"]}]}
//! ```

use async_trait::async_trait;
use serde::Deserialize;

use super::prompt;
use super::{TranslationError, TranslationMode, TranslationRequest, TranslationResult, TranslationStrategy};
use crate::llm::{ChatMessage, LlmError, extract_json_object};

pub const NAME: &str = "structured";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClauseKind {
    Fact,
    Rule,
    Query,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StructuredAtom {
    pub predicate: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl StructuredAtom {
    fn render(&self) -> String {
        if self.args.is_empty() {
            return self.predicate.trim().to_string();
        }
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| match a {
                serde_json::Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect();
        format!("{}({})", self.predicate.trim(), args.join(", "))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StructuredClause {
    #[serde(rename = "type")]
    pub kind: ClauseKind,
    pub head: StructuredAtom,
    #[serde(default)]
    pub body: Vec<StructuredAtom>,
}

impl StructuredClause {
    /// Render as Prolog text. In query mode the result is always a goal.
    pub fn to_prolog(&self, mode: TranslationMode) -> TranslationResult<String> {
        let head = self.head.render();
        if mode == TranslationMode::Query {
            return Ok(head);
        }
        match self.kind {
            ClauseKind::Fact => Ok(format!("{head}.")),
            ClauseKind::Query => Ok(head),
            ClauseKind::Rule if self.body.is_empty() => Err(TranslationError::strategy(
                NAME,
                "structured rule has an empty body",
            )),
            ClauseKind::Rule => {
                let body: Vec<String> = self.body.iter().map(StructuredAtom::render).collect();
                Ok(format!("{head} :- {}.", body.join(", ")))
            }
        }
    }
}

/// Decode model output into a [`StructuredClause`].
pub fn parse_structured(content: &str) -> TranslationResult<StructuredClause> {
    let json = extract_json_object(content).unwrap_or(content);
    serde_json::from_str(json).map_err(|e| {
        TranslationError::Llm(LlmError::ParseError {
            message: format!("invalid structured clause: {e}"),
            raw_output: Some(content.to_string()),
        })
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredStrategy;

impl StructuredStrategy {
    pub fn messages(request: &TranslationRequest<'_>) -> Vec<ChatMessage> {
        let system = format!(
            "Translate the input into a JSON description of {}\n\
             Output ONLY valid JSON with:\n\
             - \"type\" (\"fact\", \"rule\" or \"query\")\n\
             - \"head\" with \"predicate\" and an \"args\" array\n\
             - \"body\" (rules only): array of objects with \"predicate\" and \"args\"\n\n\
             Examples:\n\
             {{\"type\":\"fact\",\"head\":{{\"predicate\":\"bird\",\"args\":[\"tweety\"]}}}}\n\
             {{\"type\":\"rule\",\"head\":{{\"predicate\":\"has_wings\",\"args\":[\"X\"]}},\
             \"body\":[{{\"predicate\":\"bird\",\"args\":[\"X\"]}}]}}\n\
             {{\"type\":\"query\",\"head\":{{\"predicate\":\"bird\",\"args\":[\"X\"]}}}}{}",
            prompt::target(request.mode),
            prompt::ontology_hint(request.ontology_terms),
        );
        let user = format!(
            "Input: {}{}\nOutput:",
            request.text,
            prompt::feedback_hint(request.feedback)
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

#[async_trait]
impl TranslationStrategy for StructuredStrategy {
    fn name(&self) -> &str {
        NAME
    }

    async fn translate(&self, request: &TranslationRequest<'_>) -> TranslationResult<String> {
        let llm = request.require_llm()?;
        let response = llm
            .chat(llm.request(Self::messages(request)).json())
            .await?;
        parse_structured(&response.content)?.to_prolog(request.mode)
    }
}
