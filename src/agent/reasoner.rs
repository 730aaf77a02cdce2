//! Strategies that choose the next reasoning step.

use async_trait::async_trait;

use super::action::AgentAction;
use super::error::{AgentResult, ReasoningError};
use crate::llm::{ChatMessage, LlmError, MeteredClient};
use crate::translate::prompt::ontology_hint;

/// What a strategy can see when choosing its next action.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningContext<'a> {
    pub task: &'a str,
    pub program: &'a [String],
    pub ontology_terms: &'a [String],
    pub previous_steps: &'a [String],
    /// Bindings from earlier queries, comma-joined.
    pub accumulated_bindings: &'a str,
    /// 1-based index of the step being chosen.
    pub step: usize,
    pub max_steps: usize,
    pub llm: Option<&'a MeteredClient>,
}

/// Picks the next [`AgentAction`].
#[async_trait]
pub trait ReasoningStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn next_action(&self, ctx: &ReasoningContext<'_>) -> AgentResult<AgentAction>;
}

/// Asks the language model for a JSON action.
///
/// Output that is not a decodable action is retried within the step, with the
/// decode error fed back, up to `format_attempts` times.
#[derive(Debug, Clone, Copy)]
pub struct LlmReasoner {
    pub format_attempts: usize,
}

impl Default for LlmReasoner {
    fn default() -> Self {
        Self { format_attempts: 2 }
    }
}

impl LlmReasoner {
    pub fn new(format_attempts: usize) -> Self {
        Self {
            format_attempts: format_attempts.max(1),
        }
    }

    pub fn prompt(ctx: &ReasoningContext<'_>, feedback: Option<&str>) -> String {
        let mut context = String::new();
        if !ctx.program.is_empty() {
            context.push_str(&format!(
                "\n\nCurrent Knowledge Base:\n{}",
                ctx.program.join("\n")
            ));
        }
        if !ctx.previous_steps.is_empty() {
            context.push_str(&format!(
                "\n\nPrevious Reasoning Steps:\n{}",
                ctx.previous_steps.join("\n")
            ));
        }
        if !ctx.accumulated_bindings.is_empty() {
            context.push_str(&format!(
                "\n\nAccumulated Bindings: {}",
                ctx.accumulated_bindings
            ));
        }
        context.push_str(&ontology_hint(ctx.ontology_terms));
        if let Some(f) = feedback {
            context.push_str(&format!("\n\nYour previous reply was rejected: {f}"));
        }

        format!(
            "You are an expert Prolog reasoner. Break the task down into discrete Prolog \
             queries or assertions, or reach a conclusion.\n\
             Reply with a JSON object with a \"type\" field (\"query\", \"assert\" or \
             \"conclude\") and a \"content\" field (a Prolog goal for query, a Prolog clause \
             for assert).{context}\n\n\
             Original Task: \"{task}\"\n\
             Step {step} of {max}.\n\n\
             Examples:\n\
             - To query: {{\"type\": \"query\", \"content\": \"can_fly(X)\"}}\n\
             - To assert: {{\"type\": \"assert\", \"content\": \"bird(tweety).\"}}\n\
             - To conclude: {{\"type\": \"conclude\", \"answer\": \"Yes, Tweety can fly.\", \
             \"explanation\": \"All canaries are birds and Tweety is a canary.\"}}\n\n\
             If you have enough information to answer the task, or a query result directly \
             answers it, use \"conclude\" with a concise answer and a brief explanation.\n\n\
             What is the next logical step?",
            task = ctx.task,
            step = ctx.step,
            max = ctx.max_steps,
        )
    }
}

#[async_trait]
impl ReasoningStrategy for LlmReasoner {
    fn name(&self) -> &str {
        "llm"
    }

    async fn next_action(&self, ctx: &ReasoningContext<'_>) -> AgentResult<AgentAction> {
        let llm = ctx.llm.ok_or(ReasoningError::Llm(LlmError::NotConfigured))?;
        let attempts = self.format_attempts.max(1);
        let mut feedback: Option<String> = None;
        let mut attempt = 1;

        loop {
            let request = llm
                .request(vec![ChatMessage::user(Self::prompt(ctx, feedback.as_deref()))])
                .json();
            let response = llm.chat(request).await?;
            match AgentAction::from_json(&response.content) {
                Ok(action) => return Ok(action),
                Err(e @ ReasoningError::MalformedOutput { .. }) if attempt < attempts => {
                    tracing::warn!(step = ctx.step, attempt, error = %e, "malformed reasoning output");
                    feedback = Some(malformed_feedback(&e));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Quote the rejected reply back so the model can see what to fix.
fn malformed_feedback(error: &ReasoningError) -> String {
    let mut text = format!("{error}.");
    if let ReasoningError::MalformedOutput {
        raw_output: Some(raw),
        ..
    } = error
    {
        text.push_str(&format!("\nYour reply was:\n{raw}\n"));
    }
    text.push_str("Reply with exactly one JSON object as in the examples.");
    text
}
