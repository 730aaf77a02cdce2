//! Reasoning-loop error types with rich miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use crate::llm::LlmError;

/// Errors that abort a reasoning run.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ReasoningError {
    #[error("reasoning strategy returned invalid action type: {kind}")]
    #[diagnostic(
        code(mcr::agent::invalid_action),
        help("The next action must be one of \"query\", \"assert\" or \"conclude\".")
    )]
    InvalidAction { kind: String },

    #[error("reasoning strategy produced malformed output: {message}")]
    #[diagnostic(
        code(mcr::agent::malformed_output),
        help("Expected a JSON object such as {{\"type\": \"query\", \"content\": \"bird(X)\"}}.")
    )]
    MalformedOutput {
        message: String,
        raw_output: Option<String>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),
}

pub type AgentResult<T> = std::result::Result<T, ReasoningError>;
