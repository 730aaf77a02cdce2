//! Top-level error type.
//!
//! Each subsystem defines its own error enum next to its code, with miette
//! `#[diagnostic]` derives for error codes and help text. [`McrError`] wraps
//! them all transparently so the full diagnostic reaches the user.

use miette::Diagnostic;
use thiserror::Error;

use crate::agent::ReasoningError;
use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::ontology::OntologyError;
use crate::prolog::PrologError;
use crate::session::SessionError;
use crate::translate::TranslationError;

#[derive(Debug, Error, Diagnostic)]
pub enum McrError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Prolog(#[from] PrologError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

pub type McrResult<T> = std::result::Result<T, McrError>;
