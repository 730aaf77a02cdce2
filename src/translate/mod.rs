//! Natural language → Prolog translation.
//!
//! A [`TranslationStrategy`] makes one attempt at producing clause or query
//! text. [`translate_with_retry`] drives an ordered list of strategies through
//! a bounded retry loop: each failed attempt (an error, or output that does not
//! parse) becomes feedback for the next attempt of the same strategy. Moving to
//! the next strategy starts with no feedback.

pub mod direct;
pub mod prompt;
pub mod registry;
pub mod structured;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use miette::Diagnostic;
use thiserror::Error;

use crate::llm::{LlmError, MeteredClient};
use crate::prolog::SymbolicEngine;
use crate::syntax;

pub use direct::DirectStrategy;
pub use registry::{StrategyRegistry, StrategySelection};
pub use structured::StructuredStrategy;

/// Errors from the translation subsystem.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum TranslationError {
    /// A strategy failed; displays only the strategy's own message.
    #[error("{message}")]
    #[diagnostic(code(mcr::translate::strategy))]
    Strategy { strategy: String, message: String },

    #[error("strategy '{strategy}' produced invalid Prolog: {output:?}")]
    #[diagnostic(
        code(mcr::translate::invalid_syntax),
        help("Facts and rules end with a period; queries do not.")
    )]
    InvalidSyntax { strategy: String, output: String },

    #[error("unknown translation strategy '{name}' (available: {available})")]
    #[diagnostic(
        code(mcr::translate::unknown_strategy),
        help("Register the strategy on the root handle before selecting it.")
    )]
    UnknownStrategy { name: String, available: String },

    #[error("invalid strategy registration '{name}': {reason}")]
    #[diagnostic(
        code(mcr::translate::invalid_registration),
        help("Strategy names are lowercase identifiers such as `few_shot` or `my-strategy`.")
    )]
    InvalidRegistration { name: String, reason: String },

    #[error("nothing to translate: input is empty")]
    #[diagnostic(code(mcr::translate::empty_input))]
    EmptyInput,

    #[error("no translation strategies selected")]
    #[diagnostic(code(mcr::translate::no_strategies))]
    NoStrategies,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),
}

impl TranslationError {
    /// Convenience constructor for strategy-level failures.
    pub fn strategy(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Llm(e) => e.raw_output(),
            _ => None,
        }
    }
}

pub type TranslationResult<T> = std::result::Result<T, TranslationError>;

/// What the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationMode {
    /// A fact or rule, terminated.
    Clause,
    /// A goal, unterminated.
    Query,
}

/// Everything a strategy sees for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct TranslationRequest<'a> {
    pub text: &'a str,
    pub ontology_terms: &'a [String],
    /// Why the previous attempt of this strategy was rejected.
    pub feedback: Option<&'a str>,
    pub mode: TranslationMode,
    pub llm: Option<&'a MeteredClient>,
}

impl<'a> TranslationRequest<'a> {
    pub fn new(text: &'a str, mode: TranslationMode) -> Self {
        Self {
            text,
            ontology_terms: &[],
            feedback: None,
            mode,
            llm: None,
        }
    }

    pub fn with_terms(mut self, ontology_terms: &'a [String]) -> Self {
        self.ontology_terms = ontology_terms;
        self
    }

    pub fn with_llm(mut self, llm: Option<&'a MeteredClient>) -> Self {
        self.llm = llm;
        self
    }

    /// The model, or [`LlmError::NotConfigured`].
    pub fn require_llm(&self) -> TranslationResult<&'a MeteredClient> {
        self.llm.ok_or(TranslationError::Llm(LlmError::NotConfigured))
    }
}

/// One way of turning natural language into Prolog text.
#[async_trait]
pub trait TranslationStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Make a single attempt. Retries are the orchestrator's job.
    async fn translate(&self, request: &TranslationRequest<'_>) -> TranslationResult<String>;
}

type TranslateFn =
    dyn Fn(&TranslationRequest<'_>) -> BoxFuture<'static, TranslationResult<String>> + Send + Sync;

/// A strategy backed by a caller-supplied closure.
pub struct FnStrategy {
    name: String,
    f: Box<TranslateFn>,
}

impl FnStrategy {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TranslationRequest<'_>) -> BoxFuture<'static, TranslationResult<String>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

#[async_trait]
impl TranslationStrategy for FnStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(&self, request: &TranslationRequest<'_>) -> TranslationResult<String> {
        (self.f)(request).await
    }
}

impl std::fmt::Debug for FnStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStrategy").field("name", &self.name).finish()
    }
}

/// Attempt budget per strategy and pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// A successful translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub output: String,
    pub strategy: String,
    /// Attempts spent on the winning strategy.
    pub attempts: usize,
}

/// Feedback after a strategy error.
pub fn error_feedback(error: &TranslationError) -> String {
    let mut feedback = format!(
        "Previous attempt failed with error: {error}. Please correct the output and try again."
    );
    if let Some(raw) = error.raw_output() {
        feedback.push_str(&format!(" Your previous output was: {raw}"));
    }
    feedback
}

/// Feedback after output that failed the syntax check.
pub fn syntax_feedback(output: &str) -> String {
    format!(
        "Your previous output {output:?} is not valid Prolog. A fact or rule must end with a \
         period ('.'); a query must not end with a period. Output only the corrected Prolog."
    )
}

/// Run `strategies` in order until one yields well-formed Prolog.
///
/// Each strategy gets up to `policy.max_attempts` attempts. On exhaustion the
/// last recorded error is returned.
pub async fn translate_with_retry(
    strategies: &[Arc<dyn TranslationStrategy>],
    engine: &dyn SymbolicEngine,
    base: TranslationRequest<'_>,
    policy: RetryPolicy,
) -> TranslationResult<Translation> {
    if base.text.trim().is_empty() {
        return Err(TranslationError::EmptyInput);
    }
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for strategy in strategies {
        let mut feedback: Option<String> = None;
        for attempt in 1..=max_attempts {
            let request = TranslationRequest {
                feedback: feedback.as_deref(),
                ..base
            };
            tracing::debug!(strategy = strategy.name(), attempt, "translation attempt");

            let outcome = strategy.translate(&request).await;
            let error = match outcome {
                Ok(output) => {
                    let output = output.trim().to_string();
                    if syntax::is_well_formed(engine, &output) {
                        tracing::info!(
                            strategy = strategy.name(),
                            attempt,
                            output = %output,
                            "translated"
                        );
                        return Ok(Translation {
                            output,
                            strategy: strategy.name().to_string(),
                            attempts: attempt,
                        });
                    }
                    feedback = Some(syntax_feedback(&output));
                    TranslationError::InvalidSyntax {
                        strategy: strategy.name().to_string(),
                        output,
                    }
                }
                Err(e) => {
                    feedback = Some(error_feedback(&e));
                    e
                }
            };

            tracing::warn!(
                strategy = strategy.name(),
                attempt,
                max_attempts,
                error = %error,
                "translation attempt failed"
            );
            last_error = Some(error);

            if attempt < max_attempts && !policy.retry_delay.is_zero() {
                tokio::time::sleep(policy.retry_delay).await;
            }
        }
    }

    Err(last_error.unwrap_or(TranslationError::NoStrategies))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::prolog::ScryerEngine;

    /// Replays canned outputs and records the feedback it was given.
    struct Scripted {
        name: String,
        outputs: Mutex<Vec<TranslationResult<String>>>,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl Scripted {
        fn new(name: &str, outputs: Vec<TranslationResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                outputs: Mutex::new(outputs),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn feedback(&self) -> Vec<Option<String>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranslationStrategy for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn translate(&self, request: &TranslationRequest<'_>) -> TranslationResult<String> {
            self.seen
                .lock()
                .unwrap()
                .push(request.feedback.map(str::to_string));
            self.outputs.lock().unwrap().remove(0)
        }
    }

    fn no_delay(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            retry_delay: Duration::ZERO,
        }
    }

    fn request(text: &str) -> TranslationRequest<'_> {
        TranslationRequest::new(text, TranslationMode::Clause)
    }

    #[tokio::test]
    async fn first_valid_output_wins() {
        let engine = ScryerEngine::default();
        let s = Scripted::new("a", vec![Ok("bird(tweety).".into())]);
        let strategies: Vec<Arc<dyn TranslationStrategy>> = vec![s.clone()];
        let t = translate_with_retry(&strategies, &engine, request("Tweety is a bird"), no_delay(2))
            .await
            .unwrap();
        assert_eq!(t.output, "bird(tweety).");
        assert_eq!(t.strategy, "a");
        assert_eq!(t.attempts, 1);
        assert_eq!(s.feedback(), vec![None]);
    }

    #[tokio::test]
    async fn invalid_syntax_is_retried_with_feedback() {
        let engine = ScryerEngine::default();
        let s = Scripted::new(
            "a",
            vec![Ok("bird(tweety".into()), Ok("bird(tweety).".into())],
        );
        let strategies: Vec<Arc<dyn TranslationStrategy>> = vec![s.clone()];
        let t = translate_with_retry(&strategies, &engine, request("Tweety is a bird"), no_delay(2))
            .await
            .unwrap();
        assert_eq!(t.attempts, 2);
        let fb = s.feedback();
        assert!(fb[0].is_none());
        assert!(fb[1].as_deref().unwrap().contains("bird(tweety"));
        assert!(fb[1].as_deref().unwrap().contains("must end with a period"));
    }

    #[tokio::test]
    async fn errors_become_feedback() {
        let engine = ScryerEngine::default();
        let s = Scripted::new(
            "a",
            vec![
                Err(TranslationError::strategy("a", "model offline")),
                Ok("bird(X)".into()),
            ],
        );
        let strategies: Vec<Arc<dyn TranslationStrategy>> = vec![s.clone()];
        translate_with_retry(&strategies, &engine, request("birds?"), no_delay(3))
            .await
            .unwrap();
        let fb = s.feedback();
        assert_eq!(
            fb[1].as_deref(),
            Some("Previous attempt failed with error: model offline. Please correct the output and try again.")
        );
    }

    #[tokio::test]
    async fn empty_output_is_a_syntax_failure() {
        let engine = ScryerEngine::default();
        let s = Scripted::new("a", vec![Ok("   ".into())]);
        let strategies: Vec<Arc<dyn TranslationStrategy>> = vec![s];
        let err = translate_with_retry(&strategies, &engine, request("x"), no_delay(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::InvalidSyntax { .. }));
    }

    #[tokio::test]
    async fn falls_through_with_fresh_feedback() {
        let engine = ScryerEngine::default();
        let a = Scripted::new(
            "a",
            vec![
                Err(TranslationError::strategy("a", "first")),
                Err(TranslationError::strategy("a", "second")),
            ],
        );
        let b = Scripted::new("b", vec![Ok("bird(tweety).".into())]);
        let strategies: Vec<Arc<dyn TranslationStrategy>> = vec![a.clone(), b.clone()];
        let t = translate_with_retry(&strategies, &engine, request("x"), no_delay(2))
            .await
            .unwrap();
        assert_eq!(t.strategy, "b");
        assert_eq!(a.feedback().len(), 2);
        assert_eq!(b.feedback(), vec![None]);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let engine = ScryerEngine::default();
        let a = Scripted::new("a", vec![Err(TranslationError::strategy("a", "a failed"))]);
        let b = Scripted::new("b", vec![Err(TranslationError::strategy("b", "b failed"))]);
        let strategies: Vec<Arc<dyn TranslationStrategy>> = vec![a, b];
        let err = translate_with_retry(&strategies, &engine, request("x"), no_delay(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "b failed");
    }

    #[tokio::test]
    async fn attempt_cap_is_attempts_times_strategies() {
        let engine = ScryerEngine::default();
        let a = Scripted::new("a", (0..3).map(|_| Ok("nope(".to_string())).collect());
        let b = Scripted::new("b", (0..3).map(|_| Ok("nope(".to_string())).collect());
        let strategies: Vec<Arc<dyn TranslationStrategy>> = vec![a.clone(), b.clone()];
        assert!(
            translate_with_retry(&strategies, &engine, request("x"), no_delay(3))
                .await
                .is_err()
        );
        assert_eq!(a.feedback().len() + b.feedback().len(), 6);
    }

    #[tokio::test]
    async fn empty_input_and_no_strategies() {
        let engine = ScryerEngine::default();
        let none: Vec<Arc<dyn TranslationStrategy>> = Vec::new();
        assert!(matches!(
            translate_with_retry(&none, &engine, request("  "), no_delay(1)).await,
            Err(TranslationError::EmptyInput)
        ));
        assert!(matches!(
            translate_with_retry(&none, &engine, request("x"), no_delay(1)).await,
            Err(TranslationError::NoStrategies)
        ));
    }

    #[tokio::test]
    async fn closure_strategy() {
        let engine = ScryerEngine::default();
        let custom: Arc<dyn TranslationStrategy> = Arc::new(FnStrategy::new("upper", |req| {
            let text = req.text.to_lowercase();
            Box::pin(async move { Ok(format!("{text}.")) })
        }));
        let t = translate_with_retry(&[custom], &engine, request("RAINING"), no_delay(1))
            .await
            .unwrap();
        assert_eq!(t.output, "raining.");
    }

    #[test]
    fn feedback_carries_raw_output() {
        let e = TranslationError::Llm(LlmError::ParseError {
            message: "expected value".into(),
            raw_output: Some("{type: fact".into()),
        });
        assert!(error_feedback(&e).ends_with("Your previous output was: {type: fact"));
    }
}
