//! Agentic reasoning: a bounded loop of query / assert / conclude steps.
//!
//! Each iteration asks a [`ReasoningStrategy`] for the next [`AgentAction`] and
//! executes it against a [`KnowledgeBase`]:
//!
//! - **query** runs the goal, records the action and its outcome, and feeds the
//!   bindings into later steps. A truth-token binding (`true`/`yes`/`false`/`no`)
//!   or a terminal query ends the run.
//! - **assert** adds a validated clause; rejection is recorded, not fatal.
//! - **conclude** ends the run with full confidence.
//!
//! Running out of steps yields an inconclusive answer. A strategy error aborts
//! the run with a "Reasoning error" answer.

pub mod action;
pub mod error;
pub mod reasoner;

use async_trait::async_trait;

pub use action::AgentAction;
pub use error::{AgentResult, ReasoningError};
pub use reasoner::{LlmReasoner, ReasoningContext, ReasoningStrategy};

use crate::llm::MeteredClient;
use crate::session::{AssertResult, QueryResult, ReasoningResult};

/// Default step budget.
pub const DEFAULT_MAX_STEPS: usize = 5;
/// Confidence of a run that exhausted its budget.
pub const INCONCLUSIVE_CONFIDENCE: f64 = 0.3;
pub const INCONCLUSIVE: &str = "Inconclusive";
pub const REASONING_ERROR: &str = "Reasoning error";

/// Knowledge the loop reads from and writes to.
#[async_trait]
pub trait KnowledgeBase: Send {
    /// Run a symbolic goal, honoring the sub-symbolic fallback flag.
    async fn run_query(&mut self, goal: &str, allow_fallback: bool) -> QueryResult;

    /// Validate and add a clause.
    fn add_clause(&mut self, clause: &str) -> AssertResult;

    /// Current program, one clause per entry.
    fn clauses(&self) -> Vec<String>;

    /// Ontology vocabulary for prompt grounding.
    fn vocabulary(&self) -> Vec<String>;
}

/// Per-run options.
#[derive(Debug, Clone, Copy)]
pub struct ReasonOptions {
    pub max_steps: usize,
    pub allow_sub_symbolic_fallback: bool,
}

impl Default for ReasonOptions {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            allow_sub_symbolic_fallback: false,
        }
    }
}

fn describe_query(result: &QueryResult) -> String {
    if let Some(err) = &result.error {
        return format!("Query failed: {err}");
    }
    let mut line = format!(
        "Query result: success={}, bindings=[{}], confidence={:.2}",
        result.success,
        result.bindings.join("; "),
        result.confidence
    );
    if let Some(answer) = &result.answer {
        line.push_str(&format!(", answer={answer}"));
    }
    line
}

/// Drive `strategy` against `kb` for at most `options.max_steps` steps.
pub async fn reason(
    kb: &mut dyn KnowledgeBase,
    strategy: &dyn ReasoningStrategy,
    llm: Option<&MeteredClient>,
    task: &str,
    options: ReasonOptions,
) -> ReasoningResult {
    let max_steps = options.max_steps;
    let mut steps: Vec<String> = Vec::new();
    let mut accumulated: Vec<String> = Vec::new();
    tracing::info!(task, max_steps, strategy = strategy.name(), "reasoning started");

    for step in 1..=max_steps {
        let program = kb.clauses();
        let terms = kb.vocabulary();
        let bindings = accumulated.join(", ");
        let ctx = ReasoningContext {
            task,
            program: &program,
            ontology_terms: &terms,
            previous_steps: &steps,
            accumulated_bindings: &bindings,
            step,
            max_steps,
            llm,
        };

        let action = match strategy.next_action(&ctx).await {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(step, error = %e, "reasoning aborted");
                let explanation = e.to_string().lines().next().unwrap_or_default().to_string();
                return ReasoningResult {
                    success: false,
                    answer: REASONING_ERROR.into(),
                    explanation: Some(explanation),
                    confidence: 0.0,
                    steps,
                };
            }
        };
        tracing::debug!(step, kind = action.kind(), "reasoning action");

        match action {
            AgentAction::Conclude {
                answer,
                explanation,
            } => {
                tracing::info!(step, answer = %answer, "reasoning concluded");
                return ReasoningResult {
                    success: true,
                    answer,
                    explanation,
                    confidence: 1.0,
                    steps,
                };
            }
            AgentAction::Query { content, terminal } => {
                steps.push(format!("Agent queries: {content}"));
                let result = kb
                    .run_query(&content, options.allow_sub_symbolic_fallback)
                    .await;
                steps.push(describe_query(&result));
                if !result.bindings.is_empty() {
                    accumulated.push(result.bindings.join(", "));
                }

                let truth = result.truth_answer();
                if truth.is_some() || terminal {
                    let answer = truth.unwrap_or(INCONCLUSIVE).to_string();
                    tracing::info!(step, answer = %answer, "reasoning ended by query");
                    return ReasoningResult {
                        success: true,
                        answer,
                        explanation: Some(format!(
                            "Derived from query {content}: {}",
                            result.bindings.join("; ")
                        )),
                        confidence: result.confidence,
                        steps,
                    };
                }
            }
            AgentAction::Assert { content } => {
                steps.push(format!("Agent asserts: {content}"));
                let result = kb.add_clause(&content);
                if result.success {
                    steps.push("Assertion succeeded".into());
                } else {
                    let err = result.error.unwrap_or_default();
                    tracing::warn!(step, clause = %content, error = %err, "agent assertion rejected");
                    steps.push(format!("Assertion failed: {err}"));
                }
            }
        }
    }

    steps.push(format!(
        "Reached the step limit ({max_steps}) without a conclusion"
    ));
    tracing::info!(max_steps, "reasoning inconclusive");
    ReasoningResult {
        success: true,
        answer: INCONCLUSIVE.into(),
        explanation: Some("Maximum reasoning steps reached without a conclusion.".into()),
        confidence: INCONCLUSIVE_CONFIDENCE,
        steps,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::prolog::{Binding, Solution};

    /// In-memory stand-in: a fixed answer table for queries.
    #[derive(Default)]
    struct Table {
        clauses: Vec<String>,
        answers: Vec<(String, Vec<(&'static str, &'static str)>)>,
        reject_asserts: bool,
    }

    #[async_trait]
    impl KnowledgeBase for Table {
        async fn run_query(&mut self, goal: &str, _allow_fallback: bool) -> QueryResult {
            match self.answers.iter().find(|(g, _)| g == goal) {
                Some((_, binds)) => {
                    let solution = Solution {
                        bindings: binds
                            .iter()
                            .map(|(v, x)| Binding {
                                var: v.to_string(),
                                value: x.to_string(),
                            })
                            .collect(),
                    };
                    let rendered = solution.to_string();
                    QueryResult {
                        success: true,
                        query: goal.into(),
                        bindings: if rendered.is_empty() {
                            Vec::new()
                        } else {
                            vec![rendered]
                        },
                        solutions: vec![solution],
                        confidence: 1.0,
                        ..Default::default()
                    }
                }
                None => QueryResult {
                    query: goal.into(),
                    ..Default::default()
                },
            }
        }

        fn add_clause(&mut self, clause: &str) -> AssertResult {
            if self.reject_asserts {
                return AssertResult::failed(Some(clause.into()), "predicate 'x' not in ontology");
            }
            self.clauses.push(clause.into());
            AssertResult::ok(clause)
        }

        fn clauses(&self) -> Vec<String> {
            self.clauses.clone()
        }

        fn vocabulary(&self) -> Vec<String> {
            Vec::new()
        }
    }

    /// Replays actions and records the bindings it was shown.
    struct Script {
        actions: Mutex<Vec<AgentResult<AgentAction>>>,
        seen_bindings: Mutex<Vec<String>>,
    }

    impl Script {
        fn new(actions: Vec<AgentResult<AgentAction>>) -> Self {
            Self {
                actions: Mutex::new(actions),
                seen_bindings: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReasoningStrategy for Script {
        fn name(&self) -> &str {
            "script"
        }

        async fn next_action(&self, ctx: &ReasoningContext<'_>) -> AgentResult<AgentAction> {
            self.seen_bindings
                .lock()
                .unwrap()
                .push(ctx.accumulated_bindings.to_string());
            let mut actions = self.actions.lock().unwrap();
            if actions.is_empty() {
                Ok(AgentAction::query("nothing(here)"))
            } else {
                actions.remove(0)
            }
        }
    }

    fn opts(max_steps: usize) -> ReasonOptions {
        ReasonOptions {
            max_steps,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn query_then_conclude() {
        let mut kb = Table {
            answers: vec![("can_migrate(tweety)".into(), vec![])],
            ..Default::default()
        };
        let script = Script::new(vec![
            Ok(AgentAction::query("can_migrate(tweety)")),
            Ok(AgentAction::conclude("Yes, Tweety can migrate.")),
        ]);
        let r = reason(&mut kb, &script, None, "Can Tweety migrate?", opts(5)).await;
        assert_eq!(r.answer, "Yes, Tweety can migrate.");
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.steps.len(), 2);
    }

    #[tokio::test]
    async fn budget_exhaustion_is_inconclusive() {
        let mut kb = Table::default();
        let script = Script::new(vec![]);
        let r = reason(&mut kb, &script, None, "?", opts(5)).await;
        assert_eq!(r.answer, INCONCLUSIVE);
        assert_eq!(r.confidence, INCONCLUSIVE_CONFIDENCE);
        assert_eq!(r.steps.len(), 2 * 5 + 1);
    }

    #[tokio::test]
    async fn truth_token_ends_the_run() {
        let mut kb = Table {
            answers: vec![("flies(tweety, R)".into(), vec![("R", "true")])],
            ..Default::default()
        };
        let script = Script::new(vec![Ok(AgentAction::query("flies(tweety, R)"))]);
        let r = reason(&mut kb, &script, None, "Does Tweety fly?", opts(5)).await;
        assert_eq!(r.answer, "Yes");
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.steps.len(), 2);
    }

    #[tokio::test]
    async fn terminal_query_without_truth_is_inconclusive() {
        let mut kb = Table {
            answers: vec![("bird(X)".into(), vec![("X", "tweety")])],
            ..Default::default()
        };
        let script = Script::new(vec![Ok(AgentAction::Query {
            content: "bird(X)".into(),
            terminal: true,
        })]);
        let r = reason(&mut kb, &script, None, "Who is a bird?", opts(5)).await;
        assert_eq!(r.answer, INCONCLUSIVE);
        assert_eq!(r.confidence, 1.0);
    }

    #[tokio::test]
    async fn bindings_accumulate_across_steps() {
        let mut kb = Table {
            answers: vec![
                ("bird(X)".into(), vec![("X", "tweety")]),
                ("fish(Y)".into(), vec![("Y", "nemo")]),
            ],
            ..Default::default()
        };
        let script = Script::new(vec![
            Ok(AgentAction::query("bird(X)")),
            Ok(AgentAction::query("fish(Y)")),
            Ok(AgentAction::conclude("done")),
        ]);
        reason(&mut kb, &script, None, "?", opts(5)).await;
        let seen = script.seen_bindings.lock().unwrap().clone();
        assert_eq!(seen, vec!["", "X = tweety", "X = tweety, Y = nemo"]);
    }

    #[tokio::test]
    async fn rejected_assertion_does_not_stop_the_loop() {
        let mut kb = Table {
            reject_asserts: true,
            ..Default::default()
        };
        let script = Script::new(vec![
            Ok(AgentAction::assert("x(a).")),
            Ok(AgentAction::conclude("recovered")),
        ]);
        let r = reason(&mut kb, &script, None, "?", opts(5)).await;
        assert_eq!(r.answer, "recovered");
        assert!(r.steps[1].starts_with("Assertion failed"));
    }

    #[tokio::test]
    async fn strategy_error_aborts() {
        let mut kb = Table::default();
        let script = Script::new(vec![Err(ReasoningError::InvalidAction {
            kind: "dance".into(),
        })]);
        let r = reason(&mut kb, &script, None, "?", opts(5)).await;
        assert!(!r.success);
        assert_eq!(r.answer, REASONING_ERROR);
        assert_eq!(r.confidence, 0.0);
        assert!(r.explanation.unwrap().contains("dance"));
    }
}
