//! Session state: the program, the live ontology, and per-session usage.
//!
//! Every mutation of the program goes through ontology validation and is
//! followed by a full reconsult of the symbolic engine. Natural-language
//! operations translate first, through the strategy chain, then take the same
//! validated path.

pub mod graph;
pub mod result;
pub mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

pub use graph::{KnowledgeGraph, KnowledgeGraphFormat};
pub use result::{AssertResult, QueryResult, ReasoningResult};
pub use snapshot::SessionSnapshot;

use crate::agent::{self, KnowledgeBase, LlmReasoner, ReasonOptions, ReasoningStrategy};
use crate::config::SessionConfig;
use crate::llm::{ChatMessage, MeteredClient};
use crate::metrics::{UsageCounters, UsageSnapshot};
use crate::ontology::{Ontology, OntologyError, parse_clause_shape};
use crate::prolog::{EngineLimits, PrologError, ScryerEngine, SymbolicEngine};
use crate::syntax;
use crate::translate::{
    RetryPolicy, StrategyRegistry, StrategySelection, Translation, TranslationError,
    TranslationMode, TranslationRequest, translate_with_retry,
};

/// Errors from session operations. Public operations fold these into result
/// objects; they surface directly only from snapshot I/O.
#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("invalid clause {clause:?}: {reason}")]
    #[diagnostic(
        code(mcr::session::invalid_syntax),
        help("Clauses look like `bird(tweety).` or `flies(X) :- bird(X).` and end with a period.")
    )]
    InvalidSyntax { clause: String, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    OntologyViolation(#[from] OntologyError),

    #[error("clause not found in program: {clause}")]
    #[diagnostic(
        code(mcr::session::not_found),
        help("Retraction needs the exact clause text as stored; list it with `graph`.")
    )]
    NotFound { clause: String },

    #[error("snapshot error: {message}")]
    #[diagnostic(
        code(mcr::session::snapshot),
        help("Snapshots are JSON objects with `program`, `sessionId` and `ontology`.")
    )]
    Snapshot { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] PrologError),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Construction-time settings for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Generated when absent.
    pub session_id: Option<String>,
    pub ontology: Ontology,
    /// Clauses loaded at construction, validated like a snapshot load.
    pub program: Vec<String>,
    pub translator: StrategySelection,
    pub max_translation_attempts: usize,
    pub retry_delay: Duration,
    pub max_reasoning_steps: usize,
    pub sub_symbolic_confidence: f64,
    pub limits: EngineLimits,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            session_id: None,
            ontology: Ontology::default(),
            program: Vec::new(),
            translator: StrategySelection::from(config.translator.clone()),
            max_translation_attempts: config.max_translation_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_reasoning_steps: config.max_reasoning_steps,
            sub_symbolic_confidence: config.sub_symbolic_confidence,
            limits: EngineLimits {
                max_solutions: config.max_solutions,
                max_inferences: config.max_inferences,
            },
        }
    }

    pub fn with_ontology(mut self, ontology: Ontology) -> Self {
        self.ontology = ontology;
        self
    }

    pub fn with_program(mut self, program: Vec<String>) -> Self {
        self.program = program;
        self
    }

    pub fn with_translator(mut self, translator: StrategySelection) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }
}

/// Per-query options.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Let the language model answer when no proof is found.
    pub allow_sub_symbolic_fallback: bool,
}

/// One caller's knowledge base.
pub struct Session {
    id: String,
    program: Vec<String>,
    ontology: Ontology,
    initial_ontology: Ontology,
    engine: Box<dyn SymbolicEngine>,
    options: SessionOptions,
    llm: Option<MeteredClient>,
    usage: Arc<UsageCounters>,
    registry: StrategyRegistry,
    reasoner: Arc<dyn ReasoningStrategy>,
}

impl Session {
    /// A session on the embedded Scryer engine, with no language model.
    pub fn new(options: SessionOptions) -> Self {
        let engine = Box::new(ScryerEngine::new(options.limits));
        Self::with_engine(options, engine)
    }

    /// A session on a caller-supplied engine.
    pub fn with_engine(options: SessionOptions, engine: Box<dyn SymbolicEngine>) -> Self {
        let id = options
            .session_id
            .clone()
            .unwrap_or_else(|| format!("{:016x}", rand::random::<u64>()));
        let mut session = Self {
            id,
            program: Vec::new(),
            ontology: options.ontology.clone(),
            initial_ontology: options.ontology.clone(),
            engine,
            llm: None,
            usage: Arc::new(UsageCounters::new()),
            registry: StrategyRegistry::default(),
            reasoner: Arc::new(LlmReasoner::new(options.max_translation_attempts)),
            options,
        };
        let initial = std::mem::take(&mut session.options.program);
        if !initial.is_empty() {
            let dropped = session.revalidate(initial.clone());
            if !dropped.is_empty() {
                tracing::warn!(session = %session.id, dropped = dropped.len(), "initial clauses rejected");
            }
            session.options.program = initial;
        }
        tracing::info!(session = %session.id, clauses = session.program.len(), "session created");
        session
    }

    /// Attach a language model. The session's own counters are added as a
    /// usage sink.
    pub fn with_llm(mut self, llm: MeteredClient) -> Self {
        self.llm = Some(llm.with_sink(self.usage.clone()));
        self
    }

    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_reasoner(mut self, reasoner: Arc<dyn ReasoningStrategy>) -> Self {
        self.reasoner = reasoner;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn program(&self) -> &[String] {
        &self.program
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Usage of this session's language-model calls.
    pub fn llm_metrics(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// Change the default strategy selection for later translations.
    pub fn set_translator(&mut self, translator: StrategySelection) {
        self.options.translator = translator;
    }

    // -----------------------------------------------------------------------
    // Validation and program mutation
    // -----------------------------------------------------------------------

    /// Check a clause without adding it. Returns the normalized text.
    fn admit(&self, text: &str) -> SessionResult<String> {
        let clause = text.trim();
        if clause.is_empty() {
            return Err(SessionError::InvalidSyntax {
                clause: clause.into(),
                reason: "empty clause".into(),
            });
        }
        if !syntax::is_terminated(clause) {
            return Err(SessionError::InvalidSyntax {
                clause: clause.into(),
                reason: format!("a clause must end with '{}'", syntax::TERMINATOR),
            });
        }
        self.engine
            .check_program(clause)
            .map_err(|e| SessionError::InvalidSyntax {
                clause: clause.into(),
                reason: e.to_string(),
            })?;

        let shape = parse_clause_shape(clause)?;
        self.ontology.validate_shape(&shape)?;
        Ok(clause.to_string())
    }

    fn recompile(&mut self) -> SessionResult<()> {
        self.engine.consult(&self.program.join("\n"))?;
        Ok(())
    }

    fn try_assert(&mut self, text: &str) -> SessionResult<String> {
        let clause = self.admit(text)?;
        self.program.push(clause.clone());
        if let Err(e) = self.recompile() {
            self.program.pop();
            return Err(e);
        }
        tracing::info!(session = %self.id, clause = %clause, "clause asserted");
        Ok(clause)
    }

    fn try_retract(&mut self, text: &str) -> SessionResult<String> {
        let clause = text.trim();
        let pos = self
            .program
            .iter()
            .position(|c| c == clause)
            .ok_or_else(|| SessionError::NotFound {
                clause: clause.into(),
            })?;
        let removed = self.program.remove(pos);
        if let Err(e) = self.recompile() {
            self.program.insert(pos, removed);
            return Err(e);
        }
        tracing::info!(session = %self.id, clause = %removed, "clause retracted");
        Ok(removed)
    }

    /// Re-admit `clauses` against the current ontology into an empty program.
    /// Returns the clauses that no longer validate.
    fn revalidate(&mut self, clauses: Vec<String>) -> Vec<String> {
        self.program.clear();
        let mut dropped = Vec::new();
        for clause in clauses {
            match self.admit(&clause) {
                Ok(c) => self.program.push(c),
                Err(e) => {
                    tracing::warn!(session = %self.id, clause = %clause, error = %e, "clause dropped");
                    dropped.push(clause);
                }
            }
        }
        if let Err(e) = self.recompile() {
            tracing::warn!(session = %self.id, error = %e, "reconsult failed after revalidation");
        }
        dropped
    }

    /// Add a clause directly, bypassing translation.
    pub fn assert_prolog(&mut self, text: &str) -> AssertResult {
        match self.try_assert(text) {
            Ok(clause) => AssertResult::ok(clause),
            Err(e) => {
                tracing::warn!(session = %self.id, clause = text, error = %e, "assert rejected");
                AssertResult::failed(Some(text.trim().to_string()), e)
            }
        }
    }

    /// Remove the first clause exactly equal to `text`.
    pub fn retract_prolog(&mut self, text: &str) -> AssertResult {
        match self.try_retract(text) {
            Ok(clause) => AssertResult::ok(clause),
            Err(e) => AssertResult::failed(Some(text.trim().to_string()), e),
        }
    }

    // -----------------------------------------------------------------------
    // Convenience builders
    // -----------------------------------------------------------------------

    /// `type(entity).`
    pub fn add_fact(&mut self, entity: &str, entity_type: &str) -> AssertResult {
        self.assert_prolog(&format!("{entity_type}({entity})."))
    }

    /// `relation(subject, object).`
    pub fn add_relationship(&mut self, subject: &str, relation: &str, object: &str) -> AssertResult {
        self.assert_prolog(&format!("{relation}({subject}, {object})."))
    }

    /// Add a rule; the terminator is appended when missing.
    pub fn add_rule(&mut self, rule: &str) -> AssertResult {
        self.assert_prolog(&terminated(rule))
    }

    pub fn remove_fact(&mut self, entity: &str, entity_type: &str) -> AssertResult {
        self.retract_prolog(&format!("{entity_type}({entity})."))
    }

    pub fn remove_relationship(
        &mut self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> AssertResult {
        self.retract_prolog(&format!("{relation}({subject}, {object})."))
    }

    pub fn remove_rule(&mut self, rule: &str) -> AssertResult {
        self.retract_prolog(&terminated(rule))
    }

    // -----------------------------------------------------------------------
    // Ontology
    // -----------------------------------------------------------------------

    pub fn add_type(&mut self, name: &str) {
        self.ontology.add_type(name);
    }

    pub fn add_relationship_type(&mut self, name: &str) {
        self.ontology.add_relationship(name);
    }

    pub fn add_constraint(&mut self, name: &str) {
        self.ontology.add_constraint(name);
    }

    pub fn add_synonym(&mut self, alias: &str, canonical: &str) {
        self.ontology.add_synonym(alias, canonical);
    }

    /// Replace the ontology and re-derive the program under it. Returns the
    /// clauses that were dropped.
    pub fn reload_ontology(&mut self, ontology: Ontology) -> Vec<String> {
        self.ontology = ontology;
        let clauses = std::mem::take(&mut self.program);
        let dropped = self.revalidate(clauses);
        tracing::info!(
            session = %self.id,
            kept = self.program.len(),
            dropped = dropped.len(),
            "ontology reloaded"
        );
        dropped
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn save_state(&self) -> SessionSnapshot {
        SessionSnapshot {
            program: self.program.clone(),
            session_id: self.id.clone(),
            ontology: self.ontology.clone(),
        }
    }

    /// Replace program, ontology and id from a snapshot. Clauses that fail
    /// validation are skipped and returned.
    pub fn load_state(&mut self, snapshot: SessionSnapshot) -> Vec<String> {
        if !snapshot.session_id.is_empty() {
            self.id = snapshot.session_id;
        }
        self.ontology = snapshot.ontology;
        let dropped = self.revalidate(snapshot.program);
        tracing::info!(
            session = %self.id,
            clauses = self.program.len(),
            skipped = dropped.len(),
            "state loaded"
        );
        dropped
    }

    /// Empty the program and restore the construction-time ontology.
    pub fn clear(&mut self) {
        self.program.clear();
        self.ontology = self.initial_ontology.clone();
        if let Err(e) = self.recompile() {
            tracing::warn!(session = %self.id, error = %e, "reconsult failed after clear");
        }
        tracing::info!(session = %self.id, "session cleared");
    }

    pub fn knowledge_graph(&self) -> KnowledgeGraph {
        KnowledgeGraph::build(&self.program, &self.ontology)
    }

    /// Program text (`Prolog`) or the structured decomposition (`Json`).
    pub fn export(&self, format: KnowledgeGraphFormat) -> String {
        match format {
            KnowledgeGraphFormat::Prolog => self.program.join("\n"),
            KnowledgeGraphFormat::Json => serde_json::to_string_pretty(&self.knowledge_graph())
                .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}")),
        }
    }

    // -----------------------------------------------------------------------
    // Translation-backed operations
    // -----------------------------------------------------------------------

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.options.max_translation_attempts,
            retry_delay: self.options.retry_delay,
        }
    }

    async fn translate(
        &self,
        text: &str,
        mode: TranslationMode,
        selection: &StrategySelection,
    ) -> Result<Translation, TranslationError> {
        let strategies = self.registry.resolve(selection)?;
        let terms = self.ontology.terms();
        let base = TranslationRequest::new(text, mode)
            .with_terms(&terms)
            .with_llm(self.llm.as_ref());
        translate_with_retry(&strategies, self.engine.as_ref(), base, self.retry_policy()).await
    }

    /// Translate a natural-language statement and assert it.
    pub async fn assert(&mut self, text: &str) -> AssertResult {
        let selection = self.options.translator.clone();
        self.assert_with(text, &selection).await
    }

    /// [`Self::assert`] with an explicit strategy selection.
    pub async fn assert_with(&mut self, text: &str, selection: &StrategySelection) -> AssertResult {
        let translation = match self.translate(text, TranslationMode::Clause, selection).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(session = %self.id, input = text, error = %e, "translation failed");
                return AssertResult::failed(None, e);
            }
        };
        let strategy = translation.strategy.clone();
        self.assert_prolog(&translation.output).with_strategy(strategy)
    }

    /// Run a symbolic goal. One trailing terminator is tolerated.
    pub async fn query(&self, text: &str, options: QueryOptions) -> QueryResult {
        let goal = syntax::strip_terminator(text).to_string();
        match self.engine.solve(&goal) {
            Ok(solutions) if !solutions.is_empty() => {
                let bindings = solutions
                    .iter()
                    .map(|s| self.engine.format_solution(s))
                    .filter(|b| !b.is_empty())
                    .collect();
                QueryResult {
                    success: true,
                    query: goal,
                    bindings,
                    solutions,
                    confidence: 1.0,
                    ..Default::default()
                }
            }
            Ok(_) if options.allow_sub_symbolic_fallback => {
                self.sub_symbolic(&goal, text, None).await
            }
            Ok(_) => QueryResult {
                query: goal,
                ..Default::default()
            },
            Err(e) if options.allow_sub_symbolic_fallback => {
                self.sub_symbolic(&goal, text, Some(e.to_string())).await
            }
            Err(e) => QueryResult::failed(goal, e),
        }
    }

    /// Translate a natural-language question to a goal and run it.
    pub async fn nquery(&self, text: &str, options: QueryOptions) -> QueryResult {
        let selection = self.options.translator.clone();
        match self.translate(text, TranslationMode::Query, &selection).await {
            Ok(t) => self.query(&t.output, options).await,
            Err(e) if options.allow_sub_symbolic_fallback => {
                self.sub_symbolic("", text, Some(e.to_string())).await
            }
            Err(e) => QueryResult::failed(text, e),
        }
    }

    /// Ask the model directly when no proof was found.
    async fn sub_symbolic(&self, goal: &str, question: &str, cause: Option<String>) -> QueryResult {
        let Some(llm) = &self.llm else {
            let error = cause.unwrap_or_else(|| "no proof found".into());
            return QueryResult::failed(goal, format!("{error}; no language model for fallback"));
        };
        let prompt = format!(
            "Answer the question using the knowledge base below and general knowledge. \
             Reply with a short answer.\n\nKnowledge Base:\n{}\n\nQuestion: {question}",
            self.program.join("\n")
        );
        match llm.chat(llm.request(vec![ChatMessage::user(prompt)])).await {
            Ok(resp) => {
                tracing::info!(session = %self.id, query = goal, "answered by fallback");
                QueryResult {
                    success: true,
                    query: goal.into(),
                    confidence: self.options.sub_symbolic_confidence,
                    sub_symbolic: true,
                    answer: Some(resp.content.trim().to_string()),
                    ..Default::default()
                }
            }
            Err(e) => QueryResult::failed(goal, e),
        }
    }

    /// Run the agentic reasoning loop on `task`.
    pub async fn reason(&mut self, task: &str, options: ReasonOptions) -> ReasoningResult {
        let reasoner = self.reasoner.clone();
        let llm = self.llm.clone();
        agent::reason(self, reasoner.as_ref(), llm.as_ref(), task, options).await
    }

    /// Reasoning options from the session's configured step budget.
    pub fn reason_options(&self) -> ReasonOptions {
        ReasonOptions {
            max_steps: self.options.max_reasoning_steps,
            allow_sub_symbolic_fallback: false,
        }
    }
}

fn terminated(text: &str) -> String {
    let text = text.trim();
    if syntax::is_terminated(text) {
        text.to_string()
    } else {
        format!("{text}{}", syntax::TERMINATOR)
    }
}

#[async_trait]
impl KnowledgeBase for Session {
    async fn run_query(&mut self, goal: &str, allow_fallback: bool) -> QueryResult {
        self.query(
            goal,
            QueryOptions {
                allow_sub_symbolic_fallback: allow_fallback,
            },
        )
        .await
    }

    fn add_clause(&mut self, clause: &str) -> AssertResult {
        self.assert_prolog(clause)
    }

    fn clauses(&self) -> Vec<String> {
        self.program.clone()
    }

    fn vocabulary(&self) -> Vec<String> {
        self.ontology.terms()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("clauses", &self.program.len())
            .field("ontology", &self.ontology)
            .field("llm", &self.llm)
            .finish()
    }
}
