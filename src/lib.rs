// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # mcr
//!
//! A neuro-symbolic reasoning session: natural-language statements and
//! questions are translated by a language model into Prolog, checked against
//! an ontology, and run on a symbolic engine.
//!
//! ## Architecture
//!
//! - **Symbolic engine** (`prolog`): embedded Scryer Prolog behind the `SymbolicEngine` trait
//! - **Syntax check** (`syntax`): clause vs. query parse check before text is trusted
//! - **Ontology** (`ontology`): declared types, relationships, constraints, synonyms
//! - **Translation** (`translate`): retrying, feedback-driven strategy chain
//! - **Agentic reasoning** (`agent`): bounded query / assert / conclude loop
//! - **Sessions** (`session`): validated program, snapshots, knowledge-graph export
//! - **Usage** (`metrics`): token and latency counters per session and per root handle
//!
//! ## Library usage
//!
//! ```no_run
//! use mcr::config::McrConfig;
//! use mcr::engine::Mcr;
//! use mcr::ontology::Ontology;
//! use mcr::session::QueryOptions;
//!
//! # async fn demo() -> mcr::error::McrResult<()> {
//! let mut config = McrConfig::default();
//! config.ontology = Ontology::new().with_type("bird").with_type("has_wings");
//! let mcr = Mcr::new(config)?;
//! let mut session = mcr.session();
//! session.assert_prolog("bird(tweety).");
//! session.assert_prolog("has_wings(X) :- bird(X).");
//! let answer = session.query("has_wings(X)", QueryOptions::default()).await;
//! assert_eq!(answer.bindings, vec!["X = tweety"]);
//!
//! let reply = session.assert("Polly is a bird.").await;
//! println!("{reply:?}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod ontology;
pub mod prolog;
pub mod session;
pub mod syntax;
pub mod translate;
