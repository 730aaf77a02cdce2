//! Symbolic inference engine.
//!
//! The session talks to its engine only through [`SymbolicEngine`]: consult a
//! full program text, solve a single goal, and parse-check candidate text.
//! [`ScryerEngine`] embeds Scryer Prolog; any other logic-programming runtime
//! can be plugged in behind the same trait.

pub mod scryer;

use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use scryer::ScryerEngine;

/// Errors raised while reading or solving Prolog text.
#[derive(Debug, Error, Diagnostic)]
pub enum PrologError {
    #[error("syntax error: {message}")]
    #[diagnostic(
        code(mcr::prolog::parse),
        help(
            "Clauses are `head.` or `head :- body.` and must end with a period; \
             queries are a bare goal such as `bird(X)` with no trailing period."
        )
    )]
    Parse { message: String },

    #[error("uncaught exception: {message}")]
    #[diagnostic(
        code(mcr::prolog::exception),
        help("The goal raised a Prolog error, e.g. arithmetic on an unbound variable.")
    )]
    Exception { message: String },
}

pub type PrologResult<T> = std::result::Result<T, PrologError>;

/// Resource limits for a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Solutions collected per query.
    pub max_solutions: usize,
    /// Inferences a query may spend before its search is cut off.
    pub max_inferences: u64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_solutions: 100,
            max_inferences: 1_000_000,
        }
    }
}

/// One variable binding in a solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub var: String,
    pub value: String,
}

/// One solution to a query. A ground goal that succeeds has no bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub bindings: Vec<Binding>,
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.bindings.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = {}", b.var, b.value)?;
        }
        Ok(())
    }
}

/// A logic-programming runtime the session can drive.
pub trait SymbolicEngine: Send + Sync {
    /// Replace the working theory with `program`.
    fn consult(&mut self, program: &str) -> PrologResult<()>;

    /// Solve `query` (no trailing period) against the working theory.
    fn solve(&self, query: &str) -> PrologResult<Vec<Solution>>;

    /// Parse-check program text without touching the working theory.
    fn check_program(&self, text: &str) -> PrologResult<()>;

    /// Parse-check a query without running it.
    fn check_query(&self, text: &str) -> PrologResult<()>;

    /// Render one solution as a human-readable binding string.
    fn format_solution(&self, solution: &Solution) -> String {
        solution.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solution_formatting() {
        let s = Solution {
            bindings: vec![
                Binding {
                    var: "X".into(),
                    value: "tweety".into(),
                },
                Binding {
                    var: "Y".into(),
                    value: "polly".into(),
                },
            ],
        };
        assert_eq!(s.to_string(), "X = tweety, Y = polly");
        assert_eq!(Solution::default().to_string(), "");
    }
}
