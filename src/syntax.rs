//! Syntax checking for translated text before it is trusted.
//!
//! Purely syntactic: a candidate ending in the clause terminator must parse as
//! a program, anything else must parse as a query. Nothing is proved.

use crate::prolog::SymbolicEngine;

/// The clause terminator.
pub const TERMINATOR: char = '.';

/// Whether `text` ends with the clause terminator (ignoring trailing whitespace).
pub fn is_terminated(text: &str) -> bool {
    text.trim_end().ends_with(TERMINATOR)
}

/// Strip a single trailing terminator, turning `bird(X).` into `bird(X)`.
pub fn strip_terminator(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed.strip_suffix(TERMINATOR).map_or(trimmed, str::trim_end)
}

/// Whether `text` is a well-formed clause (terminated) or query (unterminated).
///
/// Empty input is never well-formed and never reaches the engine.
pub fn is_well_formed(engine: &dyn SymbolicEngine, text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    let result = if is_terminated(text) {
        engine.check_program(text)
    } else {
        engine.check_query(text)
    };
    if let Err(e) = &result {
        tracing::debug!(error = %e, candidate = text, "rejected by syntax check");
    }
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prolog::ScryerEngine;

    #[test]
    fn clauses_and_queries() {
        let engine = ScryerEngine::default();
        assert!(is_well_formed(&engine, "bird(tweety)."));
        assert!(is_well_formed(&engine, "has_wings(X) :- bird(X)."));
        assert!(is_well_formed(&engine, "bird(X)"));
        assert!(is_well_formed(&engine, "  bird(X).  "));
    }

    #[test]
    fn malformed_text_is_rejected() {
        let engine = ScryerEngine::default();
        assert!(!is_well_formed(&engine, ""));
        assert!(!is_well_formed(&engine, "   "));
        assert!(!is_well_formed(&engine, "bird(tweety"));
        assert!(!is_well_formed(&engine, "Tweety is a bird."));
        assert!(!is_well_formed(&engine, "has_wings(X) :- ."));
    }

    #[test]
    fn terminator_helpers() {
        assert!(is_terminated("bird(x). "));
        assert!(!is_terminated("bird(x)"));
        assert_eq!(strip_terminator(" bird(X). "), "bird(X)");
        assert_eq!(strip_terminator("bird(X)"), "bird(X)");
    }
}
