//! Ontology: the declared vocabulary that constrains admissible clauses.
//!
//! An [`Ontology`] holds entity types (unary predicates), relationship types
//! (predicates of arity two or more), opaque named constraints, and an
//! alias → canonical synonym map. Declaration never validates the term
//! itself; validation happens only when a clause is offered for acceptance.
//!
//! Clause text is lexed once by [`parse_clause_shape`] into a [`ClauseShape`];
//! everything downstream works on that record.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use miette::Diagnostic;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of near-match suggestions in a rejection message.
pub const MAX_SUGGESTIONS: usize = 5;

static PREDICATE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-zA-Z0-9_]*$").expect("valid regex"));

static LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([a-z][a-zA-Z0-9_]*)\s*(?:\((.*)\))?$").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a clause or fact is rejected by the ontology.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
pub enum OntologyError {
    #[error("invalid predicate name '{name}': must start with a lowercase letter followed by letters, digits or underscores")]
    #[diagnostic(
        code(mcr::ontology::malformed_name),
        help("Rename the predicate, e.g. `is_bird` instead of `IsBird`.")
    )]
    MalformedName { name: String },

    #[error("invalid clause head: {head}")]
    #[diagnostic(
        code(mcr::ontology::malformed_head),
        help("A clause head is `name` or `name(arg, ...)`.")
    )]
    MalformedHead { head: String },

    #[error("invalid rule body predicate: {literal}")]
    #[diagnostic(
        code(mcr::ontology::malformed_body),
        help("Each body literal is `name`, `name(arg, ...)` or `\\+ name(arg, ...)`.")
    )]
    MalformedBodyPredicate { literal: String },

    #[error("rule body cannot be empty")]
    #[diagnostic(
        code(mcr::ontology::empty_body),
        help("Drop the `:-` to state a fact, or add at least one body literal.")
    )]
    EmptyBody,

    #[error("predicate '{predicate}' not in ontology. {hint}")]
    #[diagnostic(
        code(mcr::ontology::not_in_ontology),
        help("Declare it with `add_type` / `add_relationship`, or map it with `add_synonym`.")
    )]
    NotInOntology { predicate: String, hint: String },

    #[error("{predicate} is a {kind} and expects {expected} argument(s), got {actual}")]
    #[diagnostic(
        code(mcr::ontology::arity),
        help("Types take exactly one argument; relationships take two or more.")
    )]
    ArityMismatch {
        predicate: String,
        kind: String,
        expected: String,
        actual: usize,
    },

    #[error("constraint '{name}' not in ontology")]
    #[diagnostic(
        code(mcr::ontology::unknown_constraint),
        help("Declare it with `add_constraint` first.")
    )]
    UnknownConstraint { name: String },
}

pub type OntologyResult<T> = std::result::Result<T, OntologyError>;

// ---------------------------------------------------------------------------
// Clause shape
// ---------------------------------------------------------------------------

/// A predicate application as written: `name(arg, ...)`, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub name: String,
    pub args: Vec<String>,
    pub negated: bool,
}

/// Lexical shape of a clause: head plus optional rule body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseShape {
    pub head: Literal,
    pub body: Option<Vec<Literal>>,
}

impl ClauseShape {
    pub fn is_rule(&self) -> bool {
        self.body.is_some()
    }
}

/// Split on commas that are not nested inside brackets or quotes.
/// `None` if the brackets do not balance.
fn split_top_level(text: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            (None, ',') if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return None;
    }
    parts.push(&text[start..]);
    Some(parts)
}

/// Byte offset of the first `:-` outside brackets and quotes.
fn find_rule_operator(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, ':') if depth == 0 && matches!(chars.peek(), Some((_, '-'))) => {
                return Some(i);
            }
            _ => {}
        }
    }
    None
}

/// Match `name` or `name(args)`; `None` if the text has another shape.
fn parse_literal(text: &str) -> Option<Literal> {
    let text = text.trim();
    let (negated, text) = match text.strip_prefix("\\+") {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };
    let caps = LITERAL.captures(text)?;
    let name = caps.get(1)?.as_str().to_string();
    let args = match caps.get(2) {
        Some(inner) => {
            let args: Vec<String> = split_top_level(inner.as_str())?
                .into_iter()
                .map(|a| a.trim().to_string())
                .collect();
            if args.iter().any(String::is_empty) {
                return None;
            }
            args
        }
        None => Vec::new(),
    };
    Some(Literal {
        name,
        args,
        negated,
    })
}

/// Lex a clause (`head.` or `head :- body.`) into its shape.
pub fn parse_clause_shape(text: &str) -> OntologyResult<ClauseShape> {
    let text = crate::syntax::strip_terminator(text);
    let (head_text, body_text) = match find_rule_operator(text) {
        Some(at) => (text[..at].trim(), Some(text[at + 2..].trim())),
        None => (text.trim(), None),
    };

    let head = parse_literal(head_text)
        .filter(|lit| !lit.negated)
        .ok_or_else(|| OntologyError::MalformedHead {
            head: head_text.to_string(),
        })?;

    let body = match body_text {
        None => None,
        Some("") => return Err(OntologyError::EmptyBody),
        Some(body) => Some(
            split_top_level(body)
                .ok_or_else(|| OntologyError::MalformedBodyPredicate {
                    literal: body.to_string(),
                })?
                .into_iter()
                .map(|lit| {
                    parse_literal(lit).ok_or_else(|| OntologyError::MalformedBodyPredicate {
                        literal: lit.trim().to_string(),
                    })
                })
                .collect::<OntologyResult<Vec<_>>>()?,
        ),
    };

    Ok(ClauseShape { head, body })
}

// ---------------------------------------------------------------------------
// Ontology
// ---------------------------------------------------------------------------

/// Declared vocabulary. Serializes to the flat snapshot layout
/// `{ types, relationships, constraints, synonyms }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ontology {
    #[serde(default)]
    pub types: BTreeSet<String>,
    #[serde(default)]
    pub relationships: BTreeSet<String>,
    #[serde(default)]
    pub constraints: BTreeSet<String>,
    /// alias → canonical term.
    #[serde(default)]
    pub synonyms: BTreeMap<String, String>,
}

impl Ontology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style type declaration.
    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.add_type(name);
        self
    }

    /// Builder-style relationship declaration.
    pub fn with_relationship(mut self, name: impl Into<String>) -> Self {
        self.add_relationship(name);
        self
    }

    /// Builder-style synonym declaration.
    pub fn with_synonym(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.add_synonym(alias, canonical);
        self
    }

    pub fn add_type(&mut self, name: impl Into<String>) {
        self.types.insert(name.into());
    }

    pub fn add_relationship(&mut self, name: impl Into<String>) {
        self.relationships.insert(name.into());
    }

    pub fn add_constraint(&mut self, name: impl Into<String>) {
        self.constraints.insert(name.into());
    }

    pub fn add_synonym(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.synonyms.insert(alias.into(), canonical.into());
    }

    /// No types and no relationships declared.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.relationships.is_empty()
    }

    /// Canonical form of `term`; unchanged if it has no synonym.
    pub fn resolve<'a>(&'a self, term: &'a str) -> &'a str {
        self.synonyms.get(term).map_or(term, String::as_str)
    }

    pub fn is_defined(&self, predicate: &str) -> bool {
        let resolved = self.resolve(predicate);
        self.types.contains(resolved) || self.relationships.contains(resolved)
    }

    /// Every declared term, for grounding prompts: types, relationships,
    /// then synonym aliases.
    pub fn terms(&self) -> Vec<String> {
        self.types
            .iter()
            .chain(&self.relationships)
            .chain(self.synonyms.keys())
            .cloned()
            .collect()
    }

    /// Near matches for a rejected name: candidates whose resolved name shares
    /// a three-character prefix with it or contains it.
    pub fn suggestions(&self, predicate: &str) -> Vec<String> {
        let prefix: String = predicate.chars().take(3).collect();
        let mut seen = BTreeSet::new();
        self.terms()
            .into_iter()
            .filter(|candidate| {
                let resolved = self.resolve(candidate);
                resolved.starts_with(&prefix) || resolved.contains(predicate)
            })
            .filter(|candidate| seen.insert(candidate.clone()))
            .take(MAX_SUGGESTIONS)
            .collect()
    }

    fn not_in_ontology(&self, predicate: &str) -> OntologyError {
        let suggestions = self.suggestions(predicate);
        let hint = if suggestions.is_empty() {
            "No similar terms found.".to_string()
        } else {
            format!("Did you mean: {}?", suggestions.join(", "))
        };
        OntologyError::NotInOntology {
            predicate: predicate.to_string(),
            hint,
        }
    }

    /// Check a predicate application against the declared vocabulary.
    ///
    /// Types take exactly one argument, relationships at least two.
    pub fn validate_fact<S: AsRef<str>>(&self, predicate: &str, args: &[S]) -> OntologyResult<()> {
        if !PREDICATE_NAME.is_match(predicate) {
            return Err(OntologyError::MalformedName {
                name: predicate.to_string(),
            });
        }
        let resolved = self.resolve(predicate);
        if self.types.contains(resolved) {
            if args.len() != 1 {
                return Err(OntologyError::ArityMismatch {
                    predicate: resolved.to_string(),
                    kind: "type".into(),
                    expected: "1".into(),
                    actual: args.len(),
                });
            }
            return Ok(());
        }
        if self.relationships.contains(resolved) {
            if args.len() < 2 {
                return Err(OntologyError::ArityMismatch {
                    predicate: resolved.to_string(),
                    kind: "relationship".into(),
                    expected: "at least 2".into(),
                    actual: args.len(),
                });
            }
            return Ok(());
        }
        Err(self.not_in_ontology(resolved))
    }

    /// Validate an already-lexed clause.
    pub fn validate_shape(&self, shape: &ClauseShape) -> OntologyResult<()> {
        self.validate_fact(&shape.head.name, &shape.head.args)?;
        for literal in shape.body.iter().flatten() {
            if !self.is_defined(&literal.name) {
                return Err(self.not_in_ontology(self.resolve(&literal.name)));
            }
        }
        Ok(())
    }

    /// Lex and validate clause text.
    pub fn validate_clause_text(&self, text: &str) -> OntologyResult<ClauseShape> {
        let shape = parse_clause_shape(text)?;
        self.validate_shape(&shape)?;
        Ok(shape)
    }

    /// Membership check only; constraints are opaque tokens.
    pub fn validate_constraint(&self, name: &str) -> OntologyResult<()> {
        if self.constraints.contains(self.resolve(name)) {
            Ok(())
        } else {
            Err(OntologyError::UnknownConstraint {
                name: name.to_string(),
            })
        }
    }
}
