//! Result objects returned by session operations.
//!
//! Documented operations never hand back a bare error: failures are folded
//! into these records with `success = false` and a readable `error`.

use serde::{Deserialize, Serialize};

use crate::prolog::Solution;

/// Outcome of asserting or retracting a clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertResult {
    pub success: bool,
    /// The clause as stored (or as attempted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clause: Option<String>,
    /// Translation strategy that produced the clause, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssertResult {
    pub fn ok(clause: impl Into<String>) -> Self {
        Self {
            success: true,
            clause: Some(clause.into()),
            ..Default::default()
        }
    }

    pub fn failed(clause: Option<String>, error: impl ToString) -> Self {
        Self {
            success: false,
            clause,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }
}

/// Outcome of a symbolic (or fallback) query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    /// The goal that was run, without terminator.
    pub query: String,
    /// One rendered binding string per solution; ground successes add none.
    pub bindings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub solutions: Vec<Solution>,
    pub confidence: f64,
    /// Set when the answer came from the language model instead of a proof.
    #[serde(default)]
    pub sub_symbolic: bool,
    /// Natural-language answer from the fallback path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn failed(query: impl Into<String>, error: impl ToString) -> Self {
        Self {
            success: false,
            query: query.into(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    /// First binding value that is a literal truth token, mapped to
    /// `"Yes"` / `"No"`.
    pub fn truth_answer(&self) -> Option<&'static str> {
        self.solutions
            .iter()
            .flat_map(|s| &s.bindings)
            .find_map(|b| match b.value.to_ascii_lowercase().as_str() {
                "true" | "yes" => Some("Yes"),
                "false" | "no" => Some("No"),
                _ => None,
            })
    }
}

/// Outcome of a reasoning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResult {
    /// False only when the run aborted with an error.
    pub success: bool,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub confidence: f64,
    /// Human-readable trace of every step taken.
    pub steps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prolog::Binding;

    fn with_value(value: &str) -> QueryResult {
        QueryResult {
            success: true,
            solutions: vec![Solution {
                bindings: vec![Binding {
                    var: "X".into(),
                    value: value.into(),
                }],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn truth_tokens() {
        assert_eq!(with_value("true").truth_answer(), Some("Yes"));
        assert_eq!(with_value("yes").truth_answer(), Some("Yes"));
        assert_eq!(with_value("false").truth_answer(), Some("No"));
        assert_eq!(with_value("No").truth_answer(), Some("No"));
        assert_eq!(with_value("tweety").truth_answer(), None);
        assert_eq!(QueryResult::default().truth_answer(), None);
    }

    #[test]
    fn failure_constructors() {
        let a = AssertResult::failed(Some("fish(nemo).".into()), "not in ontology");
        assert!(!a.success);
        assert_eq!(a.error.as_deref(), Some("not in ontology"));
        let q = QueryResult::failed("bird(X)", "boom");
        assert_eq!(q.confidence, 0.0);
        assert!(q.bindings.is_empty());
    }

    #[test]
    fn assert_result_json_omits_empty_fields() {
        let json = serde_json::to_value(AssertResult::ok("bird(tweety).")).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
    }
}
