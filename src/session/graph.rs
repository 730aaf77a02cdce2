//! Knowledge-graph export of a session's program and ontology.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ontology::{Ontology, parse_clause_shape};

/// Export format for [`Session::knowledge_graph`](super::Session::knowledge_graph).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeGraphFormat {
    /// The clause text, one clause per line.
    #[default]
    Prolog,
    /// A [`KnowledgeGraph`] as JSON.
    Json,
}

impl FromStr for KnowledgeGraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prolog" | "pl" => Ok(Self::Prolog),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown knowledge graph format: {other}")),
        }
    }
}

/// Structured decomposition of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub facts: Vec<String>,
    pub rules: Vec<String>,
    pub entities: Vec<String>,
    pub relationships: Vec<String>,
    pub constraints: Vec<String>,
}

impl KnowledgeGraph {
    pub fn build(program: &[String], ontology: &Ontology) -> Self {
        let (rules, facts): (Vec<String>, Vec<String>) = program
            .iter()
            .cloned()
            .partition(|clause| match parse_clause_shape(clause) {
                Ok(shape) => shape.is_rule(),
                Err(_) => clause.contains(":-"),
            });
        Self {
            facts,
            rules,
            entities: ontology.types.iter().cloned().collect(),
            relationships: ontology.relationships.iter().cloned().collect(),
            constraints: ontology.constraints.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_facts_and_rules() {
        let program = vec![
            "bird(tweety).".to_string(),
            "has_wings(X) :- bird(X).".to_string(),
        ];
        let ontology = Ontology::new().with_type("bird").with_type("has_wings");
        let g = KnowledgeGraph::build(&program, &ontology);
        assert_eq!(g.facts, vec!["bird(tweety)."]);
        assert_eq!(g.rules, vec!["has_wings(X) :- bird(X)."]);
        assert_eq!(g.entities, vec!["bird", "has_wings"]);
    }

    #[test]
    fn format_parsing() {
        assert_eq!("JSON".parse::<KnowledgeGraphFormat>(), Ok(KnowledgeGraphFormat::Json));
        assert_eq!("prolog".parse::<KnowledgeGraphFormat>(), Ok(KnowledgeGraphFormat::Prolog));
        assert!("xml".parse::<KnowledgeGraphFormat>().is_err());
    }
}
