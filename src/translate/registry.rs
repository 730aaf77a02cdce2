//! Named strategy lookup.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::{
    DirectStrategy, StructuredStrategy, TranslationError, TranslationResult, TranslationStrategy,
    direct, structured,
};

/// Order used when nothing else is selected.
pub const DEFAULT_ORDER: [&str; 2] = [direct::NAME, structured::NAME];

static STRATEGY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("valid regex"));

/// Which strategies a translation runs through.
#[derive(Clone, Default)]
pub enum StrategySelection {
    /// `direct`, then `structured`.
    #[default]
    Default,
    Named(String),
    Ordered(Vec<String>),
    /// A strategy object supplied for this call only.
    Custom(Arc<dyn TranslationStrategy>),
}

impl std::fmt::Debug for StrategySelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Named(n) => f.debug_tuple("Named").field(n).finish(),
            Self::Ordered(ns) => f.debug_tuple("Ordered").field(ns).finish(),
            Self::Custom(s) => f.debug_tuple("Custom").field(&s.name()).finish(),
        }
    }
}

impl From<Vec<String>> for StrategySelection {
    fn from(names: Vec<String>) -> Self {
        match names.len() {
            0 => Self::Default,
            1 => Self::Named(names.into_iter().next().unwrap_or_default()),
            _ => Self::Ordered(names),
        }
    }
}

/// Registered strategies keyed by name.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn TranslationStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// `direct` and `structured`, with `json` as an alias of `structured`.
    pub fn with_builtins() -> Self {
        let mut strategies: HashMap<String, Arc<dyn TranslationStrategy>> = HashMap::new();
        let structured: Arc<dyn TranslationStrategy> = Arc::new(StructuredStrategy);
        strategies.insert(direct::NAME.into(), Arc::new(DirectStrategy));
        strategies.insert(structured::NAME.into(), structured.clone());
        strategies.insert("json".into(), structured);
        Self { strategies }
    }

    /// Add or replace a strategy. Names are validated here, not at lookup.
    pub fn register(
        &mut self,
        name: &str,
        strategy: Arc<dyn TranslationStrategy>,
    ) -> TranslationResult<()> {
        if !STRATEGY_NAME.is_match(name) {
            return Err(TranslationError::InvalidRegistration {
                name: name.to_string(),
                reason: "names must be lowercase identifiers".into(),
            });
        }
        if self.strategies.insert(name.to_string(), strategy).is_some() {
            tracing::info!(strategy = name, "translation strategy replaced");
        } else {
            tracing::info!(strategy = name, "translation strategy registered");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> TranslationResult<Arc<dyn TranslationStrategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| TranslationError::UnknownStrategy {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    /// Turn a selection into the concrete, ordered strategy list.
    pub fn resolve(
        &self,
        selection: &StrategySelection,
    ) -> TranslationResult<Vec<Arc<dyn TranslationStrategy>>> {
        match selection {
            StrategySelection::Default => DEFAULT_ORDER.iter().map(|n| self.get(n)).collect(),
            StrategySelection::Named(name) => Ok(vec![self.get(name)?]),
            StrategySelection::Ordered(names) if names.is_empty() => {
                self.resolve(&StrategySelection::Default)
            }
            StrategySelection::Ordered(names) => names.iter().map(|n| self.get(n)).collect(),
            StrategySelection::Custom(strategy) => Ok(vec![strategy.clone()]),
        }
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
