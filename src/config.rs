//! TOML configuration for the root handle and its sessions.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ontology::Ontology;

/// Errors from loading or saving configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(mcr::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config: {path}")]
    #[diagnostic(code(mcr::config::write))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    #[diagnostic(
        code(mcr::config::parse),
        help("Check the TOML syntax and field names against the documented layout.")
    )]
    Parse { path: String, message: String },

    #[error("unknown llm provider \"{provider}\"")]
    #[diagnostic(
        code(mcr::config::unknown_provider),
        help("Supported providers: \"ollama\", \"openai\", \"none\".")
    )]
    UnknownProvider { provider: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McrConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Ontology new sessions start with.
    #[serde(default)]
    pub ontology: Ontology,
}

/// Language-model connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `"ollama"`, `"openai"` or `"none"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token for `"openai"`.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.2".into()
}
fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            temperature: 0.0,
        }
    }
}

/// Defaults applied to every new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_translation_attempts")]
    pub max_translation_attempts: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_reasoning_steps")]
    pub max_reasoning_steps: usize,
    /// Strategy names, tried in order.
    #[serde(default = "default_translator")]
    pub translator: Vec<String>,
    #[serde(default = "default_sub_symbolic_confidence")]
    pub sub_symbolic_confidence: f64,
    #[serde(default = "default_max_solutions")]
    pub max_solutions: usize,
    #[serde(default = "default_max_inferences")]
    pub max_inferences: u64,
}

fn default_max_translation_attempts() -> usize {
    2
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_max_reasoning_steps() -> usize {
    5
}
fn default_translator() -> Vec<String> {
    vec!["direct".into(), "structured".into()]
}
fn default_sub_symbolic_confidence() -> f64 {
    0.7
}
fn default_max_solutions() -> usize {
    100
}
fn default_max_inferences() -> u64 {
    1_000_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_translation_attempts: default_max_translation_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_reasoning_steps: default_max_reasoning_steps(),
            translator: default_translator(),
            sub_symbolic_confidence: default_sub_symbolic_confidence(),
            max_solutions: default_max_solutions(),
            max_inferences: default_max_inferences(),
        }
    }
}

impl McrConfig {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<string>".into(),
            message: e.to_string(),
        })
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<string>".into(),
            message: e.to_string(),
        })
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = McrConfig::from_toml_str("").unwrap();
        assert_eq!(config, McrConfig::default());
        assert_eq!(config.session.max_translation_attempts, 2);
        assert_eq!(config.session.retry_delay_ms, 500);
        assert_eq!(config.session.max_reasoning_steps, 5);
        assert_eq!(config.session.sub_symbolic_confidence, 0.7);
        assert_eq!(config.llm.provider, "ollama");
    }

    #[test]
    fn partial_sections() {
        let config = McrConfig::from_toml_str(
            r#"
            [llm]
            provider = "openai"
            model = "gpt-4o-mini"

            [session]
            translator = ["structured"]

            [ontology]
            types = ["bird"]
            synonyms = { avian = "bird" }
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.session.translator, vec!["structured"]);
        assert_eq!(config.session.max_inferences, 1_000_000);
        assert!(config.ontology.is_defined("avian"));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = McrConfig::default();
        config.ontology.add_type("bird");
        let text = config.to_toml_string().unwrap();
        assert_eq!(McrConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn bad_toml_is_parse_error() {
        assert!(matches!(
            McrConfig::from_toml_str("[session\nmax = 1"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
