//! The root handle: shared configuration, model client, strategy registry and
//! process-wide usage counters. Sessions are created from it.

use std::sync::Arc;

use crate::agent::{LlmReasoner, ReasoningStrategy};
use crate::config::{ConfigError, LlmConfig, McrConfig};
use crate::error::McrResult;
use crate::llm::{ChatClient, MeteredClient, OllamaClient, OllamaConfig, OpenAiClient, OpenAiConfig};
use crate::metrics::{UsageCounters, UsageSnapshot};
use crate::session::{Session, SessionOptions};
use crate::translate::{StrategyRegistry, TranslationStrategy};

/// Build the configured chat client; `None` for provider `"none"`.
pub fn build_client(config: &LlmConfig) -> Result<Option<Arc<dyn ChatClient>>, ConfigError> {
    match config.provider.as_str() {
        "ollama" => Ok(Some(Arc::new(OllamaClient::new(OllamaConfig {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })))),
        "openai" => Ok(Some(Arc::new(OpenAiClient::new(OpenAiConfig {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })))),
        "none" | "" => Ok(None),
        other => Err(ConfigError::UnknownProvider {
            provider: other.to_string(),
        }),
    }
}

/// Root handle.
pub struct Mcr {
    config: McrConfig,
    client: Option<Arc<dyn ChatClient>>,
    registry: StrategyRegistry,
    reasoner: Option<Arc<dyn ReasoningStrategy>>,
    usage: Arc<UsageCounters>,
}

impl Mcr {
    /// Create a root handle with the model client named in `config.llm`.
    pub fn new(config: McrConfig) -> McrResult<Self> {
        let client = build_client(&config.llm)?;
        Ok(Self::assemble(config, client))
    }

    /// Create a root handle around an existing client.
    pub fn with_client(config: McrConfig, client: Arc<dyn ChatClient>) -> Self {
        Self::assemble(config, Some(client))
    }

    /// Create a root handle with no language model; only symbolic
    /// operations will succeed.
    pub fn without_llm(config: McrConfig) -> Self {
        Self::assemble(config, None)
    }

    fn assemble(config: McrConfig, client: Option<Arc<dyn ChatClient>>) -> Self {
        tracing::info!(
            provider = %config.llm.provider,
            model = client.as_ref().map(|c| c.model()).unwrap_or("-"),
            "mcr initialised"
        );
        Self {
            config,
            client,
            registry: StrategyRegistry::default(),
            reasoner: None,
            usage: Arc::new(UsageCounters::new()),
        }
    }

    pub fn config(&self) -> &McrConfig {
        &self.config
    }

    /// Register (or replace) a named translation strategy for sessions
    /// created after this call.
    pub fn register_strategy(
        &mut self,
        name: &str,
        strategy: Arc<dyn TranslationStrategy>,
    ) -> McrResult<()> {
        self.registry.register(name, strategy)?;
        Ok(())
    }

    pub fn strategies(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Replace the reasoning strategy used by new sessions.
    pub fn set_reasoner(&mut self, reasoner: Arc<dyn ReasoningStrategy>) {
        self.reasoner = Some(reasoner);
    }

    /// Session options from the configuration, with the configured ontology.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::from_config(&self.config.session).with_ontology(self.config.ontology.clone())
    }

    /// Create a session from the configured defaults.
    pub fn session(&self) -> Session {
        self.create_session(self.session_options())
    }

    /// Create a session. Its model calls are counted both in the session and
    /// in this handle's aggregate.
    pub fn create_session(&self, options: SessionOptions) -> Session {
        let reasoner = self.reasoner.clone().unwrap_or_else(|| {
            Arc::new(LlmReasoner::new(options.max_translation_attempts))
        });
        let mut session = Session::new(options)
            .with_registry(self.registry.clone())
            .with_reasoner(reasoner);
        if let Some(client) = &self.client {
            let metered = MeteredClient::new(client.clone())
                .with_temperature(self.config.llm.temperature)
                .with_sink(self.usage.clone());
            session = session.with_llm(metered);
        }
        session
    }

    /// Aggregate usage over every session created by this handle.
    pub fn llm_metrics(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }
}

impl std::fmt::Debug for Mcr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mcr")
            .field("provider", &self.config.llm.provider)
            .field("model", &self.client.as_ref().map(|c| c.model().to_string()))
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::FnStrategy;

    #[test]
    fn provider_selection() {
        let mut llm = LlmConfig::default();
        assert!(build_client(&llm).unwrap().is_some());
        llm.provider = "openai".into();
        assert_eq!(build_client(&llm).unwrap().unwrap().model(), "llama3.2");
        llm.provider = "none".into();
        assert!(build_client(&llm).unwrap().is_none());
        llm.provider = "carrier-pigeon".into();
        assert!(matches!(
            build_client(&llm),
            Err(ConfigError::UnknownProvider { .. })
        ));
    }

    #[test]
    fn sessions_inherit_config_and_registry() {
        let mut config = McrConfig::default();
        config.ontology.add_type("bird");
        config.session.max_reasoning_steps = 7;
        let mut mcr = Mcr::without_llm(config);
        mcr.register_strategy(
            "fixed",
            Arc::new(FnStrategy::new("fixed", |_| Box::pin(async { Ok("bird(x).".to_string()) }))),
        )
        .unwrap();
        assert!(mcr.strategies().contains(&"fixed".to_string()));

        let session = mcr.session();
        assert!(session.ontology().types.contains("bird"));
        assert_eq!(session.options().max_reasoning_steps, 7);
    }

    #[test]
    fn invalid_registration_is_rejected() {
        let mut mcr = Mcr::without_llm(McrConfig::default());
        let s: Arc<dyn TranslationStrategy> =
            Arc::new(FnStrategy::new("x", |_| Box::pin(async { Ok(String::new()) })));
        assert!(mcr.register_strategy("Not Valid", s).is_err());
    }
}
