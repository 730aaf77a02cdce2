//! Direct translation: ask the model for Prolog text outright.

use async_trait::async_trait;

use super::prompt;
use super::{TranslationRequest, TranslationResult, TranslationStrategy};
use crate::llm::ChatMessage;

pub const NAME: &str = "direct";

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectStrategy;

impl DirectStrategy {
    pub fn messages(request: &TranslationRequest<'_>) -> Vec<ChatMessage> {
        let system = format!(
            "You translate natural language into Prolog. Output only Prolog code, \
             no explanations and no Markdown. Produce {}.{}",
            prompt::target(request.mode),
            prompt::ontology_hint(request.ontology_terms),
        );
        let user = format!(
            "Input: {}{}\nOutput:",
            request.text,
            prompt::feedback_hint(request.feedback)
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

#[async_trait]
impl TranslationStrategy for DirectStrategy {
    fn name(&self) -> &str {
        NAME
    }

    async fn translate(&self, request: &TranslationRequest<'_>) -> TranslationResult<String> {
        let llm = request.require_llm()?;
        let response = llm.chat(llm.request(Self::messages(request))).await?;
        Ok(prompt::strip_code_fence(&response.content).to_string())
    }
}
