//! Prompt fragments shared by the LLM-backed strategies.

use super::TranslationMode;

/// `"\n\nAvailable ontology terms: a, b"`, or nothing when there are none.
pub fn ontology_hint(terms: &[String]) -> String {
    if terms.is_empty() {
        String::new()
    } else {
        format!("\n\nAvailable ontology terms: {}", terms.join(", "))
    }
}

/// The previous attempt's rejection, if any.
pub fn feedback_hint(feedback: Option<&str>) -> String {
    match feedback {
        Some(f) => format!("\n\nFeedback on your previous attempt: {f}"),
        None => String::new(),
    }
}

/// What to ask for, per mode.
pub fn target(mode: TranslationMode) -> &'static str {
    match mode {
        TranslationMode::Clause => {
            "a single Prolog fact or rule, terminated with a period. \
             Example: \"All men are mortal.\" becomes \"mortal(X) :- man(X).\""
        }
        TranslationMode::Query => {
            "a single Prolog query with NO trailing period. \
             Example: \"Is Tweety a bird?\" becomes \"bird(tweety)\"; \
             \"Who is a bird?\" becomes \"bird(X)\""
        }
    }
}

/// Remove a surrounding Markdown code fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`prolog`, `json`, ...) on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
