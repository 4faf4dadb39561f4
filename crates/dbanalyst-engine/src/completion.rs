//! Completion capability
//!
//! Nodes ask for decisions through [`CompletionCapability`]. The shipped
//! implementation, [`LlmCompletion`], sends the rendered prompt to an
//! [`LlmBackend`] and parses the reply according to the prompt kind.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use dbanalyst_error_redaction::redact_error_message;
use dbanalyst_llm::{LlmBackend, LlmError, LlmInvocation, Message};
use dbanalyst_prompt_template::{PromptKind, RenderedPrompt};

/// ```` ```json ... ``` ```` block anywhere in a reply
static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("valid regex")
});

/// A request for one decision
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub session_id: String,
    pub prompt: RenderedPrompt,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(session_id: impl Into<String>, prompt: RenderedPrompt) -> Self {
        Self {
            session_id: session_id.into(),
            prompt,
        }
    }

    #[must_use]
    pub fn kind(&self) -> PromptKind {
        self.prompt.kind
    }
}

/// Structured result of a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Plan(Vec<String>),
    Sql(String),
    Answer(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// Network, quota, budget or timeout failure
    #[error("completion unavailable: {0}")]
    Unavailable(String),

    /// The reply could not be turned into the requested structure
    #[error("completion malformed: {0}")]
    Malformed(String),
}

impl From<LlmError> for CompletionError {
    fn from(err: LlmError) -> Self {
        Self::Unavailable(redact_error_message(&err.to_string()))
    }
}

/// Produces plans, SQL and answers
#[async_trait]
pub trait CompletionCapability: Send + Sync {
    /// # Errors
    ///
    /// [`CompletionError::Unavailable`] when no reply was obtained,
    /// [`CompletionError::Malformed`] when the reply has the wrong shape.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError>;
}

/// [`CompletionCapability`] backed by an LLM provider
pub struct LlmCompletion {
    backend: Arc<dyn LlmBackend>,
    model: String,
    timeout: Duration,
}

impl LlmCompletion {
    /// Uses the backend's configured model
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            model: String::new(),
            timeout,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl CompletionCapability for LlmCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let kind = request.kind();
        let invocation = LlmInvocation::new(
            request.session_id,
            kind.as_str(),
            self.model.clone(),
            self.timeout,
            vec![
                Message::system(request.prompt.system),
                Message::user(request.prompt.user),
            ],
        );

        let result = self.backend.invoke(invocation).await?;
        debug!(
            kind = %kind,
            provider = %result.provider,
            model = %result.model_used,
            tokens_output = ?result.tokens_output,
            "Completion received"
        );
        parse_reply(kind, &result.raw_response)
    }
}

#[derive(Deserialize)]
struct PlanReply {
    plan: Vec<String>,
}

/// Interpret a raw model reply for `kind`
///
/// # Errors
///
/// Returns [`CompletionError::Malformed`] when a plan reply holds no
/// `{"plan": [...]}` object or any reply is empty.
pub fn parse_reply(kind: PromptKind, raw: &str) -> Result<Completion, CompletionError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(CompletionError::Malformed(format!("empty {kind} reply")));
    }
    match kind {
        PromptKind::Plan => {
            let json = extract_json_object(text).ok_or_else(|| {
                CompletionError::Malformed("plan reply contains no JSON object".to_string())
            })?;
            let reply: PlanReply = serde_json::from_str(json)
                .map_err(|e| CompletionError::Malformed(format!("invalid plan JSON: {e}")))?;
            Ok(Completion::Plan(reply.plan))
        }
        PromptKind::GenerateSql | PromptKind::CorrectSql => Ok(Completion::Sql(text.to_string())),
        PromptKind::Synthesize => Ok(Completion::Answer(text.to_string())),
    }
}

/// Fenced JSON block if present, otherwise the outermost `{...}` span
fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(caps) = JSON_FENCE.captures(text) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
