//! OpenRouter backend (OpenAI-compatible chat completions)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dbanalyst_config::Config;

use crate::LlmError;
use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};
use crate::{HttpParams, resolve_model, resolve_params};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const DEFAULT_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const DEFAULT_TITLE: &str = "dbanalyst";

#[derive(Clone)]
pub(crate) struct OpenRouterBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl OpenRouterBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be constructed
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: HttpClient::new()?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            default_params,
        })
    }

    /// Build from `[llm.openrouter]`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key environment variable
    /// is unset or no model is configured.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let section = config.llm.openrouter.clone().unwrap_or_default();

        let api_key_env = section.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "OpenRouter API key not found in environment variable '{api_key_env}'. \
                 Please set this variable or configure a different api_key_env in [llm.openrouter]."
            ))
        })?;

        let default_model = resolve_model(config, section.model.as_deref(), "openrouter")?;
        let mut default_params = HttpParams::default();
        if let Some(max_tokens) = section.max_tokens {
            default_params.max_tokens = max_tokens;
        }
        if let Some(temperature) = section.temperature {
            default_params.temperature = temperature;
        }

        Self::new(api_key, section.base_url, default_model, default_params)
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage<'_>> {
        messages
            .iter()
            .map(|msg| ChatMessage {
                role: match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &msg.content,
            })
            .collect()
    }
}

#[async_trait]
impl LlmBackend for OpenRouterBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = resolve_params(&inv, &self.default_model, &self.default_params);

        debug!(
            provider = "openrouter",
            model = %model,
            purpose = %inv.purpose,
            session_id = %inv.session_id,
            max_tokens = params.max_tokens,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking OpenRouter backend"
        );

        let request_body = ChatRequest {
            model: &model,
            messages: Self::convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let request = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("X-Title", DEFAULT_TITLE)
            .header("content-type", "application/json")
            .json(&request_body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, "openrouter")
            .await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to parse OpenRouter response: {e}")))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                LlmError::Transport("OpenRouter response missing message content".to_string())
            })?;

        let model_used = body.model.unwrap_or(model);
        let mut result = LlmResult::new(content, "openrouter", model_used);
        if let Some(usage) = body.usage {
            result = result.with_tokens(usage.prompt_tokens, usage.completion_tokens);
        }

        debug!(
            provider = "openrouter",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "OpenRouter invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
