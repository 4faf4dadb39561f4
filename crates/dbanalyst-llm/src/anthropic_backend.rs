//! Anthropic Messages API backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dbanalyst_config::Config;

use crate::LlmError;
use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};
use crate::{HttpParams, resolve_model, resolve_params};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub(crate) struct AnthropicBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl AnthropicBackend {
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

    /// Build from `[llm.anthropic]`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key environment variable
    /// is unset or no model is configured.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let section = config.llm.anthropic.clone().unwrap_or_default();

        let api_key_env = section.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "Anthropic API key not found in environment variable '{api_key_env}'. \
                 Please set this variable or configure a different api_key_env in [llm.anthropic]."
            ))
        })?;

        let default_model = resolve_model(config, section.model.as_deref(), "anthropic")?;
        let mut default_params = HttpParams::default();
        if let Some(max_tokens) = section.max_tokens {
            default_params.max_tokens = max_tokens;
        }
        if let Some(temperature) = section.temperature {
            default_params.temperature = temperature;
        }

        Self::new(api_key, section.base_url, default_model, default_params)
    }

    /// Split system messages into the top-level `system` field
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_prompt: Option<String> = None;
        let mut anthropic_messages = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => match system_prompt.as_mut() {
                    Some(existing) => {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    }
                    None => system_prompt = Some(msg.content.clone()),
                },
                Role::User => anthropic_messages.push(AnthropicMessage {
                    role: "user",
                    content: msg.content.clone(),
                }),
                Role::Assistant => anthropic_messages.push(AnthropicMessage {
                    role: "assistant",
                    content: msg.content.clone(),
                }),
            }
        }

        (system_prompt, anthropic_messages)
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = resolve_params(&inv, &self.default_model, &self.default_params);

        debug!(
            provider = "anthropic",
            model = %model,
            purpose = %inv.purpose,
            session_id = %inv.session_id,
            max_tokens = params.max_tokens,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let (system, messages) = Self::convert_messages(&inv.messages);
        let request_body = AnthropicRequest {
            model: &model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system,
        };

        let request = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, "anthropic")
            .await?;

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to parse Anthropic response: {e}")))?;

        let content: String = body
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.is_empty() {
            return Err(LlmError::Transport(
                "Anthropic response missing text content".to_string(),
            ));
        }

        let mut result = LlmResult::new(content, "anthropic", model);
        if let Some(usage) = body.usage {
            result = result.with_tokens(usage.input_tokens, usage.output_tokens);
        }

        debug!(
            provider = "anthropic",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Anthropic invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbanalyst_config::AnthropicConfig;
    use serial_test::serial;

    #[test]
    fn test_convert_messages_separates_system() {
        let messages = vec![
            Message::system("You write SQL"),
            Message::system("Reply with SQL only"),
            Message::user("count users"),
            Message::assistant("SELECT 1"),
        ];

        let (system, converted) = AnthropicBackend::convert_messages(&messages);

        assert_eq!(
            system.as_deref(),
            Some("You write SQL\n\nReply with SQL only")
        );
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[1].role, "assistant");
    }

    #[test]
    fn test_request_body_shape() {
        let body = AnthropicRequest {
            model: "claude-test",
            messages: vec![AnthropicMessage {
                role: "user",
                content: "hi".into(),
            }],
            max_tokens: 100,
            temperature: 0.0,
            system: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "claude-test");
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    #[serial]
    fn test_new_from_config_missing_api_key() {
        let env_var = "DBANALYST_TEST_ANTHROPIC_KEY_MISSING";
        unsafe { std::env::remove_var(env_var) };

        let mut config = Config::builder().build().unwrap();
        config.llm.anthropic = Some(AnthropicConfig {
            api_key_env: Some(env_var.to_string()),
            model: Some("claude-test".to_string()),
            ..AnthropicConfig::default()
        });

        match AnthropicBackend::new_from_config(&config) {
            Err(LlmError::Misconfiguration(msg)) => {
                assert!(msg.contains(env_var), "got: {msg}");
                assert!(msg.contains("not found"), "got: {msg}");
            }
            _ => panic!("Expected Misconfiguration error for missing API key"),
        }
    }

    #[test]
    #[serial]
    fn test_new_from_config_uses_section_values() {
        let env_var = "DBANALYST_TEST_ANTHROPIC_KEY_PRESENT";
        unsafe { std::env::set_var(env_var, "test-key") };

        let mut config = Config::builder().build().unwrap();
        config.llm.anthropic = Some(AnthropicConfig {
            api_key_env: Some(env_var.to_string()),
            model: Some("claude-test".to_string()),
            max_tokens: Some(512),
            base_url: Some("http://localhost:1/v1/messages".to_string()),
            temperature: None,
        });

        let backend = AnthropicBackend::new_from_config(&config);
        unsafe { std::env::remove_var(env_var) };

        let backend = backend.unwrap();
        assert_eq!(backend.default_model, "claude-test");
        assert_eq!(backend.default_params.max_tokens, 512);
        assert_eq!(backend.base_url, "http://localhost:1/v1/messages");
    }
}
