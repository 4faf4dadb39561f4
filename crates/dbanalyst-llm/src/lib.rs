//! LLM backend abstraction for multi-provider support
//!
//! Every provider implements [`LlmBackend`]. The engine never sees provider
//! details: it talks to a backend through its completion adapter.

mod anthropic_backend;
mod budgeted_backend;
pub(crate) mod http_client;
mod openrouter_backend;
mod types;

pub use budgeted_backend::{BUDGET_ENV_VAR, BudgetedBackend};
pub use dbanalyst_utils::error::LlmError;
pub use types::{LlmBackend, LlmFallbackInfo, LlmInvocation, LlmResult, Message, Role};

pub(crate) use anthropic_backend::AnthropicBackend;
pub(crate) use openrouter_backend::OpenRouterBackend;

use dbanalyst_config::Config;
use dbanalyst_error_redaction::redact_error_message_for_logging;
use tracing::{error, warn};

/// Request parameters shared by the HTTP backends
#[derive(Debug, Clone)]
pub(crate) struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.1,
        }
    }
}

/// Resolve model and parameters for one invocation.
///
/// `inv.model` overrides the backend default when non-empty;
/// `metadata["max_tokens"]` and `metadata["temperature"]` override the
/// configured parameters.
pub(crate) fn resolve_params(
    inv: &LlmInvocation,
    default_model: &str,
    defaults: &HttpParams,
) -> (String, HttpParams) {
    let model = if inv.model.is_empty() {
        default_model.to_string()
    } else {
        inv.model.clone()
    };

    let max_tokens = inv
        .metadata
        .get("max_tokens")
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(defaults.max_tokens);

    let temperature = inv
        .metadata
        .get("temperature")
        .and_then(serde_json::Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(defaults.temperature);

    (
        model,
        HttpParams {
            max_tokens,
            temperature,
        },
    )
}

/// Model for a provider: `[llm] model` (or `--model`) wins over the
/// provider section's `model`.
pub(crate) fn resolve_model(
    config: &Config,
    section_model: Option<&str>,
    provider: &str,
) -> Result<String, LlmError> {
    config
        .llm
        .model
        .as_deref()
        .or(section_model)
        .map(str::to_string)
        .ok_or_else(|| {
            LlmError::Misconfiguration(format!(
                "{provider} model not specified in configuration. \
                 Please set [llm.{provider}] model = \"model-name\" or pass --model."
            ))
        })
}

/// Construct a backend for a single provider, without fallback.
///
/// # Errors
///
/// Returns `LlmError::Unsupported` for unknown providers and
/// `LlmError::Misconfiguration` for invalid provider configuration.
pub fn construct_backend_for_provider(
    provider: &str,
    config: &Config,
) -> Result<Box<dyn LlmBackend>, LlmError> {
    match provider {
        "anthropic" => Ok(Box::new(AnthropicBackend::new_from_config(config)?)),
        "openrouter" => {
            let backend = OpenRouterBackend::new_from_config(config)?;
            let config_budget = config.llm.openrouter.as_ref().and_then(|or| or.budget);
            Ok(Box::new(BudgetedBackend::with_limit_from_config(
                Box::new(backend),
                config_budget,
            )))
        }
        unknown => Err(LlmError::Unsupported(format!(
            "Unknown LLM provider '{unknown}'. Supported providers: anthropic, openrouter."
        ))),
    }
}

/// Create the configured backend, falling back to `[llm] fallback_provider`
/// when the primary cannot be constructed.
///
/// # Errors
///
/// Returns the primary provider's error when both primary and fallback fail
/// (or no fallback is configured).
pub fn from_config_with_fallback(
    config: &Config,
) -> Result<(Box<dyn LlmBackend>, Option<LlmFallbackInfo>), LlmError> {
    let provider = config.llm_provider();

    let primary_error = match construct_backend_for_provider(provider, config) {
        Ok(backend) => return Ok((backend, None)),
        Err(e) => e,
    };

    let Some(fallback_provider) = config.llm.fallback_provider.as_deref() else {
        return Err(primary_error);
    };

    let reason = redact_error_message_for_logging(&primary_error.to_string());
    warn!(
        primary = provider,
        fallback = fallback_provider,
        reason = %reason,
        "Primary LLM provider failed during construction, trying fallback"
    );

    match construct_backend_for_provider(fallback_provider, config) {
        Ok(backend) => Ok((
            backend,
            Some(LlmFallbackInfo {
                primary_provider: provider.to_string(),
                fallback_provider: fallback_provider.to_string(),
                reason,
            }),
        )),
        Err(fallback_error) => {
            error!(
                fallback = fallback_provider,
                error = %redact_error_message_for_logging(&fallback_error.to_string()),
                "Fallback LLM provider also failed"
            );
            Err(primary_error)
        }
    }
}

/// Create the configured backend, discarding fallback metadata.
///
/// # Errors
///
/// See [`from_config_with_fallback`].
pub fn from_config(config: &Config) -> Result<Box<dyn LlmBackend>, LlmError> {
    from_config_with_fallback(config).map(|(backend, _)| backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbanalyst_config::{AnthropicConfig, OpenRouterConfig};
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    fn test_resolve_params_defaults_and_overrides() {
        let defaults = HttpParams {
            max_tokens: 1024,
            temperature: 0.5,
        };
        let inv = LlmInvocation::new("s", "plan", "", Duration::from_secs(1), vec![]);
        let (model, params) = resolve_params(&inv, "default-model", &defaults);
        assert_eq!(model, "default-model");
        assert_eq!(params.max_tokens, 1024);

        let inv = LlmInvocation::new("s", "plan", "custom", Duration::from_secs(1), vec![])
            .with_metadata("max_tokens", serde_json::json!(64))
            .with_metadata("temperature", serde_json::json!(0.0));
        let (model, params) = resolve_params(&inv, "default-model", &defaults);
        assert_eq!(model, "custom");
        assert_eq!(params.max_tokens, 64);
        assert_eq!(params.temperature, 0.0);
    }

    #[test]
    fn test_resolve_model_prefers_global_override() {
        let config = Config::builder().model("override").build().unwrap();
        assert_eq!(
            resolve_model(&config, Some("section"), "anthropic").unwrap(),
            "override"
        );

        let config = Config::builder().build().unwrap();
        assert_eq!(
            resolve_model(&config, Some("section"), "anthropic").unwrap(),
            "section"
        );
        assert!(matches!(
            resolve_model(&config, None, "anthropic"),
            Err(LlmError::Misconfiguration(_))
        ));
    }

    #[test]
    fn test_unknown_provider_is_unsupported() {
        let config = Config::builder().build().unwrap();
        assert!(matches!(
            construct_backend_for_provider("gemini-cli", &config),
            Err(LlmError::Unsupported(_))
        ));
    }

    #[test]
    #[serial]
    fn test_fallback_used_when_primary_misconfigured() {
        let missing = "DBA_TEST_FB_ANTH_KEY";
        let present = "DBA_TEST_FB_OR_KEY";
        unsafe {
            std::env::remove_var(missing);
            std::env::set_var(present, "test-key");
        }

        let mut config = Config::builder()
            .llm_provider("anthropic")
            .fallback_provider("openrouter")
            .build()
            .unwrap();
        config.llm.anthropic = Some(AnthropicConfig {
            api_key_env: Some(missing.to_string()),
            model: Some("claude-test".to_string()),
            ..AnthropicConfig::default()
        });
        config.llm.openrouter = Some(OpenRouterConfig {
            api_key_env: Some(present.to_string()),
            model: Some("openrouter/test".to_string()),
            ..OpenRouterConfig::default()
        });

        let result = from_config_with_fallback(&config);
        unsafe { std::env::remove_var(present) };

        let (_backend, info) = result.unwrap();
        let info = info.expect("fallback info");
        assert_eq!(info.primary_provider, "anthropic");
        assert_eq!(info.fallback_provider, "openrouter");
        assert!(info.reason.contains(missing));
    }

    #[test]
    #[serial]
    fn test_primary_error_returned_without_fallback() {
        let missing = "DBANALYST_TEST_NOFALLBACK_KEY";
        unsafe { std::env::remove_var(missing) };

        let mut config = Config::builder().llm_provider("anthropic").build().unwrap();
        config.llm.anthropic = Some(AnthropicConfig {
            api_key_env: Some(missing.to_string()),
            model: Some("claude-test".to_string()),
            ..AnthropicConfig::default()
        });

        assert!(matches!(
            from_config(&config),
            Err(LlmError::Misconfiguration(_))
        ));
    }
}
