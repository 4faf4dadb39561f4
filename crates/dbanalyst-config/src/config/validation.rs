use dbanalyst_utils::error::ConfigError;

use super::Config;

/// Providers a `[llm] provider` value may name
pub const SUPPORTED_PROVIDERS: &[&str] = &["anthropic", "openrouter"];

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

fn check_range<T>(key: &str, value: Option<T>, min: T, max: T, unit: &str) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if let Some(value) = value {
        if value < min {
            return Err(invalid(key, format!("must be at least {min}{unit}")));
        }
        if value > max {
            return Err(invalid(key, format!("exceeds maximum limit of {max}{unit}")));
        }
    }
    Ok(())
}

impl Config {
    /// Validate configuration values
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        check_range("max_attempts", self.defaults.max_attempts, 1, 10, "")?;
        check_range(
            "completion_timeout",
            self.defaults.completion_timeout,
            1,
            3600,
            " seconds",
        )?;
        check_range(
            "query_timeout",
            self.defaults.query_timeout,
            1,
            3600,
            " seconds",
        )?;
        check_range("max_plan_steps", self.defaults.max_plan_steps, 1, 20, "")?;
        check_range(
            "max_context_rows",
            self.defaults.max_context_rows,
            1,
            10_000,
            "",
        )?;

        if let Some(provider) = &self.llm.provider
            && !SUPPORTED_PROVIDERS.contains(&provider.as_str())
        {
            return Err(invalid(
                "llm_provider",
                format!(
                    "'{provider}' is not supported. Must be one of: {}",
                    SUPPORTED_PROVIDERS.join(", ")
                ),
            ));
        }

        if let Some(fallback) = &self.llm.fallback_provider {
            if !SUPPORTED_PROVIDERS.contains(&fallback.as_str()) {
                return Err(invalid(
                    "llm_fallback_provider",
                    format!(
                        "'{fallback}' is not supported. Must be one of: {}",
                        SUPPORTED_PROVIDERS.join(", ")
                    ),
                ));
            }
            if self.llm.provider.as_deref() == Some(fallback.as_str()) {
                return Err(invalid(
                    "llm_fallback_provider",
                    "must differ from the primary provider",
                ));
            }
        }

        if let Some(model) = &self.llm.model
            && model.trim().is_empty()
        {
            return Err(invalid("llm_model", "must not be empty"));
        }

        if let Some(anthropic) = &self.llm.anthropic {
            check_range("llm.anthropic.max_tokens", anthropic.max_tokens, 1, 200_000, "")?;
            check_range(
                "llm.anthropic.temperature",
                anthropic.temperature,
                0.0,
                1.0,
                "",
            )?;
        }

        if let Some(openrouter) = &self.llm.openrouter {
            check_range(
                "llm.openrouter.max_tokens",
                openrouter.max_tokens,
                1,
                200_000,
                "",
            )?;
            check_range(
                "llm.openrouter.temperature",
                openrouter.temperature,
                0.0,
                2.0,
                "",
            )?;
            check_range("llm.openrouter.budget", openrouter.budget, 1, 10_000, "")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnthropicConfig, OnExhausted};

    #[test]
    fn test_max_attempts_bounds() {
        assert!(Config::builder().max_attempts(1).build().is_ok());
        assert!(Config::builder().max_attempts(10).build().is_ok());

        let err = Config::builder().max_attempts(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "max_attempts"));

        let err = Config::builder().max_attempts(11).build().unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_timeouts_must_be_positive() {
        let err = Config::builder()
            .query_timeout(std::time::Duration::from_millis(500))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "query_timeout"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = Config::builder().llm_provider("gemini-cli").build().unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_fallback_must_differ() {
        let mut config = Config::builder()
            .llm_provider("anthropic")
            .on_exhausted(OnExhausted::Continue)
            .build()
            .unwrap();
        config.llm.fallback_provider = Some("anthropic".to_string());
        assert!(config.validate().is_err());

        config.llm.fallback_provider = Some("openrouter".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_anthropic_temperature_range() {
        let mut config = Config::builder().build().unwrap();
        config.llm.anthropic = Some(AnthropicConfig {
            temperature: Some(1.5),
            ..AnthropicConfig::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("llm.anthropic.temperature"));
    }
}
