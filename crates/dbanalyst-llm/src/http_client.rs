//! Shared HTTP client for HTTP-based LLM providers
//!
//! One `reqwest::Client` per backend, with connection pooling, a global timeout
//! cap and retry with backoff for 5xx and network failures.

use dbanalyst_error_redaction::redact_error_message;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::LlmError;

/// Upper bound for any single request
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries for 5xx and network failures
const MAX_RETRIES: u32 = 2;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
    initial_backoff: Duration,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, LlmError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    /// Request builder bound to the shared client
    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url)
    }

    /// Execute an HTTP request with timeout and retry policy
    ///
    /// - Per-request timeout: `min(request_timeout, max_timeout)`
    /// - Up to 2 retries for 5xx and network failures, linear backoff 1s, 2s
    /// - No retries for 4xx or timeouts
    ///
    /// # Errors
    ///
    /// - `ProviderAuth` for 401/403
    /// - `ProviderQuota` for 429
    /// - `ProviderOutage` for 5xx after retries
    /// - `Timeout` when the request exceeds its timeout
    /// - `Transport` for network errors after retries and other 4xx
    pub async fn execute_with_retry(
        &self,
        request_builder: reqwest::RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, LlmError> {
        let effective_timeout = request_timeout.min(self.max_timeout);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| LlmError::Transport("Failed to clone request for retry".to_string()))?
                .timeout(effective_timeout)
                .build()
                .map_err(|e| LlmError::Transport(format!("Failed to build request: {e}")))?;

            debug!(
                provider = provider_name,
                attempt,
                timeout_secs = effective_timeout.as_secs(),
                "Executing HTTP request"
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_client_error() {
                        return Err(map_client_error(status, provider_name));
                    }

                    if status.is_server_error() {
                        if attempt <= MAX_RETRIES {
                            warn!(
                                provider = provider_name,
                                attempt,
                                status = status.as_u16(),
                                "Server error, will retry"
                            );
                            tokio::time::sleep(self.initial_backoff * attempt).await;
                            continue;
                        }
                        return Err(LlmError::ProviderOutage(format!(
                            "{provider_name} returned server error: {status}"
                        )));
                    }

                    return Ok(response);
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(LlmError::Timeout {
                            duration: effective_timeout,
                        });
                    }

                    let message = redact_error_message(&e.to_string());
                    if attempt <= MAX_RETRIES {
                        warn!(
                            provider = provider_name,
                            attempt,
                            error = %message,
                            "Network error, will retry"
                        );
                        tokio::time::sleep(self.initial_backoff * attempt).await;
                        continue;
                    }

                    return Err(LlmError::Transport(format!(
                        "{provider_name} request failed: {message}"
                    )));
                }
            }
        }
    }
}

/// Map 4xx status codes to `LlmError` variants
fn map_client_error(status: StatusCode, provider_name: &str) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::ProviderAuth(format!("{provider_name} authentication failed: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            LlmError::ProviderQuota(format!("{provider_name} rate limit exceeded: {status}"))
        }
        _ => LlmError::Transport(format!("{provider_name} returned client error: {status}")),
    }
}
