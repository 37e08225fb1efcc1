//! HTTP client for the completion endpoint
//!
//! Surfaces typed failures and performs no automatic retry; backoff is the
//! caller's decision.

use super::models::{ApiErrorBody, CompletionRequest, CompletionResponse};
use crate::metrics::METRICS;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Feature flag enabling the provider's prompt-caching behavior
const PROMPT_CACHING_BETA: &str = "prompt-caching-2024-07-31";

const API_VERSION: &str = "2023-06-01";

/// Completion endpoint failure, categorized for the caller
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream rate limited: {0}")]
    RateLimited(String),

    #[error("Upstream authentication failed: {0}")]
    Authentication(String),

    #[error("Upstream server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Upstream request failed: {0}")]
    Request(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// True for failures where a later retry could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::RateLimited(_) | UpstreamError::Server { .. } | UpstreamError::Request(_)
        )
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: SecretString::new(String::new()),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Completion endpoint client
pub struct CompletionClient {
    http: Client,
    config: UpstreamConfig,
}

impl CompletionClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Send one completion request. Failures are categorized by HTTP
    /// status; no retry is attempted here.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, UpstreamError> {
        debug!(
            model = %request.model,
            system_blocks = request.system.len(),
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .http
            .post(&self.config.api_url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("anthropic-beta", PROMPT_CACHING_BETA)
            .json(request)
            .send()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            error!(status = %status, "Completion request failed: {}", message);
            return Err(categorize_status(status, message));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        if completion.text().is_empty() {
            warn!("Completion response contained no text blocks");
        }

        let usage = &completion.usage;
        METRICS.upstream_input_tokens.inc_by(usage.input_tokens as f64);
        METRICS.upstream_output_tokens.inc_by(usage.output_tokens as f64);
        METRICS
            .upstream_cache_creation_tokens
            .inc_by(usage.cache_creation_input_tokens as f64);
        METRICS
            .upstream_cache_read_tokens
            .inc_by(usage.cache_read_input_tokens as f64);

        debug!(
            input = usage.input_tokens,
            output = usage.output_tokens,
            cache_creation = usage.cache_creation_input_tokens,
            cache_read = usage.cache_read_input_tokens,
            "Completion succeeded"
        );

        Ok(completion)
    }
}

fn categorize_status(status: StatusCode, message: String) -> UpstreamError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            UpstreamError::Authentication(message)
        }
        s if s.is_server_error() => UpstreamError::Server {
            status: s.as_u16(),
            message,
        },
        s => UpstreamError::InvalidResponse(format!("HTTP {}: {}", s, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::models::{SystemBlock, WireMessage};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            max_tokens: 128,
            temperature: 0.7,
            system: vec![SystemBlock::text("persona", true)],
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
        }
    }

    fn client_for(server: &mockito::ServerGuard) -> CompletionClient {
        CompletionClient::new(UpstreamConfig {
            api_url: server.url(),
            api_key: SecretString::new("test-key".to_string()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_successful_completion_parses_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("anthropic-beta", PROMPT_CACHING_BETA)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "content": [{"type": "text", "text": "Hi there."}],
                    "usage": {
                        "input_tokens": 100,
                        "output_tokens": 12,
                        "cache_creation_input_tokens": 80,
                        "cache_read_input_tokens": 0
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let response = client_for(&server).complete(&request()).await.unwrap();
        assert_eq!(response.text(), "Hi there.");
        assert_eq!(response.usage.cache_creation_input_tokens, 80);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(429)
            .with_body(r#"{"error":{"type":"rate_limit_error","message":"slow down"}}"#)
            .create_async()
            .await;

        let err = client_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::RateLimited(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_401_maps_to_authentication() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(401)
            .with_body(r#"{"error":{"type":"authentication_error","message":"bad key"}}"#)
            .create_async()
            .await;

        let err = client_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Authentication(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_500_maps_to_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("internal")
            .create_async()
            .await;

        let err = client_for(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Server { status: 500, .. }));
    }
}
