//! Chat-completions client for OpenAI-compatible endpoints.
//!
//! Epistemic foundation:
//! - K_i: The OpenAI chat schema is the de facto standard
//! - B_i: The endpoint will respond within timeout (might fail)
//! - B_i: The response will carry usable text (might fail)
//! - I^B: Network availability unknowable → retry with backoff

use crate::models::{BackendError, LlmConfig, Result, TriviumError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Text backend the generator draws candidate cards from.
///
/// K_i: Generation and pooling only know this seam, so tests can
/// substitute a scripted backend for the network client.
#[async_trait]
pub trait TriviaBackend: Send + Sync {
    /// One chat round-trip; returns the assistant message content.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Completion token budget, used to size batch requests.
    fn max_tokens(&self) -> u32;
}

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request payload.
#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f64,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for any OpenAI-compatible chat completions endpoint.
///
/// Features:
/// - Retry with exponential backoff
/// - Rate limit handling via Retry-After
/// - Fallback without `response_format` for servers that reject it
/// - Fallback without `response_format`/`max_tokens` when the returned
///   content is empty or carries no JSON at all
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: Option<String>,
    timeout: Duration,
}

impl LlmClient {
    /// Create a new client from the `[llm]` config section.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config.resolve_api_key();
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::Network)?;

        Ok(Self {
            client,
            config,
            api_key,
            timeout,
        })
    }

    /// Join base URL and chat completions path.
    fn chat_completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = self.config.chat_completions_path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Build headers for a request.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    fn base_request(&self, system_prompt: &str, user_prompt: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            max_tokens: (self.config.max_tokens > 0).then_some(self.config.max_tokens),
            response_format: self
                .config
                .response_format
                .as_ref()
                .map(|format_type| ResponseFormat {
                    format_type: format_type.clone(),
                }),
        }
    }

    /// Send one request with the retry/backoff loop.
    ///
    /// B_i(API available) → Result
    /// I^B(rate limits) → Retry-After backoff
    async fn request_content(&self, request: &ChatCompletionRequest) -> Result<String> {
        let url = self.chat_completions_url();
        let mut last_error: Option<TriviumError> = None;

        for attempt in 0..self.config.max_retries {
            let response = self
                .client
                .post(&url)
                .headers(self.headers())
                .json(request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(BackendError::RequestTimeout(self.timeout).into());
                    } else {
                        last_error = Some(BackendError::Network(e).into());
                    }
                    if attempt < self.config.max_retries - 1 {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        debug!(
                            attempt,
                            backoff_secs = backoff.as_secs(),
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(1.0);

                last_error = Some(
                    BackendError::RateLimited {
                        message: "backend asked to slow down".to_string(),
                        retry_after_secs: Some(retry_after),
                    }
                    .into(),
                );

                if attempt < self.config.max_retries - 1 {
                    debug!(attempt, retry_after_secs = retry_after, "Rate limited, waiting");
                    tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                }
                continue;
            }

            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                    .map(|b| b.error.message)
                    .unwrap_or(error_body);

                let error = if status == 401 {
                    BackendError::AuthenticationFailed
                } else {
                    BackendError::Api { status, message }
                };

                let retryable = error.is_retryable();
                last_error = Some(error.into());

                if !retryable {
                    break;
                }

                if attempt < self.config.max_retries - 1 {
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            let body: ChatCompletionResponse = response.json().await.map_err(|e| {
                BackendError::InvalidResponse(format!("not a chat completion: {e}"))
            })?;

            let content = body
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| BackendError::InvalidResponse("no choices in response".to_string()))?;

            return Ok(content);
        }

        Err(last_error.unwrap_or_else(|| {
            BackendError::MaxRetriesExceeded {
                attempts: self.config.max_retries,
                last_error: "unknown error".to_string(),
            }
            .into()
        }))
    }

    /// Health check: one trivial chat round-trip, no format constraints.
    ///
    /// B_i: endpoint is healthy if it returns any content at all.
    pub async fn health_check(&self) -> Result<()> {
        let mut request = self.base_request(
            "You are a connectivity check.",
            "Reply with the single word: ok",
        );
        request.response_format = None;
        request.max_tokens = None;

        let content = self.request_content(&request).await?;
        if content.trim().is_empty() {
            return Err(BackendError::InvalidResponse("empty health check reply".to_string()).into());
        }
        Ok(())
    }
}

fn is_bad_request(error: &TriviumError) -> bool {
    matches!(
        error,
        TriviumError::Backend(BackendError::Api { status: 400, .. })
    )
}

#[async_trait]
impl TriviaBackend for LlmClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let mut request = self.base_request(system_prompt, user_prompt);

        match self.request_content(&request).await {
            Ok(content) => {
                if content.trim().is_empty()
                    || (!content.contains('{') && !content.contains('['))
                {
                    // Some servers return empty or prose-only content when
                    // response_format or max_tokens are set.
                    warn!("Backend returned unusable content, retrying without response_format/max_tokens");
                    request.response_format = None;
                    request.max_tokens = None;
                    return self.request_content(&request).await;
                }
                Ok(content)
            }
            Err(e) => {
                if request.response_format.is_some() && is_bad_request(&e) {
                    warn!("Backend rejected response_format, retrying without it");
                    request.response_format = None;
                    return self.request_content(&request).await;
                }
                Err(e)
            }
        }
    }

    fn max_tokens(&self) -> u32 {
        self.config.max_tokens
    }
}
