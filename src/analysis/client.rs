//! Chat-completion transport
//!
//! `OpenAiClient` talks to an OpenAI-compatible `/chat/completions` endpoint
//! and folds every failure into one of the analysis error kinds.

use crate::analysis::request::{ApiKey, ChatRequest};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Longest provider error body echoed back in a diagnostic
const MAX_DETAIL_CHARS: usize = 300;

/// Sends one chat completion request and returns the first choice's text
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, api_key: &ApiKey, request: &ChatRequest) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for the OpenAI chat completion API
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenAiClient {
    /// Create a client for `api_base` with a whole-request timeout
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unexpected {
                detail: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self::with_client(client, api_base))
    }

    /// Use a preconfigured reqwest client
    pub fn with_client(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    async fn complete(&self, api_key: &ApiKey, request: &ChatRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose())
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        parse_completion(&body)
    }
}

/// Map a non-success HTTP status to an error kind
pub fn classify_status(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::AuthenticationFailed,
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited,
        _ => Error::Unexpected {
            detail: format!("HTTP {}: {}", status, provider_message(body)),
        },
    }
}

/// Map a reqwest failure that happened before a status was available
fn classify_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::RequestTimedOut
    } else if err.is_connect() || err.is_request() || err.is_body() {
        Error::ConnectionFailed {
            detail: err.to_string(),
        }
    } else {
        Error::Unexpected {
            detail: err.to_string(),
        }
    }
}

/// Provider's error message if the body is an OpenAI error envelope,
/// otherwise the raw body, shortened
fn provider_message(body: &str) -> String {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match message.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message,
    }
}

/// Extract the first completion's text from a success body
pub fn parse_completion(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| Error::Unexpected {
        detail: format!("Malformed completion response: {}", e),
    })?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Unexpected {
            detail: "Completion response contained no choices".to_string(),
        })?;

    choice.message.content.ok_or_else(|| Error::Unexpected {
        detail: "Completion response had no message content".to_string(),
    })
}
