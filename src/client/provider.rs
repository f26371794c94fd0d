//! Wrapped chat-completion provider
//!
//! The interceptor talks to the provider only through [`ChatProvider`], so any
//! OpenAI-compatible client can be wrapped. [`OpenAiProvider`] is the default:
//! a plain HTTP client for `POST {base_url}/chat/completions`, parsing
//! server-sent events when the request asks for a stream.

use crate::config::{Config, ProviderConfig};
use crate::error::{AppError, AppResult, CompletionError};
use crate::request::CompletionRequest;
use crate::types::{ChatCompletion, ChatCompletionChunk};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::future;
use futures::stream::BoxStream;
use serde_json::Value;
use std::time::Duration;

/// Marker event ending an OpenAI stream
const DONE_MARKER: &str = "[DONE]";

/// Upstream chunks as produced by a provider
pub type ChunkSource = BoxStream<'static, Result<ChatCompletionChunk, CompletionError>>;

/// Result of a provider call
pub enum ProviderResponse {
    Whole(ChatCompletion),
    Stream(ChunkSource),
}

impl std::fmt::Debug for ProviderResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whole(completion) => f.debug_tuple("Whole").field(completion).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A chat-completion provider the interceptor can wrap
///
/// Implementations must return [`CompletionError::Provider`] for errors the
/// provider itself reports (HTTP status plus body); those are reported with
/// full fidelity. Any other error variant is propagated without a report.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn create_chat_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, CompletionError>;
}

/// OpenAI-compatible HTTP provider
///
/// `request_timeout` is a deadline for whole responses. Streams have no total
/// deadline: connecting and each read between events are bounded instead.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> AppResult<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_seconds());
        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .read_timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            api_key: config.api_key(),
            request_timeout,
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(&config.provider)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Raw POST against any provider path, for operations the interceptor
    /// does not intercept
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, CompletionError> {
        let response = self
            .request(path)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let content = response.bytes().await?;
        if !status.is_success() {
            return Err(provider_error(status.as_u16(), &content));
        }
        Ok(serde_json::from_slice(&content)?)
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn create_chat_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, CompletionError> {
        let mut builder = self.request("/chat/completions").json(request);
        if !request.is_stream() {
            builder = builder.timeout(self.request_timeout);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let content = response.bytes().await?;
            return Err(provider_error(status.as_u16(), &content));
        }

        if !request.is_stream() {
            let content = response.bytes().await?;
            return Ok(ProviderResponse::Whole(serde_json::from_slice(&content)?));
        }

        let chunks = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(event) if event.data.trim() == DONE_MARKER);
                future::ready(!done)
            })
            .filter_map(|event| {
                future::ready(match event {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(
                        serde_json::from_str::<ChatCompletionChunk>(&event.data)
                            .map_err(CompletionError::from),
                    ),
                    Err(e) => Some(Err(CompletionError::Stream(e.to_string()))),
                })
            });

        Ok(ProviderResponse::Stream(chunks.boxed()))
    }
}

/// Build a provider error from a non-success response body
///
/// The message is `error.message`, or `error` when it is a plain string, or
/// the raw body when neither is present.
pub(crate) fn provider_error(status: u16, content: &[u8]) -> CompletionError {
    let body: Option<Value> = serde_json::from_slice(content).ok();
    let message = body
        .as_ref()
        .and_then(|body| body.get("error"))
        .and_then(|error| {
            error
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| error.as_str())
        })
        .map(str::to_string)
        .unwrap_or_else(|| String::from_utf8_lossy(content).into_owned());

    CompletionError::Provider {
        status,
        body,
        message,
    }
}
