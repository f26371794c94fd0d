//! OpenPipe API client
//!
//! One client serves both the routed completion endpoint and the report sink.
//! It is built once from [`OpenPipeConfig`] and shared behind an `Arc`.

use crate::config::{Config, OpenPipeConfig};
use crate::error::{AppError, AppResult, CompletionError};
use crate::report::{ReportError, ReportPayload};
use crate::request::CompletionRequest;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Raw response envelope from the OpenPipe API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status_code: u16,
    pub content: Bytes,
}

impl ApiResponse {
    /// Decode the JSON content
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CompletionError> {
        Ok(serde_json::from_slice(&self.content)?)
    }
}

/// Client for the OpenPipe API
#[derive(Debug, Clone)]
pub struct OpenPipeApi {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Duration,
    report_timeout: Duration,
}

impl OpenPipeApi {
    pub fn new(
        config: &OpenPipeConfig,
        request_timeout: Duration,
        report_timeout: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            api_key: config.api_key(),
            request_timeout,
            report_timeout,
        })
    }

    /// Build the client from the `[openpipe]`, `[provider]` and `[reporting]` sections
    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(
            &config.openpipe,
            Duration::from_secs(config.provider.request_timeout_seconds()),
            Duration::from_secs(config.reporting.timeout_seconds),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.post(url).timeout(timeout);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// POST a completion request to the routed backend
    ///
    /// # Errors
    /// - [`CompletionError::UnexpectedStatus`] when the API answers with a
    ///   non-success status; `content` holds the raw body
    /// - [`CompletionError::Transport`] when the request cannot be sent
    pub async fn create_chat_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ApiResponse, CompletionError> {
        let response = self
            .post("/chat/completions", self.request_timeout)
            .json(request)
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let success = response.status().is_success();
        let content = response.bytes().await?;

        tracing::debug!(
            status_code = status_code,
            content_length = content.len(),
            "OpenPipe API responded"
        );

        if !success {
            return Err(CompletionError::UnexpectedStatus {
                status: status_code,
                content,
            });
        }

        Ok(ApiResponse {
            status_code,
            content,
        })
    }

    /// POST a report payload to the sink
    ///
    /// # Errors
    /// Returns [`ReportError`] on transport failure or a non-success status.
    /// Callers are expected to discard it.
    pub async fn send_report(&self, payload: &ReportPayload) -> Result<(), ReportError> {
        let body = serde_json::to_vec(payload)?;
        let response = self
            .post("/report", self.report_timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Status(status.as_u16()));
        }
        Ok(())
    }
}
