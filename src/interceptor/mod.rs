//! Completion interceptor
//!
//! [`Interceptor`] stands in for a provider's "create chat completion" entry
//! point. Each call:
//!
//! 1. strips the reporting options from the request,
//! 2. routes it by model name, to the OpenPipe API for `openpipe:` models and
//!    to the wrapped provider otherwise,
//! 3. reports the outcome exactly once, without letting reporting affect
//!    what the caller observes.
//!
//! Errors are dispatched by variant: provider errors are reported and
//! returned unchanged, OpenPipe API status errors are reported and returned
//! as [`CompletionError::Routed`], anything else is returned unreported.

mod stream;

pub use stream::ChunkStream;

use crate::client::{ChatProvider, OpenAiProvider, OpenPipeApi, ProviderResponse};
use crate::config::Config;
use crate::error::{AppError, AppResult, CompletionError};
use crate::metrics::{Metrics, Outcome, RouteLabel};
use crate::report::{ReportPayload, Reporter, now_ms};
use crate::request::CompletionRequest;
use crate::types::ChatCompletion;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use stream::PendingReport;
use uuid::Uuid;

/// Model name prefix selecting the OpenPipe API
pub const OPENPIPE_MODEL_PREFIX: &str = "openpipe:";

/// Status reported for successful calls
const SUCCESS_STATUS: u16 = 200;

/// Where a request is delegated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The wrapped provider
    Provider,
    /// The OpenPipe API
    OpenPipe,
}

impl Route {
    /// Route for a requested model
    ///
    /// # Examples
    ///
    /// ```
    /// use openpipe::interceptor::Route;
    ///
    /// assert_eq!(Route::for_model("openpipe:my-model"), Route::OpenPipe);
    /// assert_eq!(Route::for_model("gpt-4"), Route::Provider);
    /// ```
    pub fn for_model(model: &str) -> Self {
        if model.starts_with(OPENPIPE_MODEL_PREFIX) {
            Route::OpenPipe
        } else {
            Route::Provider
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.label().as_str()
    }

    fn label(self) -> RouteLabel {
        match self {
            Route::Provider => RouteLabel::Provider,
            Route::OpenPipe => RouteLabel::OpenPipe,
        }
    }
}

/// Result of an intercepted call
#[derive(Debug)]
pub enum CompletionResponse {
    Whole(ChatCompletion),
    Stream(ChunkStream),
}

impl CompletionResponse {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// The whole response, `None` for streams
    pub fn into_whole(self) -> Option<ChatCompletion> {
        match self {
            Self::Whole(completion) => Some(completion),
            Self::Stream(_) => None,
        }
    }

    /// The stream, `None` for whole responses
    pub fn into_stream(self) -> Option<ChunkStream> {
        match self {
            Self::Whole(_) => None,
            Self::Stream(stream) => Some(stream),
        }
    }
}

/// Asynchronous completion interceptor
///
/// Generic over the wrapped provider; [`OpenAiProvider`] by default. Shared
/// state (API client, metrics) is read-only after construction, so one
/// interceptor can serve concurrent calls.
pub struct Interceptor<P = OpenAiProvider> {
    provider: P,
    api: Arc<OpenPipeApi>,
    reporter: Reporter,
    metrics: Arc<Metrics>,
}

impl Interceptor<OpenAiProvider> {
    /// Build an interceptor around an [`OpenAiProvider`] from configuration
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let metrics = Metrics::new()
            .map_err(|e| AppError::Internal(format!("Failed to register metrics: {}", e)))?;
        Ok(Self::new(
            OpenAiProvider::from_config(config)?,
            OpenPipeApi::from_config(config)?,
            config.reporting.enabled,
            Arc::new(metrics),
        ))
    }
}

impl<P: ChatProvider> Interceptor<P> {
    pub fn new(
        provider: P,
        api: OpenPipeApi,
        reporting_enabled: bool,
        metrics: Arc<Metrics>,
    ) -> Self {
        let api = Arc::new(api);
        let reporter = Reporter::new(api.clone(), reporting_enabled, metrics.clone());
        Self {
            provider,
            api,
            reporter,
            metrics,
        }
    }

    /// The wrapped provider, for operations that are not intercepted
    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Create a chat completion
    ///
    /// Returns a whole completion, or a [`ChunkStream`] when the provider
    /// streams. The call is reported before this returns, except for streams
    /// (reported when they end or are dropped) and unclassified errors (never
    /// reported).
    ///
    /// # Errors
    /// - [`CompletionError::Provider`]: reported, returned unchanged
    /// - [`CompletionError::Routed`]: the OpenPipe API answered with an error
    ///   status; carries the message from its body
    /// - anything else: delegation failed before a response arrived, not
    ///   reported
    pub async fn create(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let (request, options) = request.split_reporting_options()?;
        let requested_at = now_ms();
        let started = Instant::now();
        let route = Route::for_model(request.model());
        let call_id = Uuid::new_v4();

        tracing::debug!(
            call_id = %call_id,
            route = route.as_str(),
            model = %request.model(),
            stream = request.is_stream(),
            "Intercepted completion call"
        );

        let report = ReportPayload::new(request.to_value(), options, requested_at);
        let result = self.delegate(route, &request).await;
        self.record_duration(route, started);

        match result {
            Ok(ProviderResponse::Whole(completion)) => {
                let payload = report
                    .received_now()
                    .status(Some(SUCCESS_STATUS))
                    .response(serde_json::to_value(&completion).ok());
                self.reporter.report(payload).await;
                self.record_outcome(route, Outcome::Success);

                tracing::info!(
                    call_id = %call_id,
                    route = route.as_str(),
                    model = %completion.model,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Completion call succeeded"
                );
                Ok(CompletionResponse::Whole(completion))
            }
            Ok(ProviderResponse::Stream(source)) => {
                self.record_outcome(route, Outcome::Success);
                tracing::debug!(call_id = %call_id, route = route.as_str(), "Streaming response");
                Ok(CompletionResponse::Stream(ChunkStream::new(
                    source,
                    PendingReport::new(self.reporter.clone(), report),
                    self.metrics.clone(),
                    call_id,
                )))
            }
            Err(error) => Err(self.handle_error(route, call_id, report, error).await),
        }
    }

    async fn delegate(
        &self,
        route: Route,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, CompletionError> {
        match route {
            Route::Provider => self.provider.create_chat_completion(request).await,
            // The OpenPipe API answers with whole responses only
            Route::OpenPipe => {
                let response = self.api.create_chat_completion(request).await?;
                Ok(ProviderResponse::Whole(response.json()?))
            }
        }
    }

    /// Report a delegation error if its variant calls for it, returning the
    /// error the caller should see
    async fn handle_error(
        &self,
        route: Route,
        call_id: Uuid,
        report: ReportPayload,
        error: CompletionError,
    ) -> CompletionError {
        match error {
            CompletionError::Provider { .. } => {
                let payload = report
                    .received_now()
                    .status(error.status())
                    .response(error.body().cloned())
                    .error(error.to_string());
                self.reporter.report(payload).await;
                self.record_outcome(route, Outcome::ProviderError);

                tracing::warn!(
                    call_id = %call_id,
                    route = route.as_str(),
                    status_code = ?error.status(),
                    error = %error,
                    "Provider returned an error"
                );
                error
            }
            CompletionError::UnexpectedStatus { status, content } => {
                let body: Option<Value> = serde_json::from_slice(&content).ok();
                let message = body
                    .as_ref()
                    .and_then(|body| body.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                let payload = report
                    .received_now()
                    .status(Some(status))
                    .response(body)
                    .error(message.clone());
                self.reporter.report(payload).await;
                self.record_outcome(route, Outcome::BackendError);

                tracing::warn!(
                    call_id = %call_id,
                    route = route.as_str(),
                    status_code = status,
                    error = %message,
                    "OpenPipe API returned an error status"
                );
                CompletionError::Routed(message)
            }
            other => {
                self.record_outcome(route, Outcome::UnreportedError);
                tracing::debug!(
                    call_id = %call_id,
                    route = route.as_str(),
                    kind = ?other.kind(),
                    error = %other,
                    "Completion call failed before a response, not reporting"
                );
                other
            }
        }
    }

    fn record_outcome(&self, route: Route, outcome: Outcome) {
        if let Err(e) = self.metrics.record_completion(route.label(), outcome) {
            tracing::warn!(
                error = %e,
                route = route.as_str(),
                outcome = outcome.as_str(),
                "Metrics recording failed for completion counter"
            );
        }
    }

    fn record_duration(&self, route: Route, started: Instant) {
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        if let Err(e) = self.metrics.record_call_duration(route.label(), duration_ms) {
            tracing::warn!(
                error = %e,
                route = route.as_str(),
                "Metrics recording failed for call duration"
            );
        }
    }
}
