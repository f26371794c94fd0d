//! Best-effort request reporting
//!
//! Every intercepted call produces one [`ReportPayload`], sent to the OpenPipe
//! report sink by a [`Reporter`]. Reporting never affects the call it
//! describes: delivery failures are logged at `debug`, counted in metrics and
//! otherwise dropped. There is no retry.

use crate::client::OpenPipeApi;
use crate::metrics::{Metrics, ReportResult};
use crate::request::ReportingOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Telemetry record for one logical completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub requested_at: i64,
    pub received_at: i64,
    pub req_payload: Value,
    pub resp_payload: Option<Value>,
    pub error_message: Option<String>,
    pub status_code: Option<u16>,
    pub reporting_options: ReportingOptions,
}

impl ReportPayload {
    /// Start a payload for a request sent at `requested_at`
    ///
    /// `received_at` starts equal to `requested_at`; set it with
    /// [`received_now`](Self::received_now) when the outcome is known.
    pub fn new(req_payload: Value, reporting_options: ReportingOptions, requested_at: i64) -> Self {
        Self {
            requested_at,
            received_at: requested_at,
            req_payload,
            resp_payload: None,
            error_message: None,
            status_code: None,
            reporting_options,
        }
    }

    /// Stamp `received_at` with the current time
    pub fn received_now(mut self) -> Self {
        self.received_at = now_ms();
        self
    }

    pub fn response(mut self, resp_payload: Option<Value>) -> Self {
        self.resp_payload = resp_payload;
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn status(mut self, status_code: Option<u16>) -> Self {
        self.status_code = status_code;
        self
    }
}

/// Failure to deliver a report
///
/// Never surfaces past [`Reporter`].
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to send report: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("report sink returned status {0}")]
    Status(u16),
}

/// Sends report payloads to the sink
///
/// Cheap to clone; clones share the API client and metrics.
#[derive(Clone)]
pub struct Reporter {
    api: Arc<OpenPipeApi>,
    enabled: bool,
    metrics: Arc<Metrics>,
}

impl Reporter {
    pub fn new(api: Arc<OpenPipeApi>, enabled: bool, metrics: Arc<Metrics>) -> Self {
        Self {
            api,
            enabled,
            metrics,
        }
    }

    /// Send a payload, waiting for the transmission to finish
    pub async fn report(&self, payload: ReportPayload) {
        if !self.enabled {
            self.metrics.record_report(ReportResult::Disabled);
            return;
        }

        match self.api.send_report(&payload).await {
            Ok(()) => {
                self.metrics.record_report(ReportResult::Sent);
                tracing::trace!(
                    status_code = ?payload.status_code,
                    "Report sent"
                );
            }
            Err(e) => {
                self.metrics.record_report(ReportResult::Failed);
                tracing::debug!(
                    error = %e,
                    status_code = ?payload.status_code,
                    "Failed to send report, dropping it"
                );
            }
        }
    }

    /// Send a payload from synchronous code, driving `runtime` until done
    ///
    /// Must not be called from within an async context.
    pub fn report_blocking(&self, runtime: &tokio::runtime::Runtime, payload: ReportPayload) {
        runtime.block_on(self.report(payload));
    }

    /// Send a payload in the background without waiting
    ///
    /// Spawns onto the current tokio runtime. Outside a runtime the payload
    /// is dropped and counted as failed.
    pub fn report_detached(&self, payload: ReportPayload) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let reporter = self.clone();
                handle.spawn(async move {
                    reporter.report(payload).await;
                });
            }
            Err(e) => {
                self.metrics.record_report(ReportResult::Failed);
                tracing::debug!(error = %e, "No async runtime available, dropping report");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_serializes_camel_case() {
        let options = ReportingOptions::new().with_tag("prompt_id", "greeting");
        let payload = ReportPayload::new(json!({"model": "gpt-4"}), options, 1_000)
            .response(Some(json!({"id": "chatcmpl-1"})))
            .status(Some(200));

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "requestedAt": 1000,
                "receivedAt": 1000,
                "reqPayload": {"model": "gpt-4"},
                "respPayload": {"id": "chatcmpl-1"},
                "errorMessage": null,
                "statusCode": 200,
                "reportingOptions": {"tags": {"prompt_id": "greeting"}}
            })
        );
    }

    #[test]
    fn test_received_now_is_not_before_requested_at() {
        let requested_at = now_ms();
        let payload =
            ReportPayload::new(json!({}), ReportingOptions::new(), requested_at).received_now();
        assert!(payload.received_at >= payload.requested_at);
    }

    #[test]
    fn test_error_sets_message() {
        let payload = ReportPayload::new(json!({}), ReportingOptions::new(), 0)
            .error("rate limited")
            .status(Some(429));
        assert_eq!(payload.error_message.as_deref(), Some("rate limited"));
        assert_eq!(payload.status_code, Some(429));
        assert!(payload.resp_payload.is_none());
    }

    fn unreachable_reporter(enabled: bool) -> (Reporter, Arc<Metrics>) {
        let config =
            crate::config::Config::with_base_urls("http://127.0.0.1:9", "http://127.0.0.1:9");
        let api = Arc::new(OpenPipeApi::from_config(&config).unwrap());
        let metrics = Arc::new(Metrics::new().unwrap());
        (Reporter::new(api, enabled, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_unreachable_sink_is_swallowed() {
        let (reporter, metrics) = unreachable_reporter(true);
        reporter
            .report(ReportPayload::new(json!({}), ReportingOptions::new(), 0))
            .await;
        assert_eq!(metrics.reports(ReportResult::Failed), 1);
    }

    #[tokio::test]
    async fn test_disabled_reporter_sends_nothing() {
        let (reporter, metrics) = unreachable_reporter(false);
        reporter
            .report(ReportPayload::new(json!({}), ReportingOptions::new(), 0))
            .await;
        assert_eq!(metrics.reports(ReportResult::Disabled), 1);
        assert_eq!(metrics.reports(ReportResult::Failed), 0);
    }

    #[test]
    fn test_detached_outside_runtime_drops_payload() {
        let (reporter, metrics) = unreachable_reporter(true);
        reporter.report_detached(ReportPayload::new(json!({}), ReportingOptions::new(), 0));
        assert_eq!(metrics.reports(ReportResult::Failed), 1);
    }
}
