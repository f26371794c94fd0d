//! Prometheus metrics collection for openpipe
//!
//! This module provides metrics instrumentation for tracking:
//! - Completion calls by route and outcome
//! - Call latency by route
//! - Report deliveries by result
//! - Streamed chunks, merge failures and abandoned streams
//!
//! Each [`Metrics`] owns its own registry; render it with [`Metrics::gather`].

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Route label for type-safe metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteLabel {
    /// Wrapped provider
    Provider,
    /// OpenPipe API (model prefixed with `openpipe:`)
    OpenPipe,
}

impl RouteLabel {
    /// Convert route to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteLabel::Provider => "provider",
            RouteLabel::OpenPipe => "openpipe",
        }
    }
}

/// Call outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ProviderError,
    BackendError,
    /// Error propagated without a report
    UnreportedError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ProviderError => "provider_error",
            Outcome::BackendError => "backend_error",
            Outcome::UnreportedError => "unreported_error",
        }
    }
}

/// Report delivery result label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportResult {
    Sent,
    Failed,
    /// Reporting turned off in configuration
    Disabled,
}

impl ReportResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportResult::Sent => "sent",
            ReportResult::Failed => "failed",
            ReportResult::Disabled => "disabled",
        }
    }
}

/// Metrics collector for openpipe
///
/// Cheap to clone; clones share the same registry and counters.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    completions_total: IntCounterVec,
    call_duration: HistogramVec,
    reports_total: IntCounterVec,
    stream_chunks: IntCounter,
    stream_merge_failures: IntCounter,
    stream_abandoned: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 2 routes × 4 outcomes = 8 time series
        let completions_total = IntCounterVec::new(
            Opts::new(
                "openpipe_completions_total",
                "Total number of completion calls by route and outcome",
            ),
            &["route", "outcome"],
        )?;

        // Time until the whole response or the stream handle is available
        let call_duration = HistogramVec::new(
            HistogramOpts::new(
                "openpipe_call_duration_ms",
                "Completion call latency in milliseconds, up to the first response byte for streams",
            )
            .buckets(vec![
                10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
            &["route"],
        )?;

        let reports_total = IntCounterVec::new(
            Opts::new(
                "openpipe_reports_total",
                "Total number of report payloads by delivery result",
            ),
            &["result"],
        )?;

        let stream_chunks = IntCounter::with_opts(Opts::new(
            "openpipe_stream_chunks_total",
            "Total number of streamed chunks passed through to callers",
        ))?;

        // A failed merge leaves the assembled completion as it was; the chunk
        // still reaches the caller.
        let stream_merge_failures = IntCounter::with_opts(Opts::new(
            "openpipe_stream_merge_failures_total",
            "Total number of streamed chunks that could not be merged into the reported completion",
        ))?;

        let stream_abandoned = IntCounter::with_opts(Opts::new(
            "openpipe_stream_abandoned_total",
            "Total number of streams dropped by the caller before completion",
        ))?;

        registry.register(Box::new(completions_total.clone()))?;
        registry.register(Box::new(call_duration.clone()))?;
        registry.register(Box::new(reports_total.clone()))?;
        registry.register(Box::new(stream_chunks.clone()))?;
        registry.register(Box::new(stream_merge_failures.clone()))?;
        registry.register(Box::new(stream_abandoned.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            completions_total,
            call_duration,
            reports_total,
            stream_chunks,
            stream_merge_failures,
            stream_abandoned,
        })
    }

    /// Record a finished completion call
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_completion(
        &self,
        route: RouteLabel,
        outcome: Outcome,
    ) -> Result<(), prometheus::Error> {
        self.completions_total
            .get_metric_with_label_values(&[route.as_str(), outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record call latency
    ///
    /// # Errors
    ///
    /// Returns an error if `duration_ms` is NaN, infinite or negative, or if
    /// the metric is not registered.
    pub fn record_call_duration(
        &self,
        route: RouteLabel,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite and non-negative, got: {}",
                duration_ms
            )));
        }

        self.call_duration
            .get_metric_with_label_values(&[route.as_str()])?
            .observe(duration_ms);
        Ok(())
    }

    /// Record the result of one report delivery
    pub fn record_report(&self, result: ReportResult) {
        self.reports_total.with_label_values(&[result.as_str()]).inc();
    }

    pub fn stream_chunk(&self) {
        self.stream_chunks.inc();
    }

    pub fn stream_merge_failure(&self) {
        self.stream_merge_failures.inc();
    }

    pub fn stream_abandoned(&self) {
        self.stream_abandoned.inc();
    }

    /// Current count of completion calls for a route and outcome
    pub fn completions(&self, route: RouteLabel, outcome: Outcome) -> u64 {
        self.completions_total
            .with_label_values(&[route.as_str(), outcome.as_str()])
            .get()
    }

    /// Current count of reports with the given result
    pub fn reports(&self, result: ReportResult) -> u64 {
        self.reports_total.with_label_values(&[result.as_str()]).get()
    }

    pub fn stream_chunks(&self) -> u64 {
        self.stream_chunks.get()
    }

    pub fn stream_merge_failures(&self) -> u64 {
        self.stream_merge_failures.get()
    }

    pub fn streams_abandoned(&self) -> u64 {
        self.stream_abandoned.get()
    }

    /// Render all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if the text encoder fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_families.len(),
                "Prometheus text encoder failed"
            );
            e
        })?;

        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics output is not UTF-8: {}", e)))
    }
}
