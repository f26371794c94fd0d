//! Streamed responses with exactly-once reporting
//!
//! [`ChunkStream`] passes upstream chunks through unchanged while folding them
//! into an assembled completion. The report for the call is held in an
//! `Option` and taken exactly once, by whichever comes first:
//!
//! - upstream exhaustion (or an upstream error followed by another poll): the
//!   report is awaited before the stream yields `None`
//! - the consumer dropping the stream early: the report is spawned in the
//!   background
//! - [`ChunkStream::close`], used by the blocking iterator to send the report
//!   synchronously

use crate::client::ChunkSource;
use crate::error::CompletionError;
use crate::merge::merge_into;
use crate::metrics::{Metrics, ReportResult};
use crate::report::{ReportPayload, Reporter};
use crate::types::{ChatCompletion, ChatCompletionChunk};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use uuid::Uuid;

/// Status reported for a stream that ended without an upstream error
const STREAM_OK_STATUS: u16 = 200;

/// Report waiting to be sent when a stream closes
pub(crate) struct PendingReport {
    reporter: Reporter,
    payload: ReportPayload,
}

impl PendingReport {
    pub(crate) fn new(reporter: Reporter, payload: ReportPayload) -> Self {
        Self { reporter, payload }
    }

    pub(crate) fn send_blocking(self, runtime: &tokio::runtime::Runtime) {
        self.reporter.report_blocking(runtime, self.payload);
    }

    fn send_detached(self) {
        self.reporter.report_detached(self.payload);
    }

    fn send(self) -> BoxFuture<'static, ()> {
        async move { self.reporter.report(self.payload).await }.boxed()
    }
}

/// Upstream error seen mid-stream
struct StreamFailure {
    message: String,
    status: Option<u16>,
}

/// Lazy, single-pass sequence of completion chunks
///
/// Yields every upstream item unchanged. An upstream error is yielded once,
/// after which the stream ends.
pub struct ChunkStream {
    source: ChunkSource,
    source_done: bool,
    assembled: Option<ChatCompletion>,
    chunks: u64,
    failure: Option<StreamFailure>,
    pending: Option<PendingReport>,
    finishing: Option<BoxFuture<'static, ()>>,
    finished: bool,
    metrics: Arc<Metrics>,
    call_id: Uuid,
}

impl ChunkStream {
    pub(crate) fn new(
        source: ChunkSource,
        pending: PendingReport,
        metrics: Arc<Metrics>,
        call_id: Uuid,
    ) -> Self {
        Self {
            source,
            source_done: false,
            assembled: None,
            chunks: 0,
            failure: None,
            pending: Some(pending),
            finishing: None,
            finished: false,
            metrics,
            call_id,
        }
    }

    /// Completion assembled from the chunks yielded so far
    pub fn assembled(&self) -> Option<&ChatCompletion> {
        self.assembled.as_ref()
    }

    /// Number of chunks yielded so far
    pub fn chunks_yielded(&self) -> u64 {
        self.chunks
    }

    /// Take the report if it has not been sent yet
    ///
    /// The returned report describes the stream as it is now; once taken, the
    /// stream will not report again.
    pub(crate) fn close(&mut self) -> Option<PendingReport> {
        let pending = self.pending.take()?;
        if !self.source_done {
            self.metrics.stream_abandoned();
            tracing::debug!(
                call_id = %self.call_id,
                chunks = self.chunks,
                "Stream closed before completion"
            );
        }
        Some(self.finalize(pending))
    }

    fn finalize(&self, pending: PendingReport) -> PendingReport {
        let (status, error) = match &self.failure {
            Some(failure) => (
                failure.status.unwrap_or(STREAM_OK_STATUS),
                Some(failure.message.clone()),
            ),
            None => (STREAM_OK_STATUS, None),
        };

        let mut payload = pending
            .payload
            .received_now()
            .status(Some(status))
            .response(
                self.assembled
                    .as_ref()
                    .and_then(|completion| serde_json::to_value(completion).ok()),
            );
        if let Some(message) = error {
            payload = payload.error(message);
        }

        PendingReport {
            reporter: pending.reporter,
            payload,
        }
    }

    fn accept(&mut self, chunk: &ChatCompletionChunk) {
        self.chunks += 1;
        self.metrics.stream_chunk();
        if let Err(e) = merge_into(&mut self.assembled, chunk) {
            self.metrics.stream_merge_failure();
            tracing::warn!(
                call_id = %self.call_id,
                chunk_id = %chunk.id,
                error = %e,
                "Chunk could not be merged, leaving it out of the report"
            );
        }
    }
}

impl Stream for ChunkStream {
    type Item = Result<ChatCompletionChunk, CompletionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(finishing) = this.finishing.as_mut() {
                ready!(finishing.poll_unpin(cx));
                this.finishing = None;
                this.finished = true;
            }
            if this.finished {
                return Poll::Ready(None);
            }

            if this.source_done {
                this.finishing = this.close().map(PendingReport::send);
                if this.finishing.is_none() {
                    this.finished = true;
                }
                continue;
            }

            match ready!(this.source.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    this.accept(&chunk);
                    return Poll::Ready(Some(Ok(chunk)));
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        call_id = %this.call_id,
                        chunks = this.chunks,
                        error = %e,
                        "Upstream stream failed"
                    );
                    this.failure = Some(StreamFailure {
                        message: e.to_string(),
                        status: e.status(),
                    });
                    this.source_done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    tracing::debug!(
                        call_id = %this.call_id,
                        chunks = this.chunks,
                        "Stream completed"
                    );
                    this.source_done = true;
                }
            }
        }
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        if let Some(pending) = self.close() {
            pending.send_detached();
        } else if let Some(finishing) = self.finishing.take() {
            // Report already under way; finish it in the background
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(finishing);
                }
                Err(e) => {
                    self.metrics.record_report(ReportResult::Failed);
                    tracing::debug!(
                        call_id = %self.call_id,
                        error = %e,
                        "No async runtime available, dropping in-flight report"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("call_id", &self.call_id)
            .field("chunks", &self.chunks)
            .field("source_done", &self.source_done)
            .field("report_pending", &self.pending.is_some())
            .finish()
    }
}
