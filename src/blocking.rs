//! Blocking facade over the asynchronous interceptor
//!
//! [`Interceptor`] owns a private current-thread tokio runtime and drives the
//! asynchronous core on it, in the same way `reqwest::blocking` does. Reports
//! are sent before [`Interceptor::create`] returns; a streamed response is
//! consumed as a [`ChunkIter`] that reports when exhausted or dropped.
//!
//! Do not use this module from within an async context: driving or dropping
//! the inner runtime there panics.

use crate::client::{ChatProvider, OpenAiProvider, OpenPipeApi};
use crate::config::Config;
use crate::error::{AppError, AppResult, CompletionError};
use crate::interceptor::{self, ChunkStream};
use crate::metrics::Metrics;
use crate::request::CompletionRequest;
use crate::types::{ChatCompletion, ChatCompletionChunk};
use futures::StreamExt;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Result of a blocking intercepted call
#[derive(Debug)]
pub enum CompletionResponse {
    Whole(ChatCompletion),
    Stream(ChunkIter),
}

impl CompletionResponse {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    pub fn into_whole(self) -> Option<ChatCompletion> {
        match self {
            Self::Whole(completion) => Some(completion),
            Self::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<ChunkIter> {
        match self {
            Self::Whole(_) => None,
            Self::Stream(chunks) => Some(chunks),
        }
    }
}

/// Blocking completion interceptor
pub struct Interceptor<P = OpenAiProvider> {
    inner: interceptor::Interceptor<P>,
    runtime: Arc<Runtime>,
}

impl Interceptor<OpenAiProvider> {
    /// Build a blocking interceptor around an [`OpenAiProvider`] from configuration
    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::wrap(interceptor::Interceptor::from_config(config)?)
    }
}

impl<P: ChatProvider> Interceptor<P> {
    pub fn new(
        provider: P,
        api: OpenPipeApi,
        reporting_enabled: bool,
        metrics: Arc<Metrics>,
    ) -> AppResult<Self> {
        Self::wrap(interceptor::Interceptor::new(
            provider,
            api,
            reporting_enabled,
            metrics,
        ))
    }

    /// Wrap an asynchronous interceptor
    pub fn wrap(inner: interceptor::Interceptor<P>) -> AppResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build runtime: {}", e)))?;

        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    /// The wrapped provider, for operations that are not intercepted
    pub fn provider(&self) -> &P {
        self.inner.provider()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.inner.metrics()
    }

    /// Run a future on the interceptor's runtime
    ///
    /// Lets blocking callers reach asynchronous pass-through operations on
    /// the provider.
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Create a chat completion, blocking until the response (or the stream
    /// handle) is available and the call has been reported
    ///
    /// # Errors
    /// Same as [`interceptor::Interceptor::create`].
    pub fn create(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        match self.runtime.block_on(self.inner.create(request))? {
            interceptor::CompletionResponse::Whole(completion) => {
                Ok(CompletionResponse::Whole(completion))
            }
            interceptor::CompletionResponse::Stream(stream) => {
                Ok(CompletionResponse::Stream(ChunkIter {
                    stream,
                    runtime: self.runtime.clone(),
                }))
            }
        }
    }
}

/// Blocking iterator over streamed chunks
///
/// Reports once: after the last chunk has been pulled, or when dropped early
/// (the drop blocks for the transmission).
pub struct ChunkIter {
    stream: ChunkStream,
    runtime: Arc<Runtime>,
}

impl ChunkIter {
    /// Completion assembled from the chunks yielded so far
    pub fn assembled(&self) -> Option<&ChatCompletion> {
        self.stream.assembled()
    }
}

impl Iterator for ChunkIter {
    type Item = Result<ChatCompletionChunk, CompletionError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}

impl Drop for ChunkIter {
    fn drop(&mut self) {
        if let Some(pending) = self.stream.close() {
            pending.send_blocking(&self.runtime);
        }
    }
}

impl std::fmt::Debug for ChunkIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIter")
            .field("stream", &self.stream)
            .finish()
    }
}
