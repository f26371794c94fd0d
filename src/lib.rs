//! openpipe - chat completion interception with OpenPipe routing and reporting
//!
//! This library wraps an OpenAI-compatible chat-completion provider. Requests
//! for models named `openpipe:<name>` are sent to the OpenPipe API instead,
//! streamed responses are folded into one assembled completion, and every
//! call is reported to OpenPipe without ever affecting its outcome.
//!
//! Use [`interceptor::Interceptor`] from async code and
//! [`blocking::Interceptor`] from synchronous code.

pub mod blocking;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod merge;
pub mod metrics;
pub mod report;
pub mod request;
pub mod telemetry;
pub mod types;

pub use error::{CompletionError, CompletionResult};
pub use interceptor::{CompletionResponse, Interceptor, Route};
pub use request::{CompletionRequest, ReportingOptions};
