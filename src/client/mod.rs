//! HTTP clients for the services a completion call reaches
//!
//! - [`OpenPipeApi`]: the routed backend and the report sink
//! - [`ChatProvider`]: the wrapped chat-completion provider, with
//!   [`OpenAiProvider`] as the default implementation

pub mod openpipe;
pub mod provider;

pub use openpipe::{ApiResponse, OpenPipeApi};
pub use provider::{ChatProvider, ChunkSource, OpenAiProvider, ProviderResponse};
